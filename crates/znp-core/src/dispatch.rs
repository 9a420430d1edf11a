// ── Event dispatcher ──
//
// Classifies raw transport notifications into `RadioEvent`s and fans each
// one out to the handlers registered for its kind. Handler lists are
// copy-on-write so delivery never takes a lock and a handler may
// subscribe or unsubscribe while being invoked.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use bytes::{Buf, Bytes};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::model::{
    AddrMode, AttributeReport, CommandResponse, Confirmation, DeviceAnnounce, EventKind,
    IeeeAddress, NeighborEntry, NeighborTable, NodeInfo, RadioEvent,
};
use crate::pending::{CorrelationId, RequestKind};
use crate::transport::RawEvent;

/// Most clusters reported per direction for one endpoint.
pub const MAX_CLUSTERS: usize = 16;

/// Largest attribute payload accepted from the radio.
pub const MAX_ATTRIBUTE_PAYLOAD: usize = 255;

/// Largest NV item the radio returns or accepts.
pub const MAX_NV_ITEM_LEN: usize = 248;

/// Most children in one neighbor table.
pub const MAX_NEIGHBORS: usize = 20;

const NEIGHBOR_RECORD_LEN: usize = 12;

/// Why a raw notification was not delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DropReason {
    #[error("unknown radio event code {code:#06x}")]
    UnknownEvent { code: u16 },

    #[error("malformed {kind} event: {reason}")]
    Malformed { kind: EventKind, reason: String },
}

fn malformed(kind: EventKind, reason: impl Into<String>) -> DropReason {
    DropReason::Malformed {
        kind,
        reason: reason.into(),
    }
}

type Handler = Arc<dyn Fn(&RadioEvent) + Send + Sync>;

#[derive(Clone)]
struct Registered {
    id: u64,
    handler: Handler,
}

/// Per-kind handler registry plus the classification step.
pub struct EventDispatcher {
    handlers: [ArcSwap<Vec<Registered>>; EventKind::ALL_COUNT],
    next_id: AtomicU64,
    dropped: AtomicU64,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("dropped", &self.dropped_events())
            .finish_non_exhaustive()
    }
}

impl EventDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handlers: std::array::from_fn(|_| ArcSwap::from_pointee(Vec::new())),
            next_id: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
        })
    }

    fn slot(&self, kind: EventKind) -> &ArcSwap<Vec<Registered>> {
        &self.handlers[kind.index()]
    }

    /// Register `handler` for `kind`. Handlers of one kind run in
    /// registration order.
    pub fn subscribe<F>(self: &Arc<Self>, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&RadioEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handler: Handler = Arc::new(handler);
        self.slot(kind).rcu(|current| {
            let mut next: Vec<Registered> = current.iter().cloned().collect();
            next.push(Registered {
                id,
                handler: Arc::clone(&handler),
            });
            next
        });
        trace!(kind = %kind, id, "handler subscribed");
        Subscription {
            kind,
            id,
            dispatcher: Arc::downgrade(self),
        }
    }

    fn unsubscribe(&self, kind: EventKind, id: u64) -> bool {
        let previous = self.slot(kind).rcu(|current| {
            current
                .iter()
                .filter(|r| r.id != id)
                .cloned()
                .collect::<Vec<_>>()
        });
        previous.iter().any(|r| r.id == id)
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.slot(kind).load().len()
    }

    /// Deliver an already-classified event to every handler of its kind.
    pub fn dispatch(&self, event: &RadioEvent) {
        let handlers = self.slot(event.kind()).load_full();
        for registered in handlers.iter() {
            (registered.handler)(event);
        }
    }

    /// Entry point for the transport. Never fails: anything that cannot
    /// be classified is logged, counted and dropped.
    pub fn on_raw_event(&self, raw: RawEvent) {
        match classify(raw) {
            Ok(event) => {
                trace!(kind = %event.kind(), "dispatching radio event");
                self.dispatch(&event);
            }
            Err(reason) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                match reason {
                    DropReason::UnknownEvent { .. } => debug!(%reason, "dropping radio event"),
                    DropReason::Malformed { .. } => warn!(%reason, "dropping radio event"),
                }
            }
        }
    }

    /// Raw notifications dropped since construction.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Handle the transport uses to push raw notifications.
///
/// Holds the dispatcher weakly: once the controller is gone, deliveries
/// are discarded.
#[derive(Clone)]
pub struct EventSink {
    dispatcher: Weak<EventDispatcher>,
}

impl EventSink {
    pub(crate) fn new(dispatcher: &Arc<EventDispatcher>) -> Self {
        Self {
            dispatcher: Arc::downgrade(dispatcher),
        }
    }

    pub fn deliver(&self, raw: RawEvent) {
        match self.dispatcher.upgrade() {
            Some(dispatcher) => dispatcher.on_raw_event(raw),
            None => debug!("controller dropped, discarding radio event"),
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("attached", &(self.dispatcher.strong_count() > 0))
            .finish()
    }
}

/// Registration handle returned by `subscribe`.
///
/// Dropping it keeps the handler registered; call [`unsubscribe`](Self::unsubscribe)
/// to remove it.
#[derive(Debug)]
pub struct Subscription {
    kind: EventKind,
    id: u64,
    dispatcher: Weak<EventDispatcher>,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Remove the handler. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.dispatcher
            .upgrade()
            .is_some_and(|d| d.unsubscribe(self.kind, self.id))
    }
}

// ── Classification ──────────────────────────────────────────────────

/// Turn a raw notification into a typed event.
pub fn classify(raw: RawEvent) -> Result<RadioEvent, DropReason> {
    match raw {
        RawEvent::NetworkReady => Ok(RadioEvent::NetworkReady),
        RawEvent::NetworkFailed => Ok(RadioEvent::NetworkFailed),
        RawEvent::NodeDiscovered {
            descriptor,
            ieee_addr,
            in_clusters,
            out_clusters,
        } => {
            let kind = EventKind::NodeDiscovered;
            let ieee = <[u8; 8]>::try_from(&ieee_addr[..]).map_err(|_| {
                malformed(
                    kind,
                    format!("IEEE address is {} bytes, expected 8", ieee_addr.len()),
                )
            })?;
            Ok(RadioEvent::NodeDiscovered(Arc::new(NodeInfo {
                source_address: descriptor.src_addr,
                network_address: descriptor.nwk_addr,
                endpoint: descriptor.endpoint,
                ieee_address: IeeeAddress::from_le_bytes(ieee),
                profile_id: descriptor.profile_id,
                device_id: descriptor.device_id,
                version: descriptor.version,
                status: descriptor.status,
                flags: descriptor.flags,
                in_clusters: cluster_list(kind, "input", in_clusters)?,
                out_clusters: cluster_list(kind, "output", out_clusters)?,
            })))
        }
        RawEvent::CommandResponse { status, seq_id } => {
            Ok(RadioEvent::CommandResponse(CommandResponse {
                status,
                correlation_id: CorrelationId(seq_id),
            }))
        }
        RawEvent::AttributeResponse { source, payload } => {
            let kind = EventKind::AttributeResponse;
            if payload.len() > MAX_ATTRIBUTE_PAYLOAD {
                return Err(malformed(
                    kind,
                    format!(
                        "payload is {} bytes, limit is {MAX_ATTRIBUTE_PAYLOAD}",
                        payload.len()
                    ),
                ));
            }
            let addr_mode = AddrMode::try_from(source.addr_mode)
                .map_err(|code| malformed(kind, format!("unknown address mode {code}")))?;
            Ok(RadioEvent::AttributeResponse(Arc::new(AttributeReport {
                source_address: source.src_addr,
                endpoint: source.endpoint,
                addr_mode,
                transaction_id: source.transaction_id,
                cluster_id: source.cluster_id,
                payload,
            })))
        }
        RawEvent::Confirm {
            kind,
            correlation_id,
            status,
            data,
        } => {
            if kind == RequestKind::NvRead && data.len() > MAX_NV_ITEM_LEN {
                return Err(malformed(
                    EventKind::Confirm,
                    format!("NV item is {} bytes, limit is {MAX_NV_ITEM_LEN}", data.len()),
                ));
            }
            Ok(RadioEvent::Confirm(Confirmation {
                kind,
                correlation_id,
                status,
                data,
            }))
        }
        RawEvent::NetworkTopology { table } => neighbor_table(table)
            .map(|t| RadioEvent::NetworkTopology(Arc::new(t))),
        RawEvent::DeviceJoined {
            src_addr,
            nwk_addr,
            capabilities,
        } => Ok(RadioEvent::DeviceAnnounced(DeviceAnnounce {
            source_address: src_addr,
            network_address: nwk_addr,
            capabilities,
        })),
        RawEvent::Other { code, .. } => Err(DropReason::UnknownEvent { code }),
    }
}

fn cluster_list(kind: EventKind, which: &str, mut raw: Bytes) -> Result<Vec<u16>, DropReason> {
    if raw.len() % 2 != 0 {
        return Err(malformed(
            kind,
            format!("{which} cluster list has odd length {}", raw.len()),
        ));
    }
    let count = raw.len() / 2;
    if count > MAX_CLUSTERS {
        return Err(malformed(
            kind,
            format!("{which} cluster list has {count} entries, limit is {MAX_CLUSTERS}"),
        ));
    }
    let mut clusters = Vec::with_capacity(count);
    while raw.has_remaining() {
        clusters.push(raw.get_u16_le());
    }
    Ok(clusters)
}

fn neighbor_table(mut raw: Bytes) -> Result<NeighborTable, DropReason> {
    let kind = EventKind::NetworkTopology;
    if raw.remaining() < 4 {
        return Err(malformed(kind, "table header is truncated"));
    }
    let network_address = raw.get_u16_le();
    let device_type = raw.get_u8();
    let count = usize::from(raw.get_u8());
    if count > MAX_NEIGHBORS {
        return Err(malformed(
            kind,
            format!("table lists {count} children, limit is {MAX_NEIGHBORS}"),
        ));
    }
    if raw.remaining() != count * NEIGHBOR_RECORD_LEN {
        return Err(malformed(
            kind,
            format!(
                "table lists {count} children but carries {} record bytes",
                raw.remaining()
            ),
        ));
    }
    let children = (0..count)
        .map(|_| NeighborEntry {
            network_address: raw.get_u16_le(),
            device_type: raw.get_u8(),
            lqi: raw.get_u8(),
            ieee_address: IeeeAddress(raw.get_u64_le()),
        })
        .collect();
    Ok(NeighborTable {
        network_address,
        device_type,
        children,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::BufMut;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::transport::{AttributeSource, EndpointDescriptor};

    fn recorder(
        dispatcher: &Arc<EventDispatcher>,
        kind: EventKind,
        tag: &'static str,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Subscription {
        let log = Arc::clone(log);
        dispatcher.subscribe(kind, move |ev| {
            log.lock().unwrap().push(format!("{tag}:{}", ev.kind()));
        })
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = recorder(&dispatcher, EventKind::NetworkReady, "a", &log);
        let _b = recorder(&dispatcher, EventKind::NetworkReady, "b", &log);
        let _other = recorder(&dispatcher, EventKind::NetworkFailed, "c", &log);

        dispatcher.on_raw_event(RawEvent::NetworkReady);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:NetworkReady".to_owned(), "b:NetworkReady".to_owned()]
        );
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder(&dispatcher, EventKind::NetworkReady, "a", &log);
        let _b = recorder(&dispatcher, EventKind::NetworkReady, "b", &log);

        assert!(a.unsubscribe());
        assert_eq!(dispatcher.handler_count(EventKind::NetworkReady), 1);

        dispatcher.on_raw_event(RawEvent::NetworkReady);
        assert_eq!(*log.lock().unwrap(), vec!["b:NetworkReady".to_owned()]);
    }

    #[test]
    fn handler_may_subscribe_during_delivery() {
        let dispatcher = EventDispatcher::new();
        let inner = Arc::downgrade(&dispatcher);
        let _s = dispatcher.subscribe(EventKind::NetworkReady, move |_| {
            if let Some(d) = inner.upgrade() {
                let _late = d.subscribe(EventKind::NetworkReady, |_| {});
            }
        });

        dispatcher.on_raw_event(RawEvent::NetworkReady);
        assert_eq!(dispatcher.handler_count(EventKind::NetworkReady), 2);
    }

    #[test]
    fn unknown_events_are_counted_not_raised() {
        let dispatcher = EventDispatcher::new();
        dispatcher.on_raw_event(RawEvent::Other {
            code: 0x4580,
            payload: Bytes::new(),
        });
        assert_eq!(dispatcher.dropped_events(), 1);
    }

    #[test]
    fn node_discovery_is_decoded() {
        let event = classify(RawEvent::NodeDiscovered {
            descriptor: EndpointDescriptor {
                src_addr: 0x1234,
                nwk_addr: 0x1234,
                endpoint: 1,
                profile_id: 0x0104,
                device_id: 0x0100,
                ..EndpointDescriptor::default()
            },
            ieee_addr: Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8]),
            in_clusters: Bytes::from_static(&[0x00, 0x00, 0x06, 0x00]),
            out_clusters: Bytes::from_static(&[0x19, 0x00]),
        })
        .unwrap();

        let RadioEvent::NodeDiscovered(node) = event else {
            panic!("expected node discovery, got {event:?}");
        };
        assert_eq!(node.network_address, 0x1234);
        assert_eq!(node.ieee_address, IeeeAddress(0x0807_0605_0403_0201));
        assert_eq!(node.in_clusters, vec![0x0000, 0x0006]);
        assert_eq!(node.out_clusters, vec![0x0019]);
        assert!(node.serves_cluster(0x0006));
    }

    #[test]
    fn malformed_discovery_is_rejected() {
        let raw = |ieee: &'static [u8], clusters: &'static [u8]| RawEvent::NodeDiscovered {
            descriptor: EndpointDescriptor::default(),
            ieee_addr: Bytes::from_static(ieee),
            in_clusters: Bytes::from_static(clusters),
            out_clusters: Bytes::new(),
        };
        assert!(classify(raw(&[1, 2, 3], &[])).is_err());
        assert!(classify(raw(&[0; 8], &[0x06])).is_err());
        assert!(classify(raw(&[0; 8], &[0; 34])).is_err());
        assert!(classify(raw(&[0; 8], &[0; 32])).is_ok());
    }

    #[test]
    fn oversized_attribute_payload_is_dropped() {
        let source = AttributeSource {
            src_addr: 0x1234,
            endpoint: 1,
            addr_mode: 2,
            transaction_id: 4,
            cluster_id: 0x0006,
        };
        assert!(
            classify(RawEvent::AttributeResponse {
                source,
                payload: Bytes::from(vec![0u8; 255]),
            })
            .is_ok()
        );
        assert!(matches!(
            classify(RawEvent::AttributeResponse {
                source,
                payload: Bytes::from(vec![0u8; 256]),
            }),
            Err(DropReason::Malformed {
                kind: EventKind::AttributeResponse,
                ..
            })
        ));
        let bad_mode = AttributeSource {
            addr_mode: 9,
            ..source
        };
        assert!(
            classify(RawEvent::AttributeResponse {
                source: bad_mode,
                payload: Bytes::new(),
            })
            .is_err()
        );
    }

    #[test]
    fn neighbor_table_is_unpacked() {
        let mut raw = bytes::BytesMut::new();
        raw.put_u16_le(0x0000);
        raw.put_u8(0);
        raw.put_u8(2);
        for (addr, lqi) in [(0x1234u16, 200u8), (0x5678, 90)] {
            raw.put_u16_le(addr);
            raw.put_u8(2);
            raw.put_u8(lqi);
            raw.put_u64_le(u64::from(addr));
        }

        let event = classify(RawEvent::NetworkTopology {
            table: raw.freeze(),
        })
        .unwrap();
        let RadioEvent::NetworkTopology(table) = event else {
            panic!("expected topology, got {event:?}");
        };
        assert_eq!(table.children.len(), 2);
        assert_eq!(table.children[1].network_address, 0x5678);
        assert_eq!(table.children[1].lqi, 90);
        assert_eq!(table.children[0].ieee_address, IeeeAddress(0x1234));
    }

    #[test]
    fn neighbor_table_length_must_match_count() {
        let truncated = Bytes::from_static(&[0x00, 0x00, 0x00, 0x01, 0x34, 0x12]);
        assert!(classify(RawEvent::NetworkTopology { table: truncated }).is_err());

        let too_many = Bytes::from_static(&[0x00, 0x00, 0x00, 21]);
        assert!(classify(RawEvent::NetworkTopology { table: too_many }).is_err());
    }

    #[test]
    fn oversized_nv_read_is_dropped() {
        let confirm = |len: usize| RawEvent::Confirm {
            kind: RequestKind::NvRead,
            correlation_id: CorrelationId(1),
            status: 0,
            data: Bytes::from(vec![0u8; len]),
        };
        assert!(classify(confirm(248)).is_ok());
        assert!(classify(confirm(249)).is_err());
    }

    #[test]
    fn sink_outliving_dispatcher_discards() {
        let dispatcher = EventDispatcher::new();
        let sink = EventSink::new(&dispatcher);
        drop(dispatcher);
        sink.deliver(RawEvent::NetworkReady);
    }
}
