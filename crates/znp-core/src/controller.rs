// ── Controller facade ──
//
// The public operation surface. Owns the configuration and composes the
// dispatcher, lifecycle state machine and pending-request table around a
// single radio transport.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::NetworkConfig;
use crate::dispatch::{EventDispatcher, EventSink, MAX_NV_ITEM_LEN, Subscription};
use crate::error::CoreError;
use crate::lifecycle::{BringUpAction, Lifecycle, LifecycleState};
use crate::model::{
    AttributeReport, CommandStatus, DeviceAnnounce, EventKind, NeighborTable, NodeInfo,
    RadioEvent, SequenceNumber, ZclCommand,
};
use crate::pending::{
    Completion, CorrelationId, PendingReply, PendingSummary, PendingTable, RequestKind,
};
use crate::stream::EventStream;
use crate::transport::{Outbound, RadioTransport, Request};

// ── Controller ───────────────────────────────────────────────────

/// Host-side controller for one ZNP radio.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Construction never
/// touches the transport; only [`connect()`](Self::connect),
/// [`start()`](Self::start) and the request operations do.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: NetworkConfig,
    transport: Arc<dyn RadioTransport>,
    dispatcher: Arc<EventDispatcher>,
    lifecycle: Arc<Lifecycle>,
    pending: Arc<PendingTable>,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("state", &self.state())
            .field("pending", &self.inner.pending.len())
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Create a controller and wire its internal event handlers.
    pub fn new(config: NetworkConfig, transport: Arc<dyn RadioTransport>) -> Self {
        let dispatcher = EventDispatcher::new();
        let lifecycle = Arc::new(Lifecycle::new());
        let pending = Arc::new(PendingTable::new());
        wire_internal_handlers(&dispatcher, &lifecycle, &pending);

        Self {
            inner: Arc::new(ControllerInner {
                config,
                transport,
                dispatcher,
                lifecycle,
                pending,
            }),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.inner.config
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Ask the transport to open the serial device at `path`.
    ///
    /// Independent of the lifecycle state. Resolves with whatever the
    /// transport reports.
    pub async fn connect(&self, path: &str) -> Result<bool, CoreError> {
        info!(path, baud_rate = self.inner.config.baud_rate, "opening radio transport");
        let sink = EventSink::new(&self.inner.dispatcher);
        let opened = self
            .inner
            .transport
            .open(path, &self.inner.config, sink)
            .await?;
        if opened {
            debug!(path, "radio transport open");
        } else {
            warn!(path, "radio transport refused to open");
        }
        Ok(opened)
    }

    /// Bring the radio up into a network.
    ///
    /// The bring-up command is sent when `start()` is called, not when
    /// the returned future is first polled. While an attempt is in flight
    /// further calls share its outcome; once ready, `start()` resolves
    /// immediately. After a failure, call [`disconnect()`](Self::disconnect)
    /// before retrying. A disconnect ends every earlier `start()` with
    /// [`CoreError::ControllerShutdown`], even if a new attempt begins
    /// before those futures are polled.
    pub fn start(&self) -> BringUp {
        let inner = &self.inner;
        if let Err(e) = inner.config.validate() {
            return BringUp::ready(Err(e));
        }

        match inner.lifecycle.begin_bring_up() {
            BringUpAction::AlreadyReady => BringUp::ready(Ok(())),
            BringUpAction::Failed => BringUp::ready(Err(CoreError::NetworkFailed)),
            BringUpAction::InFlight(attempt) => {
                debug!("bring-up already in flight, sharing its outcome");
                BringUp::waiting(inner.lifecycle.settled(attempt))
            }
            BringUpAction::Issue(attempt) => {
                let settled = inner.lifecycle.settled(attempt);
                info!(
                    device_type = %inner.config.device_type,
                    channels = ?inner.config.channels(),
                    pan_id = format_args!("{:#06x}", inner.config.effective_pan_id()),
                    new_network = inner.config.start_new_network,
                    "starting network"
                );
                let frame = Outbound {
                    correlation: None,
                    request: Request::StartNetwork(inner.config.clone()),
                };
                if let Err(e) = inner.transport.send(frame) {
                    warn!(error = %e, "bring-up command could not be sent");
                    inner.lifecycle.network_failed();
                    return BringUp::ready(Err(e.into()));
                }
                BringUp::waiting(settled)
            }
        }
    }

    /// Close the transport and fail every outstanding request.
    ///
    /// Allowed from any state. A later `start()` begins a fresh attempt.
    pub fn disconnect(&self) {
        let previous = self.inner.lifecycle.disconnect();
        if let Err(e) = self.inner.transport.close() {
            warn!(error = %e, "closing radio transport failed");
        }
        let failed = self.inner.pending.fail_all(&CoreError::ControllerShutdown);
        info!(previous = %previous, failed, "controller disconnected");
    }

    // ── Requests ─────────────────────────────────────────────────

    /// Open the join window for `duration_secs` seconds (0 closes it).
    pub fn add_join_window(&self, duration_secs: u16) -> Result<Reply<()>, CoreError> {
        const OPERATION: &str = "add_join_window";
        self.inner.lifecycle.require_ready(OPERATION)?;
        let duration = u8::try_from(duration_secs).map_err(|_| {
            CoreError::validation(format!(
                "join window of {duration_secs}s exceeds the 255s maximum"
            ))
        })?;

        let pending = self.inner.pending.register(RequestKind::JoinWindow)?;
        info!(duration, id = %pending.correlation_id(), "opening join window");
        let pending = self.send_tracked(pending, Request::PermitJoin { duration });
        Ok(Reply::new(pending, OPERATION, confirmed))
    }

    /// Send a ZCL command and wait for its command-response.
    ///
    /// The correlation id doubles as the ZCL sequence number written into
    /// the frame. A non-zero status is returned, not raised.
    pub fn dispatch_zcl_command(
        &self,
        command: ZclCommand,
    ) -> Result<Reply<CommandStatus>, CoreError> {
        const OPERATION: &str = "dispatch_zcl_command";
        self.inner.lifecycle.require_ready(OPERATION)?;
        command.validate()?;

        let pending = match command.sequence {
            SequenceNumber::Auto => self.inner.pending.register(RequestKind::ZclCommand)?,
            SequenceNumber::Fixed(seq) => self
                .inner
                .pending
                .register_with(RequestKind::ZclCommand, CorrelationId(seq))?,
        };
        let sequence_number = pending.correlation_id().0;
        debug!(
            seq = sequence_number,
            dst = format_args!("{:#06x}", command.dst_addr),
            cluster = format_args!("{:#06x}", command.cluster_id),
            "dispatching ZCL command"
        );
        let pending = self.send_tracked(
            pending,
            Request::Zcl {
                sequence_number,
                command,
            },
        );
        Ok(Reply::new(pending, OPERATION, |_, id, completion| {
            Ok(CommandStatus {
                status: completion.status,
                correlation_id: id,
            })
        }))
    }

    /// Read a non-volatile item from the radio.
    pub fn read_nv_item(&self, id: u16) -> Result<Reply<Bytes>, CoreError> {
        const OPERATION: &str = "read_nv_item";
        self.inner.lifecycle.require_ready(OPERATION)?;
        let pending = self.inner.pending.register(RequestKind::NvRead)?;
        let pending = self.send_tracked(pending, Request::ReadNvItem { id });
        Ok(Reply::new(pending, OPERATION, |operation, _, completion| {
            if completion.status == 0 {
                Ok(completion.data)
            } else {
                Err(CoreError::Rejected {
                    operation,
                    status: completion.status,
                })
            }
        }))
    }

    /// Write a non-volatile item (at most 248 bytes).
    pub fn write_nv_item(&self, id: u16, value: impl Into<Bytes>) -> Result<Reply<()>, CoreError> {
        const OPERATION: &str = "write_nv_item";
        self.inner.lifecycle.require_ready(OPERATION)?;
        let value = value.into();
        if value.len() > MAX_NV_ITEM_LEN {
            return Err(CoreError::validation(format!(
                "NV item value is {} bytes, limit is {MAX_NV_ITEM_LEN}",
                value.len()
            )));
        }
        let pending = self.inner.pending.register(RequestKind::NvWrite)?;
        let pending = self.send_tracked(pending, Request::WriteNvItem { id, value });
        Ok(Reply::new(pending, OPERATION, confirmed))
    }

    /// Ask `dst_addr` for its neighbor table. The table itself arrives on
    /// [`topology_updates()`](Self::topology_updates).
    pub fn request_neighbor_table(&self, dst_addr: u16) -> Result<Reply<()>, CoreError> {
        const OPERATION: &str = "request_neighbor_table";
        self.inner.lifecycle.require_ready(OPERATION)?;
        let pending = self.inner.pending.register(RequestKind::LqiRequest)?;
        let pending = self.send_tracked(pending, Request::LqiRequest { dst_addr });
        Ok(Reply::new(pending, OPERATION, confirmed))
    }

    /// Broadcast an end-device announce on behalf of a node.
    pub fn announce_end_device(&self, announce: DeviceAnnounce) -> Result<Reply<()>, CoreError> {
        const OPERATION: &str = "announce_end_device";
        self.inner.lifecycle.require_ready(OPERATION)?;
        let pending = self.inner.pending.register(RequestKind::DeviceAnnounce)?;
        let pending = self.send_tracked(pending, Request::EndDeviceAnnounce(announce));
        Ok(Reply::new(pending, OPERATION, confirmed))
    }

    /// Hand a registered request to the transport. A send failure rejects
    /// the entry so the caller sees it through the reply.
    fn send_tracked(&self, pending: PendingReply, request: Request) -> PendingReply {
        let id = pending.correlation_id();
        let frame = Outbound {
            correlation: Some(id),
            request,
        };
        if let Err(e) = self.inner.transport.send(frame) {
            warn!(id = %id, kind = %pending.kind(), error = %e, "send failed");
            self.inner.pending.reject(id, e.into());
        }
        pending
    }

    // ── Events ───────────────────────────────────────────────────

    /// Register a handler for one event kind. Handlers run synchronously
    /// on the transport's delivery thread and must not block.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&RadioEvent) + Send + Sync + 'static,
    {
        self.inner.dispatcher.subscribe(kind, handler)
    }

    pub fn node_discoveries(&self) -> EventStream<Arc<NodeInfo>> {
        EventStream::attach(&self.inner.dispatcher, EventKind::NodeDiscovered, |ev| {
            match ev {
                RadioEvent::NodeDiscovered(node) => Some(Arc::clone(node)),
                _ => None,
            }
        })
    }

    pub fn attribute_responses(&self) -> EventStream<Arc<AttributeReport>> {
        EventStream::attach(&self.inner.dispatcher, EventKind::AttributeResponse, |ev| {
            match ev {
                RadioEvent::AttributeResponse(report) => Some(Arc::clone(report)),
                _ => None,
            }
        })
    }

    pub fn topology_updates(&self) -> EventStream<Arc<NeighborTable>> {
        EventStream::attach(&self.inner.dispatcher, EventKind::NetworkTopology, |ev| {
            match ev {
                RadioEvent::NetworkTopology(table) => Some(Arc::clone(table)),
                _ => None,
            }
        })
    }

    pub fn device_announcements(&self) -> EventStream<DeviceAnnounce> {
        EventStream::attach(&self.inner.dispatcher, EventKind::DeviceAnnounced, |ev| {
            match ev {
                RadioEvent::DeviceAnnounced(announce) => Some(*announce),
                _ => None,
            }
        })
    }

    /// Sink a transport (or test harness) pushes raw notifications into.
    pub fn event_sink(&self) -> EventSink {
        EventSink::new(&self.inner.dispatcher)
    }

    // ── Diagnostics ──────────────────────────────────────────────

    pub fn state(&self) -> LifecycleState {
        self.inner.lifecycle.current()
    }

    /// Subscribe to lifecycle transitions.
    pub fn lifecycle(&self) -> watch::Receiver<LifecycleState> {
        self.inner.lifecycle.subscribe()
    }

    pub fn pending_requests(&self) -> Vec<PendingSummary> {
        self.inner.pending.snapshot()
    }

    pub fn is_pending(&self, id: CorrelationId) -> bool {
        self.inner.pending.contains(id)
    }

    /// Raw notifications dropped because they could not be classified.
    pub fn dropped_events(&self) -> u64 {
        self.inner.dispatcher.dropped_events()
    }
}

fn wire_internal_handlers(
    dispatcher: &Arc<EventDispatcher>,
    lifecycle: &Arc<Lifecycle>,
    pending: &Arc<PendingTable>,
) {
    let lc = Arc::clone(lifecycle);
    dispatcher.subscribe(EventKind::NetworkReady, move |_| {
        lc.network_ready();
    });

    let lc = Arc::clone(lifecycle);
    dispatcher.subscribe(EventKind::NetworkFailed, move |_| {
        lc.network_failed();
    });

    let table = Arc::clone(pending);
    dispatcher.subscribe(EventKind::CommandResponse, move |ev| {
        if let RadioEvent::CommandResponse(response) = ev {
            table.resolve(
                RequestKind::ZclCommand,
                response.correlation_id,
                Completion::status(response.status),
            );
        }
    });

    let table = Arc::clone(pending);
    dispatcher.subscribe(EventKind::Confirm, move |ev| {
        if let RadioEvent::Confirm(confirm) = ev {
            table.resolve(
                confirm.kind,
                confirm.correlation_id,
                Completion {
                    status: confirm.status,
                    data: confirm.data.clone(),
                },
            );
        }
    });
}

fn confirmed(
    operation: &'static str,
    _id: CorrelationId,
    completion: Completion,
) -> Result<(), CoreError> {
    match completion.status {
        0 => Ok(()),
        status => Err(CoreError::Rejected { operation, status }),
    }
}

// ── Futures ──────────────────────────────────────────────────────

/// Outcome of [`Controller::start`].
#[must_use = "the bring-up outcome is only observable by awaiting it"]
pub struct BringUp {
    inner: BoxFuture<'static, Result<(), CoreError>>,
}

impl BringUp {
    fn ready(result: Result<(), CoreError>) -> Self {
        Self {
            inner: Box::pin(std::future::ready(result)),
        }
    }

    fn waiting(fut: impl Future<Output = Result<(), CoreError>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(fut),
        }
    }
}

impl Future for BringUp {
    type Output = Result<(), CoreError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl fmt::Debug for BringUp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BringUp").finish_non_exhaustive()
    }
}

type ReplyMap<T> = fn(&'static str, CorrelationId, Completion) -> Result<T, CoreError>;

/// Awaitable completion of a request the controller accepted.
///
/// Dropping it does not cancel anything: the request stays in the
/// pending table until its completion arrives or the controller
/// disconnects.
#[must_use = "the request outcome is only observable by awaiting the reply"]
pub struct Reply<T> {
    pending: PendingReply,
    operation: &'static str,
    map: ReplyMap<T>,
}

impl<T> Reply<T> {
    fn new(pending: PendingReply, operation: &'static str, map: ReplyMap<T>) -> Self {
        Self {
            pending,
            operation,
            map,
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.pending.correlation_id()
    }
}

impl<T> Future for Reply<T> {
    type Output = Result<T, CoreError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let id = this.pending.correlation_id();
        Pin::new(&mut this.pending)
            .poll(cx)
            .map(|res| res.and_then(|completion| (this.map)(this.operation, id, completion)))
    }
}

impl<T> fmt::Debug for Reply<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("operation", &self.operation)
            .field("correlation_id", &self.pending.correlation_id())
            .finish()
    }
}

/// Await `fut` for at most `deadline`.
///
/// On expiry the request is not withdrawn: its pending entry stays until
/// a late completion arrives (and is dropped) or the controller
/// disconnects.
pub async fn with_deadline<F, T>(deadline: Duration, fut: F) -> Result<T, CoreError>
where
    F: Future<Output = Result<T, CoreError>>,
{
    let timeout_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| CoreError::Timeout { timeout_ms })?
}
