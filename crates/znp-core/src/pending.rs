// ── Pending-request table ──
//
// Keyed completion registry. Each host request that needs a hardware
// acknowledgment parks a oneshot sender here under its correlation id;
// the dispatcher resolves it when the matching event arrives.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU16, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::error::CoreError;

/// Identifier linking an outgoing request to its asynchronous completion.
///
/// For ZCL commands this is the transaction sequence number carried in
/// the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(pub u16);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a pending entry is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RequestKind {
    JoinWindow,
    ZclCommand,
    NvRead,
    NvWrite,
    LqiRequest,
    DeviceAnnounce,
}

/// Raw completion reported by the radio.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Completion {
    pub status: u8,
    pub data: Bytes,
}

impl Completion {
    pub fn status(status: u8) -> Self {
        Self {
            status,
            data: Bytes::new(),
        }
    }
}

type Slot = oneshot::Sender<Result<Completion, CoreError>>;

struct PendingRequest {
    kind: RequestKind,
    created_at: Instant,
    slot: Slot,
}

/// Point-in-time view of one live entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSummary {
    pub correlation_id: CorrelationId,
    pub kind: RequestKind,
    pub age: Duration,
}

/// Live requests keyed by correlation id. At most one entry per id.
pub struct PendingTable {
    entries: DashMap<CorrelationId, PendingRequest>,
    next: AtomicU16,
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next: AtomicU16::new(1),
        }
    }

    /// Allocate a fresh correlation id and park a waiter under it.
    ///
    /// Ids are handed out in increasing order, wrapping at `u16::MAX`
    /// and skipping any id that is still live.
    pub fn register(&self, kind: RequestKind) -> Result<PendingReply, CoreError> {
        for _ in 0..=u32::from(u16::MAX) {
            let id = CorrelationId(self.next.fetch_add(1, Ordering::Relaxed));
            if let Entry::Vacant(vacant) = self.entries.entry(id) {
                return Ok(Self::park(vacant, id, kind));
            }
        }
        Err(CoreError::CorrelationExhausted)
    }

    /// Park a waiter under a caller-chosen id.
    pub fn register_with(
        &self,
        kind: RequestKind,
        id: CorrelationId,
    ) -> Result<PendingReply, CoreError> {
        match self.entries.entry(id) {
            Entry::Vacant(vacant) => Ok(Self::park(vacant, id, kind)),
            Entry::Occupied(occupied) => Err(CoreError::DuplicateCorrelation {
                id,
                kind: occupied.get().kind,
            }),
        }
    }

    fn park(
        vacant: dashmap::mapref::entry::VacantEntry<'_, CorrelationId, PendingRequest>,
        id: CorrelationId,
        kind: RequestKind,
    ) -> PendingReply {
        let (tx, rx) = oneshot::channel();
        vacant.insert(PendingRequest {
            kind,
            created_at: Instant::now(),
            slot: tx,
        });
        debug!(id = %id, kind = %kind, "registered pending request");
        PendingReply { id, kind, rx }
    }

    /// Complete the entry for `id` if it is waiting for `kind`.
    ///
    /// Returns `false` (and logs) when nothing matches: a late response,
    /// a duplicate, or an event for a request this controller never made.
    pub fn resolve(&self, kind: RequestKind, id: CorrelationId, completion: Completion) -> bool {
        match self.entries.remove_if(&id, |_, entry| entry.kind == kind) {
            Some((_, entry)) => {
                if entry.slot.send(Ok(completion)).is_err() {
                    debug!(id = %id, kind = %kind, "waiter went away before completion");
                }
                true
            }
            None => {
                debug!(id = %id, kind = %kind, "dropping unmatched completion");
                false
            }
        }
    }

    /// Fail the entry for `id`, whatever it is waiting for.
    pub fn reject(&self, id: CorrelationId, error: CoreError) -> bool {
        match self.entries.remove(&id) {
            Some((_, entry)) => {
                let _ = entry.slot.send(Err(error));
                true
            }
            None => {
                debug!(id = %id, "dropping rejection for unknown request");
                false
            }
        }
    }

    /// Reject every live entry with `error` and empty the table.
    pub fn fail_all(&self, error: &CoreError) -> usize {
        let ids: Vec<CorrelationId> = self.entries.iter().map(|e| *e.key()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, entry)) = self.entries.remove(&id) {
                let _ = entry.slot.send(Err(error.clone()));
                failed += 1;
            }
        }
        if failed > 0 {
            debug!(count = failed, error = %error, "failed all pending requests");
        }
        failed
    }

    pub fn contains(&self, id: CorrelationId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live entries ordered by correlation id.
    pub fn snapshot(&self) -> Vec<PendingSummary> {
        let now = Instant::now();
        let mut out: Vec<PendingSummary> = self
            .entries
            .iter()
            .map(|e| PendingSummary {
                correlation_id: *e.key(),
                kind: e.value().kind,
                age: now.saturating_duration_since(e.value().created_at),
            })
            .collect();
        out.sort_by_key(|s| s.correlation_id);
        out
    }
}

/// Handle awaited by the caller of a registered request.
///
/// Dropping it leaves the table entry in place; a late completion for it
/// is discarded.
#[derive(Debug)]
pub struct PendingReply {
    id: CorrelationId,
    kind: RequestKind,
    rx: oneshot::Receiver<Result<Completion, CoreError>>,
}

impl PendingReply {
    pub fn correlation_id(&self) -> CorrelationId {
        self.id
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }
}

impl Future for PendingReply {
    type Output = Result<Completion, CoreError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(CoreError::ControllerShutdown)))
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;

    #[test]
    fn ids_are_unique_while_live() {
        let table = PendingTable::new();
        let a = table.register(RequestKind::ZclCommand).unwrap();
        let b = table.register(RequestKind::ZclCommand).unwrap();
        assert_ne!(a.correlation_id(), b.correlation_id());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn auto_allocation_skips_live_ids() {
        let table = PendingTable::new();
        let _fixed = table
            .register_with(RequestKind::ZclCommand, CorrelationId(1))
            .unwrap();
        let auto = table.register(RequestKind::ZclCommand).unwrap();
        assert_eq!(auto.correlation_id(), CorrelationId(2));
    }

    #[test]
    fn allocation_wraps_past_max_and_skips_live_ids() {
        let table = PendingTable::new();
        table.next.store(u16::MAX - 1, Ordering::Relaxed);
        let _max = table
            .register_with(RequestKind::ZclCommand, CorrelationId(u16::MAX))
            .unwrap();
        let _zero = table
            .register_with(RequestKind::ZclCommand, CorrelationId(0))
            .unwrap();

        let ids: Vec<_> = (0..3)
            .map(|_| table.register(RequestKind::NvRead).unwrap())
            .collect();
        let ids: Vec<_> = ids.iter().map(PendingReply::correlation_id).collect();
        assert_eq!(
            ids,
            vec![CorrelationId(u16::MAX - 1), CorrelationId(1), CorrelationId(2)]
        );
    }

    #[test]
    fn full_table_reports_exhaustion() {
        let table = PendingTable::new();
        let held: Vec<_> = (0..=u32::from(u16::MAX))
            .map(|_| table.register(RequestKind::ZclCommand).unwrap())
            .collect();
        assert_eq!(table.len(), held.len());

        assert!(matches!(
            table.register(RequestKind::ZclCommand),
            Err(CoreError::CorrelationExhausted)
        ));

        assert!(table.reject(CorrelationId(40_000), CoreError::ControllerShutdown));
        let reused = table.register(RequestKind::ZclCommand).unwrap();
        assert_eq!(reused.correlation_id(), CorrelationId(40_000));
    }

    #[test]
    fn duplicate_fixed_id_is_refused() {
        let table = PendingTable::new();
        let _a = table
            .register_with(RequestKind::ZclCommand, CorrelationId(7))
            .unwrap();
        let err = table
            .register_with(RequestKind::ZclCommand, CorrelationId(7))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::DuplicateCorrelation {
                id: CorrelationId(7),
                kind: RequestKind::ZclCommand
            }
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn unmatched_response_leaves_other_entries_pending() {
        let table = PendingTable::new();
        let a = table
            .register_with(RequestKind::ZclCommand, CorrelationId(1))
            .unwrap();
        let mut a = task::spawn(a);
        assert_pending!(a.poll());

        assert!(!table.resolve(
            RequestKind::ZclCommand,
            CorrelationId(99),
            Completion::status(0)
        ));

        assert_pending!(a.poll());
        assert!(table.contains(CorrelationId(1)));
    }

    #[test]
    fn resolve_requires_matching_kind() {
        let table = PendingTable::new();
        let reply = table
            .register_with(RequestKind::NvRead, CorrelationId(3))
            .unwrap();
        let mut reply = task::spawn(reply);

        assert!(!table.resolve(RequestKind::ZclCommand, CorrelationId(3), Completion::status(0)));
        assert_pending!(reply.poll());

        let completion = Completion {
            status: 0,
            data: Bytes::from_static(&[1, 2]),
        };
        assert!(table.resolve(RequestKind::NvRead, CorrelationId(3), completion.clone()));
        assert!(reply.is_woken());
        assert_eq!(assert_ready!(reply.poll()).unwrap(), completion);
        assert!(table.is_empty());
    }

    #[test]
    fn second_resolve_is_dropped() {
        let table = PendingTable::new();
        let _reply = table
            .register_with(RequestKind::ZclCommand, CorrelationId(5))
            .unwrap();
        assert!(table.resolve(RequestKind::ZclCommand, CorrelationId(5), Completion::status(0)));
        assert!(!table.resolve(RequestKind::ZclCommand, CorrelationId(5), Completion::status(0)));
    }

    #[test]
    fn reject_delivers_the_error() {
        let table = PendingTable::new();
        let reply = table.register(RequestKind::JoinWindow).unwrap();
        let id = reply.correlation_id();
        let mut reply = task::spawn(reply);

        assert!(table.reject(id, CoreError::NetworkFailed));
        assert!(matches!(
            assert_ready!(reply.poll()),
            Err(CoreError::NetworkFailed)
        ));
        assert!(!table.reject(id, CoreError::NetworkFailed));
    }

    #[test]
    fn fail_all_empties_the_table() {
        let table = PendingTable::new();
        let mut a = task::spawn(table.register(RequestKind::ZclCommand).unwrap());
        let mut b = task::spawn(table.register(RequestKind::JoinWindow).unwrap());

        assert_eq!(table.fail_all(&CoreError::ControllerShutdown), 2);
        assert!(table.is_empty());
        assert!(matches!(
            assert_ready!(a.poll()),
            Err(CoreError::ControllerShutdown)
        ));
        assert!(matches!(
            assert_ready!(b.poll()),
            Err(CoreError::ControllerShutdown)
        ));
    }

    #[test]
    fn dropped_waiter_leaves_orphan_until_cleared() {
        let table = PendingTable::new();
        let reply = table.register(RequestKind::ZclCommand).unwrap();
        let id = reply.correlation_id();
        drop(reply);

        assert!(table.contains(id));
        assert!(table.resolve(RequestKind::ZclCommand, id, Completion::status(0)));
        assert!(table.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_reports_age() {
        let table = PendingTable::new();
        let _a = table.register(RequestKind::NvWrite).unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;
        let _b = table.register(RequestKind::LqiRequest).unwrap();

        let snap = table.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].kind, RequestKind::NvWrite);
        assert_eq!(snap[0].age, Duration::from_secs(3));
        assert_eq!(snap[1].age, Duration::ZERO);
    }
}
