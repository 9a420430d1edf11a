// ── Lifecycle state machine ──
//
// Event-driven bring-up sequencing. The state lives in a `watch` channel
// so the facade and any observers see every transition; the machine
// itself never times out. Every bring-up and every disconnect bumps an
// attempt counter, always under the channel's write lock, so a waiter
// can tell its own attempt apart from a later one.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use strum::Display;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum LifecycleState {
    Uninitialized,
    AwaitingNetworkResult,
    NetworkReady,
    NetworkFailed,
    Disconnected,
}

/// One bring-up, from `begin_bring_up` until it settles or is disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Attempt(u64);

/// What `begin_bring_up` decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BringUpAction {
    /// Moved to `AwaitingNetworkResult`; the caller must send the
    /// bring-up command.
    Issue(Attempt),
    /// An attempt is already in flight.
    InFlight(Attempt),
    AlreadyReady,
    Failed,
}

pub(crate) struct Lifecycle {
    state: watch::Sender<LifecycleState>,
    attempt: Arc<AtomicU64>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Uninitialized);
        Self {
            state,
            attempt: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn current(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub(crate) fn begin_bring_up(&self) -> BringUpAction {
        let mut action = BringUpAction::Failed;
        self.state.send_if_modified(|state| match *state {
            LifecycleState::Uninitialized | LifecycleState::Disconnected => {
                *state = LifecycleState::AwaitingNetworkResult;
                let id = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;
                action = BringUpAction::Issue(Attempt(id));
                true
            }
            LifecycleState::AwaitingNetworkResult => {
                action = BringUpAction::InFlight(Attempt(self.attempt.load(Ordering::SeqCst)));
                false
            }
            LifecycleState::NetworkReady => {
                action = BringUpAction::AlreadyReady;
                false
            }
            LifecycleState::NetworkFailed => {
                action = BringUpAction::Failed;
                false
            }
        });
        action
    }

    /// `network-ready` event. Ignored unless a bring-up is in flight.
    pub(crate) fn network_ready(&self) -> bool {
        self.settle(LifecycleState::NetworkReady)
    }

    /// `network-failed` event, or the bring-up command could not be sent.
    pub(crate) fn network_failed(&self) -> bool {
        self.settle(LifecycleState::NetworkFailed)
    }

    fn settle(&self, outcome: LifecycleState) -> bool {
        let moved = self.state.send_if_modified(|state| {
            if *state == LifecycleState::AwaitingNetworkResult {
                *state = outcome;
                true
            } else {
                false
            }
        });
        if moved {
            info!(state = %outcome, "network bring-up settled");
        } else {
            debug!(
                event = %outcome,
                state = %self.current(),
                "ignoring network event outside bring-up"
            );
        }
        moved
    }

    /// Move to `Disconnected` from any state and retire the current attempt.
    /// Returns the previous state.
    pub(crate) fn disconnect(&self) -> LifecycleState {
        let mut previous = LifecycleState::Disconnected;
        self.state.send_modify(|state| {
            previous = std::mem::replace(state, LifecycleState::Disconnected);
            self.attempt.fetch_add(1, Ordering::SeqCst);
        });
        if previous == LifecycleState::AwaitingNetworkResult {
            warn!("disconnected while network bring-up was in flight");
        }
        previous
    }

    /// Usage check for operations that need a formed network.
    pub(crate) fn require_ready(&self, operation: &'static str) -> Result<(), CoreError> {
        match self.current() {
            LifecycleState::NetworkReady => Ok(()),
            state => Err(CoreError::InvalidState { operation, state }),
        }
    }

    /// Resolves once `attempt` settles. A disconnect, or any later attempt,
    /// ends the wait with `ControllerShutdown`.
    pub(crate) fn settled(
        &self,
        attempt: Attempt,
    ) -> impl Future<Output = Result<(), CoreError>> + Send + 'static {
        let mut rx = self.state.subscribe();
        let current = Arc::clone(&self.attempt);
        async move {
            let mut outcome = None;
            rx.wait_for(|state| {
                if current.load(Ordering::SeqCst) != attempt.0 {
                    outcome = Some(Err(CoreError::ControllerShutdown));
                } else if *state != LifecycleState::AwaitingNetworkResult {
                    outcome = Some(outcome_of(*state));
                }
                outcome.is_some()
            })
            .await
            .map_err(|_| CoreError::ControllerShutdown)?;
            outcome.unwrap_or(Err(CoreError::ControllerShutdown))
        }
    }
}

/// Map a settled state onto the result of `start()`.
pub(crate) fn outcome_of(state: LifecycleState) -> Result<(), CoreError> {
    match state {
        LifecycleState::NetworkReady => Ok(()),
        LifecycleState::NetworkFailed => Err(CoreError::NetworkFailed),
        LifecycleState::Disconnected => Err(CoreError::ControllerShutdown),
        state @ (LifecycleState::Uninitialized | LifecycleState::AwaitingNetworkResult) => {
            Err(CoreError::InvalidState {
                operation: "start",
                state,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;

    fn issued(lc: &Lifecycle) -> Attempt {
        match lc.begin_bring_up() {
            BringUpAction::Issue(attempt) => attempt,
            other => panic!("expected a fresh attempt, got {other:?}"),
        }
    }

    #[test]
    fn bring_up_passes_through_awaiting() {
        let lc = Lifecycle::new();
        assert_eq!(lc.current(), LifecycleState::Uninitialized);

        assert!(!lc.network_ready());
        assert_eq!(lc.current(), LifecycleState::Uninitialized);

        let attempt = issued(&lc);
        assert_eq!(lc.current(), LifecycleState::AwaitingNetworkResult);
        assert_eq!(lc.begin_bring_up(), BringUpAction::InFlight(attempt));

        assert!(lc.network_ready());
        assert_eq!(lc.current(), LifecycleState::NetworkReady);
        assert_eq!(lc.begin_bring_up(), BringUpAction::AlreadyReady);
    }

    #[test]
    fn settled_states_do_not_revert() {
        let lc = Lifecycle::new();
        lc.begin_bring_up();
        assert!(lc.network_failed());
        assert!(!lc.network_ready());
        assert_eq!(lc.current(), LifecycleState::NetworkFailed);
        assert_eq!(lc.begin_bring_up(), BringUpAction::Failed);
    }

    #[test]
    fn disconnect_allows_a_fresh_attempt() {
        let lc = Lifecycle::new();
        lc.begin_bring_up();
        lc.network_failed();
        assert_eq!(lc.disconnect(), LifecycleState::NetworkFailed);
        assert!(matches!(lc.begin_bring_up(), BringUpAction::Issue(_)));
    }

    #[test]
    fn require_ready_reports_current_state() {
        let lc = Lifecycle::new();
        let err = lc.require_ready("dispatch_zcl_command").unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidState {
                operation: "dispatch_zcl_command",
                state: LifecycleState::Uninitialized
            }
        ));
    }

    #[test]
    fn settled_waits_for_the_outcome() {
        let lc = Lifecycle::new();
        let attempt = issued(&lc);
        let mut first = task::spawn(lc.settled(attempt));
        let mut second = task::spawn(lc.settled(attempt));
        assert_pending!(first.poll());
        assert_pending!(second.poll());

        lc.network_ready();
        assert!(first.is_woken());
        assert!(assert_ready!(first.poll()).is_ok());
        assert!(assert_ready!(second.poll()).is_ok());
    }

    #[test]
    fn disconnect_during_bring_up_ends_the_wait() {
        let lc = Lifecycle::new();
        let attempt = issued(&lc);
        let mut wait = task::spawn(lc.settled(attempt));
        assert_pending!(wait.poll());

        lc.disconnect();
        assert!(matches!(
            assert_ready!(wait.poll()),
            Err(CoreError::ControllerShutdown)
        ));
    }

    #[test]
    fn stale_waiter_does_not_join_a_later_attempt() {
        let lc = Lifecycle::new();
        let first = issued(&lc);
        let mut stale = task::spawn(lc.settled(first));
        lc.disconnect();
        let second = issued(&lc);
        assert_ne!(first, second);
        let mut fresh = task::spawn(lc.settled(second));

        lc.network_ready();
        assert!(assert_ready!(fresh.poll()).is_ok());
        assert!(matches!(
            assert_ready!(stale.poll()),
            Err(CoreError::ControllerShutdown)
        ));
    }

    #[test]
    fn state_names_are_kebab_case() {
        assert_eq!(
            LifecycleState::AwaitingNetworkResult.to_string(),
            "awaiting-network-result"
        );
    }
}
