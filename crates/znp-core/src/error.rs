// ── Core error types ──
//
// Every facade operation reports failure through `CoreError`. Transport
// problems arrive as `TransportError` and are wrapped, never exposed raw
// to the dispatcher.

use thiserror::Error;

use crate::lifecycle::LifecycleState;
use crate::pending::{CorrelationId, RequestKind};
use crate::transport::TransportError;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Usage errors ─────────────────────────────────────────────────
    #[error("{operation} is not allowed while the controller is {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Correlation id {id} already has a live {kind} request")]
    DuplicateCorrelation { id: CorrelationId, kind: RequestKind },

    #[error("Every correlation id is in use by a live request")]
    CorrelationExhausted,

    // ── Transport errors ─────────────────────────────────────────────
    #[error("Radio transport failure: {0}")]
    Transport(#[from] TransportError),

    // ── Radio-reported failures ──────────────────────────────────────
    #[error("Radio could not form or join a network")]
    NetworkFailed,

    #[error("{operation} rejected by the radio with status {status:#04x}")]
    Rejected { operation: &'static str, status: u8 },

    // ── Teardown / cancellation ──────────────────────────────────────
    #[error("Controller shut down before the request completed")]
    ControllerShutdown,

    #[error("Timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl CoreError {
    /// `true` for errors caused by calling an operation the controller
    /// cannot accept right now. These are raised before anything is sent.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidState { .. }
                | Self::ValidationFailed { .. }
                | Self::DuplicateCorrelation { .. }
                | Self::CorrelationExhausted
        )
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }
}
