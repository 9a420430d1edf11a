//! Host-side controller for a serial-attached Zigbee Network Processor.
//!
//! This crate owns the controller's lifecycle and correlation logic. The
//! serial link and the firmware's wire format sit behind the
//! [`RadioTransport`] trait.
//!
//! - **[`Controller`]**: Public facade. [`start()`](Controller::start)
//!   brings the radio up into a network, [`connect()`](Controller::connect)
//!   opens the serial device, and request operations such as
//!   [`dispatch_zcl_command()`](Controller::dispatch_zcl_command) return a
//!   [`Reply`] that resolves when the hardware reports completion.
//!
//! - **[`EventDispatcher`]**: Classifies raw transport notifications into
//!   [`RadioEvent`]s and delivers each to the handlers subscribed to its
//!   [`EventKind`], in registration order.
//!
//! - **Lifecycle**: `Uninitialized → AwaitingNetworkResult →
//!   {NetworkReady | NetworkFailed}`, with `Disconnected` reachable from
//!   anywhere. Observable through [`Controller::lifecycle()`].
//!
//! - **[`PendingTable`]**: Correlation-id keyed completion registry. Late
//!   or unmatched completions are logged and dropped.
//!
//! - **Streams** ([`EventStream`]): Node discovery, attribute reports,
//!   topology and device announcements as `futures_core::Stream`s.
//!
//! There is no internal timeout anywhere; wrap a reply in
//! [`with_deadline`] to bound the wait.

pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod pending;
pub mod stream;
pub mod transport;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DeviceType, NetworkConfig, PanIdSelection};
pub use controller::{BringUp, Controller, Reply, with_deadline};
pub use dispatch::{DropReason, EventDispatcher, EventSink, Subscription};
pub use error::CoreError;
pub use lifecycle::LifecycleState;
pub use pending::{
    Completion, CorrelationId, PendingReply, PendingSummary, PendingTable, RequestKind,
};
pub use stream::EventStream;
pub use transport::{
    AttributeSource, EndpointDescriptor, Outbound, RadioTransport, RawEvent, Request,
    TransportError,
};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    AddrMode, AttributeReport, CommandResponse, CommandStatus, Confirmation, DeviceAnnounce,
    Direction, EventKind, IeeeAddress, NeighborEntry, NeighborTable, NodeInfo, RadioEvent,
    SequenceNumber, WriteRecord, ZclCommand, ZclWork,
};
