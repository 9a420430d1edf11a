// ── Domain model ──

pub mod event;
pub mod node;
pub mod zcl;

pub use event::{AttributeReport, CommandResponse, Confirmation, EventKind, RadioEvent};
pub use node::{DeviceAnnounce, IeeeAddress, NeighborEntry, NeighborTable, NodeInfo};
pub use zcl::{
    AddrMode, CommandStatus, Direction, SequenceNumber, WriteRecord, ZclCommand, ZclWork,
    MAX_READ_ATTRIBUTES, MAX_WRITE_RECORDS_LEN,
};
