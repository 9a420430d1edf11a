// ── Typed radio events ──
//
// What the dispatcher hands to subscribers once a raw transport
// notification has been classified.

use std::sync::Arc;

use bytes::Bytes;
use strum::{EnumCount, EnumDiscriminants, EnumIter};

use super::node::{DeviceAnnounce, NeighborTable, NodeInfo};
use super::zcl::AddrMode;
use crate::pending::{CorrelationId, RequestKind};

/// Status and sequence number of a ZCL command-response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandResponse {
    pub status: u8,
    pub correlation_id: CorrelationId,
}

/// Attribute values reported by (or read back from) a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeReport {
    pub source_address: u16,
    pub endpoint: u8,
    pub addr_mode: AddrMode,
    pub transaction_id: u16,
    pub cluster_id: u16,
    /// Raw ZCL attribute records, undecoded.
    pub payload: Bytes,
}

/// Completion of a non-ZCL request (join window, NV access, LQI, announce).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub kind: RequestKind,
    pub correlation_id: CorrelationId,
    pub status: u8,
    pub data: Bytes,
}

/// A classified hardware event.
///
/// `EventKind` is the payload-free discriminant used to subscribe.
#[derive(Debug, Clone, PartialEq, Eq, EnumDiscriminants)]
#[strum_discriminants(name(EventKind))]
#[strum_discriminants(derive(Hash, EnumCount, EnumIter, strum::Display))]
pub enum RadioEvent {
    NetworkReady,
    NetworkFailed,
    NodeDiscovered(Arc<NodeInfo>),
    CommandResponse(CommandResponse),
    AttributeResponse(Arc<AttributeReport>),
    Confirm(Confirmation),
    NetworkTopology(Arc<NeighborTable>),
    DeviceAnnounced(DeviceAnnounce),
}

impl RadioEvent {
    pub fn kind(&self) -> EventKind {
        EventKind::from(self)
    }
}

impl EventKind {
    pub const ALL_COUNT: usize = <Self as EnumCount>::COUNT;

    /// Slot of this kind in per-kind handler tables.
    pub(crate) fn index(self) -> usize {
        match self {
            Self::NetworkReady => 0,
            Self::NetworkFailed => 1,
            Self::NodeDiscovered => 2,
            Self::CommandResponse => 3,
            Self::AttributeResponse => 4,
            Self::Confirm => 5,
            Self::NetworkTopology => 6,
            Self::DeviceAnnounced => 7,
        }
    }
}
