// ── Node domain types ──

use std::fmt;

use serde::{Deserialize, Serialize};

/// 64-bit IEEE (extended) address of a node.
///
/// Stored as the numeric value; the radio transmits it little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IeeeAddress(pub u64);

impl IeeeAddress {
    pub fn from_le_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }

    pub fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for IeeeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_be_bytes();
        for (i, b) in bytes.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Simple-descriptor record for one endpoint of a discovered node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub source_address: u16,
    pub network_address: u16,
    pub endpoint: u8,
    pub ieee_address: IeeeAddress,
    pub profile_id: u16,
    pub device_id: u16,
    pub version: u8,
    pub status: u8,
    pub flags: u8,
    /// Server-side clusters, in the order the radio reported them.
    pub in_clusters: Vec<u16>,
    /// Client-side clusters, in the order the radio reported them.
    pub out_clusters: Vec<u16>,
}

impl NodeInfo {
    pub fn serves_cluster(&self, cluster_id: u16) -> bool {
        self.in_clusters.contains(&cluster_id)
    }
}

/// One child entry of a neighbor (LQI) table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborEntry {
    pub network_address: u16,
    pub device_type: u8,
    pub lqi: u8,
    pub ieee_address: IeeeAddress,
}

/// Neighbor table reported for one node after an LQI request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborTable {
    pub network_address: u16,
    pub device_type: u8,
    pub children: Vec<NeighborEntry>,
}

/// End-device announce: a node (re)joined and published its addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAnnounce {
    pub source_address: u16,
    pub network_address: u16,
    pub capabilities: u8,
}
