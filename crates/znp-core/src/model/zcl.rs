// ── ZCL command records ──
//
// What a caller hands to `Controller::dispatch_zcl_command`. Encoding into
// ZCL frames is the transport's job; these types only carry the fields
// and enforce the size limits the radio imposes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::pending::CorrelationId;

/// Most attribute ids a single read request may carry.
pub const MAX_READ_ATTRIBUTES: usize = 50;

/// Largest encoded attribute-record block a write request may carry.
pub const MAX_WRITE_RECORDS_LEN: usize = 300;

/// Destination address mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddrMode {
    NotPresent,
    Group,
    #[default]
    Short,
    Extended,
    Broadcast,
}

impl AddrMode {
    pub fn code(self) -> u8 {
        match self {
            Self::NotPresent => 0,
            Self::Group => 1,
            Self::Short => 2,
            Self::Extended => 3,
            Self::Broadcast => 15,
        }
    }
}

impl TryFrom<u8> for AddrMode {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::NotPresent),
            1 => Ok(Self::Group),
            2 => Ok(Self::Short),
            3 => Ok(Self::Extended),
            15 => Ok(Self::Broadcast),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    ClientToServer,
    ServerToClient,
}

/// Where the ZCL transaction sequence number comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SequenceNumber {
    /// Allocated by the controller's pending-request table.
    #[default]
    Auto,
    /// Supplied by the caller. Must not collide with a live request.
    Fixed(u16),
}

/// One attribute written by a write-attributes request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub attribute_id: u16,
    pub data_type: u8,
    pub data: Bytes,
}

impl WriteRecord {
    /// Encoded size: id (2) + type (1) + length (1) + data.
    fn encoded_len(&self) -> usize {
        4 + self.data.len()
    }
}

/// The three kinds of ZCL work the radio performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZclWork {
    Command {
        command_id: u8,
        cluster_specific: bool,
        direction: Direction,
        disable_default_response: bool,
        manufacturer_code: u16,
        payload: Bytes,
    },
    ReadAttributes {
        attribute_ids: Vec<u16>,
        direction: Direction,
        disable_default_response: bool,
    },
    WriteAttributes {
        command_id: u8,
        records: Vec<WriteRecord>,
        direction: Direction,
        disable_default_response: bool,
    },
}

/// A ZCL request addressed to one endpoint (or group / broadcast).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZclCommand {
    pub src_endpoint: u8,
    pub dst_addr: u16,
    pub dst_endpoint: u8,
    pub addr_mode: AddrMode,
    pub cluster_id: u16,
    pub sequence: SequenceNumber,
    pub work: ZclWork,
}

impl ZclCommand {
    /// A cluster-specific command with default flags.
    pub fn cluster_command(
        dst_addr: u16,
        dst_endpoint: u8,
        cluster_id: u16,
        command_id: u8,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            src_endpoint: 1,
            dst_addr,
            dst_endpoint,
            addr_mode: AddrMode::Short,
            cluster_id,
            sequence: SequenceNumber::Auto,
            work: ZclWork::Command {
                command_id,
                cluster_specific: true,
                direction: Direction::ClientToServer,
                disable_default_response: false,
                manufacturer_code: 0,
                payload: payload.into(),
            },
        }
    }

    /// A read-attributes request with default flags.
    pub fn read_attributes(
        dst_addr: u16,
        dst_endpoint: u8,
        cluster_id: u16,
        attribute_ids: Vec<u16>,
    ) -> Self {
        Self {
            src_endpoint: 1,
            dst_addr,
            dst_endpoint,
            addr_mode: AddrMode::Short,
            cluster_id,
            sequence: SequenceNumber::Auto,
            work: ZclWork::ReadAttributes {
                attribute_ids,
                direction: Direction::ClientToServer,
                disable_default_response: false,
            },
        }
    }

    pub fn with_sequence(mut self, seq: u16) -> Self {
        self.sequence = SequenceNumber::Fixed(seq);
        self
    }

    pub fn with_src_endpoint(mut self, endpoint: u8) -> Self {
        self.src_endpoint = endpoint;
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        match &self.work {
            ZclWork::Command { .. } => Ok(()),
            ZclWork::ReadAttributes { attribute_ids, .. } => {
                if attribute_ids.is_empty() {
                    return Err(CoreError::validation(
                        "read-attributes request names no attributes",
                    ));
                }
                if attribute_ids.len() > MAX_READ_ATTRIBUTES {
                    return Err(CoreError::validation(format!(
                        "read-attributes request names {} attributes, limit is {MAX_READ_ATTRIBUTES}",
                        attribute_ids.len()
                    )));
                }
                Ok(())
            }
            ZclWork::WriteAttributes { records, .. } => {
                if records.is_empty() {
                    return Err(CoreError::validation(
                        "write-attributes request carries no records",
                    ));
                }
                if let Some(r) = records.iter().find(|r| r.data.len() > usize::from(u8::MAX)) {
                    return Err(CoreError::validation(format!(
                        "attribute {:#06x} value is {} bytes, limit is 255",
                        r.attribute_id,
                        r.data.len()
                    )));
                }
                let total: usize = records.iter().map(WriteRecord::encoded_len).sum();
                if total > MAX_WRITE_RECORDS_LEN {
                    return Err(CoreError::validation(format!(
                        "write-attributes records encode to {total} bytes, limit is {MAX_WRITE_RECORDS_LEN}"
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Completion of a dispatched ZCL command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    pub status: u8,
    pub correlation_id: CorrelationId,
}

impl CommandStatus {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_request(records: Vec<WriteRecord>) -> ZclCommand {
        ZclCommand {
            src_endpoint: 1,
            dst_addr: 0x1234,
            dst_endpoint: 1,
            addr_mode: AddrMode::Short,
            cluster_id: 0x0000,
            sequence: SequenceNumber::Auto,
            work: ZclWork::WriteAttributes {
                command_id: 0x02,
                records,
                direction: Direction::ClientToServer,
                disable_default_response: false,
            },
        }
    }

    #[test]
    fn addr_mode_codes() {
        assert_eq!(AddrMode::Broadcast.code(), 15);
        assert_eq!(AddrMode::try_from(2u8), Ok(AddrMode::Short));
        assert_eq!(AddrMode::try_from(7u8), Err(7));
    }

    #[test]
    fn read_attributes_limits() {
        let ok = ZclCommand::read_attributes(0x1234, 1, 0x0000, vec![0, 1, 2]);
        assert!(ok.validate().is_ok());

        let empty = ZclCommand::read_attributes(0x1234, 1, 0x0000, Vec::new());
        assert!(empty.validate().is_err());

        let too_many = ZclCommand::read_attributes(0x1234, 1, 0x0000, (0..51).collect());
        assert!(too_many.validate().is_err());
    }

    #[test]
    fn write_records_limited_by_encoded_size() {
        let record = |len: usize| WriteRecord {
            attribute_id: 0x4000,
            data_type: 0x42,
            data: Bytes::from(vec![b'a'; len]),
        };

        assert!(write_request(vec![record(10)]).validate().is_ok());
        // 2 * (4 + 146) = 300 fits exactly
        assert!(write_request(vec![record(146), record(146)]).validate().is_ok());
        assert!(write_request(vec![record(147), record(146)]).validate().is_err());
        assert!(write_request(vec![record(256)]).validate().is_err());
        assert!(write_request(Vec::new()).validate().is_err());
    }

    #[test]
    fn builder_helpers_set_sequence_policy() {
        let cmd = ZclCommand::cluster_command(0x1234, 1, 0x0006, 0x01, Bytes::new());
        assert_eq!(cmd.sequence, SequenceNumber::Auto);
        assert_eq!(cmd.with_sequence(7).sequence, SequenceNumber::Fixed(7));
    }
}
