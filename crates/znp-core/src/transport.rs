// ── Radio transport contract ──
//
// The serial link, frame encoding and firmware protocol live behind this
// trait. Core hands the transport typed requests and receives raw
// notifications back through an `EventSink`.

use bytes::Bytes;
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::config::NetworkConfig;
use crate::dispatch::EventSink;
use crate::model::{DeviceAnnounce, ZclCommand};
use crate::pending::{CorrelationId, RequestKind};

/// Failures reported by a transport implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("cannot open {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("transport is not open")]
    NotOpen,

    #[error("send failed: {0}")]
    Send(String),

    #[error("close failed: {0}")]
    Close(String),
}

/// A command the controller asks the radio to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Form or join a network with the given settings.
    StartNetwork(NetworkConfig),
    /// Open (or with 0, close) the join window for `duration` seconds.
    PermitJoin { duration: u8 },
    /// ZCL frame; `sequence_number` must be written into the frame header.
    Zcl {
        sequence_number: u16,
        command: ZclCommand,
    },
    ReadNvItem { id: u16 },
    WriteNvItem { id: u16, value: Bytes },
    LqiRequest { dst_addr: u16 },
    EndDeviceAnnounce(DeviceAnnounce),
}

/// A request plus the correlation id its completion will carry.
///
/// `correlation` is `None` only for `StartNetwork`, whose outcome arrives
/// as a network-ready or network-failed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub correlation: Option<CorrelationId>,
    pub request: Request,
}

/// Simple-descriptor fields reported with a discovered endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndpointDescriptor {
    pub src_addr: u16,
    pub nwk_addr: u16,
    pub endpoint: u8,
    pub profile_id: u16,
    pub device_id: u16,
    pub version: u8,
    pub status: u8,
    pub flags: u8,
}

/// Header of an attribute response as the radio reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttributeSource {
    pub src_addr: u16,
    pub endpoint: u8,
    pub addr_mode: u8,
    pub transaction_id: u16,
    pub cluster_id: u16,
}

/// Notification straight off the radio, before classification.
///
/// Byte buffers are little-endian as the firmware packs them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    NetworkReady,
    NetworkFailed,
    NodeDiscovered {
        descriptor: EndpointDescriptor,
        ieee_addr: Bytes,
        in_clusters: Bytes,
        out_clusters: Bytes,
    },
    CommandResponse {
        status: u8,
        seq_id: u16,
    },
    AttributeResponse {
        source: AttributeSource,
        payload: Bytes,
    },
    Confirm {
        kind: RequestKind,
        correlation_id: CorrelationId,
        status: u8,
        data: Bytes,
    },
    /// Packed neighbor table: node addr (u16), node type (u8), child
    /// count (u8), then 12-byte child records.
    NetworkTopology {
        table: Bytes,
    },
    DeviceJoined {
        src_addr: u16,
        nwk_addr: u16,
        capabilities: u8,
    },
    /// Anything the transport did not recognise.
    Other {
        code: u16,
        payload: Bytes,
    },
}

/// The radio link consumed by [`Controller`](crate::Controller).
///
/// Implementations deliver notifications by calling
/// [`EventSink::deliver`] from a single logical thread.
pub trait RadioTransport: Send + Sync + 'static {
    /// Open the serial device at `path`. Resolves `true` if the link is up.
    fn open<'a>(
        &'a self,
        path: &'a str,
        config: &'a NetworkConfig,
        events: EventSink,
    ) -> BoxFuture<'a, Result<bool, TransportError>>;

    /// Queue a framed request. Must not block.
    fn send(&self, frame: Outbound) -> Result<(), TransportError>;

    fn close(&self) -> Result<(), TransportError>;
}
