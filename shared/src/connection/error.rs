use thiserror::Error;

use wraith_serde::SerdeErr;

use crate::{
    demo::DemoError, events::EventError, ghosts::GhostError, transport::TransportError,
    types::PacketIndex,
};

/// Reject code sent when the peer's class data does not match ours
pub const CLASS_CRC_MISMATCH_CODE: &str = "CHR_INVALID";

/// Errors raised while decoding a datagram received from a peer.
/// The offending packet is dropped; the connection stays up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// The standard header could not be read
    #[error("Malformed packet header from peer")]
    MalformedHeader,

    /// The packet belongs to an earlier instance of this connection
    #[error("Packet carries a stale connect sequence and was ignored")]
    StaleConnectSequence,

    /// The peer acknowledged a packet index we never sent
    #[error("Peer acknowledged packet {ack_index}, but the newest packet sent was {last_sent}")]
    UnexpectedAck {
        ack_index: PacketIndex,
        last_sent: PacketIndex,
    },

    /// The peer skipped more packet indices than the ack mask can describe
    #[error("Packet index {packet_index} jumps {gap} ahead of the last received packet (limit 31)")]
    SequenceGap { packet_index: PacketIndex, gap: u16 },

    /// A packet type arrived that makes no sense in the current connection state
    #[error("Unexpected {packet_type} packet for the current connection state")]
    UnexpectedPacketType { packet_type: &'static str },

    /// The body of the packet failed to decode
    #[error("Malformed packet body: {0}")]
    MalformedBody(#[from] SerdeErr),
}

/// Reasons a connection handshake is refused. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// The connect request did not decode
    #[error("Malformed connect request")]
    MalformedRequest,

    /// The peer uses a different net class group or class data
    #[error("Class data mismatch: expected group {expected_group} crc {expected_crc:#010x}, got group {group} crc {crc:#010x}")]
    ClassCrcMismatch {
        expected_group: u8,
        expected_crc: u32,
        group: u8,
        crc: u32,
    },

    /// The remote side refused the connection
    #[error("Connection rejected by peer: {reason}")]
    Rejected { reason: String },
}

impl HandshakeError {
    /// Textual code carried in the reject packet
    pub fn reject_code(&self) -> String {
        match self {
            HandshakeError::MalformedRequest => "MALFORMED".to_string(),
            HandshakeError::ClassCrcMismatch { .. } => CLASS_CRC_MISMATCH_CODE.to_string(),
            HandshakeError::Rejected { reason } => reason.clone(),
        }
    }
}

/// Umbrella error for connection-level operations
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Packet decode error
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    /// Handshake error
    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Event protocol error
    #[error("Event error: {0}")]
    Event(#[from] EventError),

    /// Ghost protocol error
    #[error("Ghost error: {0}")]
    Ghost(#[from] GhostError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Demo recording or playback error
    #[error("Demo error: {0}")]
    Demo(#[from] DemoError),

    /// A setting that is fixed once the connection is established was changed
    #[error("Cannot change {setting} after the connection is established")]
    AlreadyEstablished { setting: &'static str },

    /// The operation needs an established connection
    #[error("Connection is not established")]
    NotEstablished,
}

impl From<SerdeErr> for ConnectionError {
    fn from(err: SerdeErr) -> Self {
        ConnectionError::Packet(PacketError::MalformedBody(err))
    }
}
