use std::net::SocketAddr;

use thiserror::Error;

/// Errors raised by a datagram transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The socket could not be bound
    #[error("Failed to bind a socket to {address}: {reason}")]
    BindFailed { address: SocketAddr, reason: String },

    /// A datagram could not be handed to the network
    #[error("Failed to send {bytes} bytes to {address}: {reason}")]
    SendFailed {
        address: SocketAddr,
        bytes: usize,
        reason: String,
    },

    /// Reading from the socket failed for a reason other than having nothing to read
    #[error("Failed to receive a datagram: {reason}")]
    ReceiveFailed { reason: String },

    /// The datagram is larger than any packet the protocol builds
    #[error("Datagram of {bytes} bytes exceeds the {max_bytes} byte limit")]
    PayloadTooLarge { bytes: usize, max_bytes: usize },
}
