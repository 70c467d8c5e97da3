use thiserror::Error;

use wraith_serde::SerdeErr;

/// Errors that can occur while posting, writing or reading events
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// The event cannot fit in any packet this connection will ever send
    #[error("Event needs {bits} bits, but a packet can carry at most {max_bits} bits of events")]
    EventTooLarge { bits: u32, max_bits: u32 },

    /// The peer sent an event kind that does not exist
    #[error("Unknown event kind {kind} received. This may indicate a malformed or malicious packet")]
    UnknownEventKind { kind: u8 },

    /// The peer sent an unknown ghosting control message
    #[error("Unknown connection message {message} received")]
    UnknownConnectionMessage { message: u8 },

    /// An ordered event claimed to follow a predecessor that is not in the packet
    #[error("Ordered event sequence continues a predecessor that was never sent")]
    MissingOrderedPredecessor,

    /// This connection was configured not to send events
    #[error("Event sending is disabled on this connection")]
    EventsDisabled,

    /// An event body failed to decode
    #[error("Malformed event: {0}")]
    MalformedEvent(#[from] SerdeErr),
}
