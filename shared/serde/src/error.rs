use thiserror::Error;

/// Returned when a value cannot be read back out of a bit stream, either
/// because the stream ran out of bits or because the bits do not describe a
/// valid value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Failed to deserialize value from bit stream (truncated or malformed data)")]
pub struct SerdeErr;
