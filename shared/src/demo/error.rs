use thiserror::Error;

/// Errors raised while recording or playing back a demo
#[derive(Debug, Error)]
pub enum DemoError {
    /// The underlying reader or writer failed
    #[error("Demo I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocks carry a 12-bit size
    #[error("Demo block of {size} bytes exceeds the {max_size} byte limit")]
    BlockTooLarge { size: usize, max_size: usize },

    /// The block header names a type this version does not know
    #[error("Invalid demo block type {block_type}")]
    InvalidBlockType { block_type: u8 },

    /// The demo was written by an incompatible version
    #[error("Demo version {found} is not supported, expected {expected}")]
    VersionMismatch { expected: u32, found: u32 },

    /// The demo ends in the middle of a header or block
    #[error("Demo data is truncated")]
    Truncated,

    /// The connection start block failed to decode
    #[error("Malformed demo start block")]
    MalformedStartBlock,
}
