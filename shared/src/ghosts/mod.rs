mod error;
pub mod ghost_info;
pub mod ghost_receiver;
pub mod ghost_sender;
pub mod replicate;

pub use error::GhostError;
pub use ghost_receiver::GhostEvent;

/// Ghost ids travel in this many bits, bounding a connection to 4096 ghosts.
pub const GHOST_ID_BIT_SIZE: u8 = 12;
