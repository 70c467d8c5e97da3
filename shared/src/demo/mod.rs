mod block;
mod error;
mod player;
mod recorder;

pub use block::{DemoBlockType, DEMO_VERSION, MAX_BLOCK_SIZE};
pub use error::DemoError;
pub use player::DemoPlayer;
pub use recorder::DemoRecorder;
