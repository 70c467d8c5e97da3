use std::fmt;

pub type PacketIndex = u16;
/// Sequence number of a guaranteed-ordered event.
pub type EventSeq = u32;
pub type GhostId = u16;
pub type ClassId = u16;
/// Identifies a replicated object inside the application's simulation.
pub type ObjectId = u32;
/// One bit per independently replicated piece of object state.
pub type StateMask = u32;
/// Virtual time in milliseconds, supplied by the caller on every tick.
pub type Millis = u32;

pub const FULL_STATE_MASK: StateMask = StateMask::MAX;

/// Handle for a connection owned by a [`crate::ConnectionRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionKey(u64);

impl ConnectionKey {
    pub fn from_u64(value: u64) -> Self {
        Self(value)
    }

    pub fn to_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection#{}", self.0)
    }
}
