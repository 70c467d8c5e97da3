use thiserror::Error;

use wraith_serde::SerdeErr;

use crate::types::{ClassId, GhostId};

/// Errors raised while reading a ghost block from the peer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GhostError {
    /// An update or delete referenced a ghost that does not exist
    #[error("Ghost {id} does not exist on this connection")]
    UnknownGhost { id: GhostId },

    /// A create referenced a class this side cannot instantiate
    #[error("Unknown ghost class {class_id}")]
    UnknownClass { class_id: ClassId },

    /// A create targeted an id that is already live
    #[error("Ghost {id} was created twice")]
    DuplicateCreate { id: GhostId },

    /// Ghost data arrived while ghosting was not active
    #[error("Received ghost data while ghosting is inactive")]
    GhostingInactive,

    /// Ghost state failed to decode
    #[error("Malformed ghost data: {0}")]
    MalformedGhost(#[from] SerdeErr),
}
