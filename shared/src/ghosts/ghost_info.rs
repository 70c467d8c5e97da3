use crate::types::{ClassId, GhostId, ObjectId, StateMask, FULL_STATE_MASK};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateState {
    NotSent,
    InFlight,
    Acked,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KillState {
    Alive,
    /// Waiting to be written, either for the first time or after a loss
    Pending,
    InFlight,
}

/// Send-side bookkeeping for one ghost slot.
#[derive(Clone, Debug)]
pub struct GhostInfo {
    pub object: ObjectId,
    pub class_id: ClassId,
    pub create: CreateState,
    pub kill: KillState,
    /// State the peer does not have yet and that is not in flight
    pub update_mask: StateMask,
    /// Packets in a row this ghost wanted to be in but did not fit
    pub skip_count: u32,
    pub scope_always: bool,
}

impl GhostInfo {
    pub fn new(object: ObjectId, class_id: ClassId, scope_always: bool) -> Self {
        Self {
            object,
            class_id,
            create: CreateState::NotSent,
            kill: KillState::Alive,
            update_mask: FULL_STATE_MASK,
            skip_count: 0,
            scope_always,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.kill == KillState::Alive
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GhostRecordKind {
    Create,
    Update,
    Kill,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GhostRecordEntry {
    pub ghost: GhostId,
    pub kind: GhostRecordKind,
    /// State bits this packet carried
    pub mask: StateMask,
}

/// Ghost records written into one data packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GhostPacketRecord {
    /// Ghosting sequence at write time. Records from an earlier sequence
    /// describe ghosts that no longer exist and are ignored.
    pub sequence: u32,
    pub entries: Vec<GhostRecordEntry>,
}

impl GhostPacketRecord {
    pub fn new(sequence: u32) -> Self {
        Self {
            sequence,
            entries: Vec::new(),
        }
    }

    /// Creates and updates carried, the kind of entries counted as ghost
    /// updates in network statistics.
    pub fn update_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.kind != GhostRecordKind::Kill)
            .count()
    }

    /// State bits this packet carried for `ghost`.
    pub fn mask_for(&self, ghost: GhostId) -> StateMask {
        self.entries
            .iter()
            .filter(|entry| entry.ghost == ghost && entry.kind != GhostRecordKind::Kill)
            .fold(0, |mask, entry| mask | entry.mask)
    }
}
