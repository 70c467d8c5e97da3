use std::collections::BTreeMap;

use log::{info, warn};

use wraith_serde::{BitReader, BitWrite, Serde, SerdeErr, UnsignedVariableInteger};

use crate::{
    ghosts::{replicate::Replicate, GhostError, GHOST_ID_BIT_SIZE},
    strings::string_codec::{StringPacker, StringUnpacker},
    types::{ClassId, GhostId, StateMask, FULL_STATE_MASK},
};

/// Changes to the replicas held by a connection, in the order they happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GhostEvent {
    Created(GhostId),
    Updated(GhostId, StateMask),
    Deleted(GhostId),
}

/// Replicas of the objects a peer ghosts to us, keyed by ghost id.
pub struct GhostReceiver<R> {
    replicas: BTreeMap<GhostId, R>,
    sequence: Option<u32>,
}

impl<R: Replicate> GhostReceiver<R> {
    pub fn new() -> Self {
        Self {
            replicas: BTreeMap::new(),
            sequence: None,
        }
    }

    /// Sequence we told the peer we are ready for, if any.
    pub fn sequence(&self) -> Option<u32> {
        self.sequence
    }

    pub fn is_ghosting(&self) -> bool {
        self.sequence.is_some()
    }

    /// The peer starts a new ghosting sequence; replicas of the previous one
    /// are dropped.
    pub fn start_ghosting(&mut self, sequence: u32) -> Vec<GhostEvent> {
        let events = self.clear();
        self.sequence = Some(sequence);
        info!("peer started ghosting, sequence {}", sequence);
        events
    }

    pub fn end_ghosting(&mut self) -> Vec<GhostEvent> {
        let events = self.clear();
        if self.sequence.take().is_some() {
            info!("peer ended ghosting");
        }
        events
    }

    /// Drops every replica.
    pub fn clear(&mut self) -> Vec<GhostEvent> {
        std::mem::take(&mut self.replicas)
            .into_keys()
            .map(GhostEvent::Deleted)
            .collect()
    }

    pub fn ghost(&self, id: GhostId) -> Option<&R> {
        self.replicas.get(&id)
    }

    pub fn ghost_count(&self) -> usize {
        self.replicas.len()
    }

    pub fn ghost_ids(&self) -> impl Iterator<Item = GhostId> + '_ {
        self.replicas.keys().copied()
    }

    /// Applies a ghost block, pushing an event per entry. Stops at the first
    /// bad entry; entries before it stay applied and keep their events.
    pub fn read_packet(
        &mut self,
        reader: &mut BitReader,
        strings: &StringUnpacker,
        events: &mut Vec<GhostEvent>,
    ) -> Result<(), GhostError> {
        while bool::de(reader)? {
            if self.sequence.is_none() {
                return Err(GhostError::GhostingInactive);
            }
            let id = reader.read_bits(GHOST_ID_BIT_SIZE)? as GhostId;

            if bool::de(reader)? {
                if self.replicas.remove(&id).is_none() {
                    return Err(GhostError::UnknownGhost { id });
                }
                events.push(GhostEvent::Deleted(id));
                continue;
            }

            if bool::de(reader)? {
                let class_id = read_class_id(reader)?;
                if self.replicas.contains_key(&id) {
                    return Err(GhostError::DuplicateCreate { id });
                }
                let mut replica = R::create(class_id).ok_or(GhostError::UnknownClass { class_id })?;
                replica.unpack_update(strings, reader)?;
                self.replicas.insert(id, replica);
                events.push(GhostEvent::Created(id));
            } else {
                let replica = self
                    .replicas
                    .get_mut(&id)
                    .ok_or(GhostError::UnknownGhost { id })?;
                let changed = replica.unpack_update(strings, reader)?;
                events.push(GhostEvent::Updated(id, changed));
            }
        }

        Ok(())
    }

    // Demo

    /// Every replica with its class and full state, strings written literally.
    pub fn write_start_block(&self, writer: &mut dyn BitWrite) {
        self.sequence.ser(writer);
        let mut strings = StringPacker::literal();
        for (id, replica) in &self.replicas {
            true.ser(writer);
            writer.write_bits(u64::from(*id), GHOST_ID_BIT_SIZE);
            UnsignedVariableInteger::<7>::new(replica.class_id()).ser(writer);
            let unsent = replica.pack_update(FULL_STATE_MASK, &mut strings, writer);
            if unsent != 0 {
                warn!("ghost {} did not write its full state into the start block", id);
            }
        }
        false.ser(writer);
    }

    pub fn read_start_block(&mut self, reader: &mut BitReader) -> Result<Vec<GhostEvent>, GhostError> {
        self.replicas.clear();
        self.sequence = Option::<u32>::de(reader)?;
        let strings = StringUnpacker::literal();
        let mut events = Vec::new();
        while bool::de(reader)? {
            let id = reader.read_bits(GHOST_ID_BIT_SIZE)? as GhostId;
            let class_id = read_class_id(reader)?;
            let mut replica = R::create(class_id).ok_or(GhostError::UnknownClass { class_id })?;
            replica.unpack_update(&strings, reader)?;
            self.replicas.insert(id, replica);
            events.push(GhostEvent::Created(id));
        }
        Ok(events)
    }
}

impl<R: Replicate> Default for GhostReceiver<R> {
    fn default() -> Self {
        Self::new()
    }
}

fn read_class_id(reader: &mut BitReader) -> Result<ClassId, SerdeErr> {
    let value = UnsignedVariableInteger::<7>::de(reader)?.get();
    ClassId::try_from(value).map_err(|_| SerdeErr)
}
