use std::collections::{BTreeSet, HashMap};

use log::{info, trace};

use wraith_serde::{BitWrite, BitWriter, Serde, UnsignedVariableInteger};

use crate::{
    connection::connection_config::MAX_GHOST_COUNT,
    events::net_event::{ConnectionMessage, GhostControl},
    ghosts::{
        ghost_info::{
            CreateState, GhostInfo, GhostPacketRecord, GhostRecordEntry, GhostRecordKind,
            KillState,
        },
        replicate::{GhostSource, Replicate, ScopeSet},
        GHOST_ID_BIT_SIZE,
    },
    strings::string_codec::StringPacker,
    types::{ClassId, GhostId, ObjectId, StateMask, FULL_STATE_MASK},
};

/// Replicates objects from the local simulation to one peer.
///
/// Each object in scope owns a ghost slot. A slot only goes back to the free
/// list once the peer acknowledged its deletion, so an id is never reused
/// while the peer may still hold the old ghost.
pub struct GhostSender {
    ghosts: Vec<Option<GhostInfo>>,
    free_ids: Vec<GhostId>,
    object_ghosts: HashMap<ObjectId, GhostId>,
    scope_object: Option<ObjectId>,
    scope_always: BTreeSet<ObjectId>,
    sequence: u32,
    ghosting: bool,
}

impl GhostSender {
    pub fn new(max_ghost_count: u16) -> Self {
        let max_ghost_count = max_ghost_count.clamp(1, MAX_GHOST_COUNT);
        Self {
            ghosts: vec![None; usize::from(max_ghost_count)],
            free_ids: (0..max_ghost_count).rev().collect(),
            object_ghosts: HashMap::new(),
            scope_object: None,
            scope_always: BTreeSet::new(),
            sequence: 0,
            ghosting: false,
        }
    }

    // Ghosting control

    pub fn is_ghosting(&self) -> bool {
        self.ghosting
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Starts a new ghosting sequence. Ghosts are only written once the peer
    /// answers the returned message with `ReadyForGhosts`.
    pub fn activate(&mut self) -> ConnectionMessage {
        self.clear();
        self.sequence = self.sequence.wrapping_add(1);
        self.ghosting = false;
        ConnectionMessage {
            message: GhostControl::StartGhosting,
            sequence: self.sequence,
            ghost_count: self.scope_always.len().min(usize::from(MAX_GHOST_COUNT)) as u16,
        }
    }

    /// Returns true if this switched ghosting on.
    pub fn ready_for_ghosts(&mut self, sequence: u32) -> bool {
        if self.ghosting || sequence != self.sequence {
            trace!("ignoring ReadyForGhosts for sequence {}", sequence);
            return false;
        }
        info!("ghosting started, sequence {}", sequence);
        self.ghosting = true;
        true
    }

    /// Drops every ghost. The returned message tells the peer to do the same.
    pub fn reset(&mut self) -> ConnectionMessage {
        self.clear();
        self.sequence = self.sequence.wrapping_add(1);
        self.ghosting = false;
        info!("ghosting reset, sequence {}", self.sequence);
        ConnectionMessage {
            message: GhostControl::EndGhosting,
            sequence: self.sequence,
            ghost_count: 0,
        }
    }

    pub fn clear(&mut self) {
        for slot in self.ghosts.iter_mut() {
            *slot = None;
        }
        self.free_ids = (0..self.ghosts.len() as GhostId).rev().collect();
        self.object_ghosts.clear();
    }

    // Scope

    pub fn scope_object(&self) -> Option<ObjectId> {
        self.scope_object
    }

    pub fn set_scope_object(&mut self, object: Option<ObjectId>) {
        self.scope_object = object;
    }

    /// Keeps `object` in scope regardless of the scope query.
    pub fn set_scope_always(&mut self, object: ObjectId, always: bool) {
        if always {
            self.scope_always.insert(object);
        } else {
            self.scope_always.remove(&object);
        }
        if let Some(id) = self.object_ghosts.get(&object) {
            if let Some(info) = self.ghosts[usize::from(*id)].as_mut() {
                info.scope_always = always;
            }
        }
    }

    /// Marks state of `object` as changed. Ignored if it has no live ghost.
    pub fn object_changed(&mut self, object: ObjectId, mask: StateMask) {
        let Some(id) = self.object_ghosts.get(&object) else {
            return;
        };
        if let Some(info) = self.ghosts[usize::from(*id)].as_mut() {
            if info.is_alive() {
                info.update_mask |= mask;
            }
        }
    }

    pub fn ghost_id(&self, object: ObjectId) -> Option<GhostId> {
        self.object_ghosts.get(&object).copied()
    }

    pub fn ghost_info(&self, id: GhostId) -> Option<&GhostInfo> {
        self.ghosts.get(usize::from(id)).and_then(Option::as_ref)
    }

    /// Occupied slots, including ghosts whose deletion is still in flight.
    pub fn ghost_count(&self) -> usize {
        self.ghosts.len() - self.free_ids.len()
    }

    // Outgoing

    /// Writes the ghost block of a data packet: a scope pass, then creates,
    /// updates and deletes in priority order until the packet is full.
    pub fn write_packet<R, S>(
        &mut self,
        writer: &mut BitWriter,
        strings: &mut StringPacker,
        source: &S,
    ) -> GhostPacketRecord
    where
        R: Replicate,
        S: GhostSource<R> + ?Sized,
    {
        let mut record = GhostPacketRecord::new(self.sequence);

        // terminator
        writer.reserve_bits(1);

        if self.ghosting {
            self.update_scope(source);
            for id in self.prioritize(source) {
                self.write_ghost(id, writer, strings, source, &mut record);
            }
        }

        writer.release_bits(1);
        writer.write_bit(false);

        record
    }

    fn update_scope<R, S>(&mut self, source: &S)
    where
        R: Replicate,
        S: GhostSource<R> + ?Sized,
    {
        let mut scope = ScopeSet::new();
        source.scope_query(self.scope_object, &mut scope);
        for object in &self.scope_always {
            scope.insert(*object);
        }

        for index in 0..self.ghosts.len() {
            let Some(info) = self.ghosts[index].as_ref() else {
                continue;
            };
            let in_scope = scope.contains(&info.object) && source.object(info.object).is_some();
            if !in_scope && info.is_alive() {
                self.kill_ghost(index as GhostId);
            }
        }

        // newcomers, most important first
        let mut newcomers: Vec<(f32, ObjectId, ClassId)> = Vec::new();
        for object in scope.iter() {
            if self.object_ghosts.contains_key(object) {
                continue;
            }
            if let Some(replica) = source.object(*object) {
                let priority = replica.update_priority(FULL_STATE_MASK, 0);
                newcomers.push((priority, *object, replica.class_id()));
            }
        }
        newcomers.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

        for (priority, object, class_id) in newcomers {
            let always = self.scope_always.contains(&object);
            self.allocate_ghost(object, class_id, always, priority, source);
        }
    }

    fn allocate_ghost<R, S>(
        &mut self,
        object: ObjectId,
        class_id: ClassId,
        always: bool,
        priority: f32,
        source: &S,
    ) where
        R: Replicate,
        S: GhostSource<R> + ?Sized,
    {
        let Some(id) = self.free_ids.pop() else {
            // Full. A newcomer that outranks the least important ghost
            // evicts it and gets a slot on a later pass.
            if let Some((victim, victim_priority)) = self.eviction_candidate(source) {
                if always || victim_priority < priority {
                    trace!("ghost list full, evicting ghost {} for object {}", victim, object);
                    self.kill_ghost(victim);
                }
            }
            return;
        };
        trace!("object {} gets ghost {}", object, id);
        self.ghosts[usize::from(id)] = Some(GhostInfo::new(object, class_id, always));
        self.object_ghosts.insert(object, id);
    }

    /// Least important live ghost that is not scoped always.
    fn eviction_candidate<R, S>(&self, source: &S) -> Option<(GhostId, f32)>
    where
        R: Replicate,
        S: GhostSource<R> + ?Sized,
    {
        let mut lowest: Option<(GhostId, f32)> = None;
        for (index, slot) in self.ghosts.iter().enumerate() {
            let Some(info) = slot else {
                continue;
            };
            if info.scope_always || !info.is_alive() {
                continue;
            }
            let priority = match source.object(info.object) {
                Some(object) => object.update_priority(info.update_mask, info.skip_count),
                None => f32::MIN,
            };
            if lowest.map_or(true, |(_, lowest)| priority < lowest) {
                lowest = Some((index as GhostId, priority));
            }
        }
        lowest
    }

    fn kill_ghost(&mut self, id: GhostId) {
        let Some(info) = self.ghosts[usize::from(id)].as_mut() else {
            return;
        };
        if info.create == CreateState::NotSent {
            // the peer never heard of it
            self.free_ghost(id);
            return;
        }
        info.kill = KillState::Pending;
        info.update_mask = 0;
    }

    fn free_ghost(&mut self, id: GhostId) {
        let Some(info) = self.ghosts[usize::from(id)].take() else {
            return;
        };
        if self.object_ghosts.get(&info.object) == Some(&id) {
            self.object_ghosts.remove(&info.object);
        }
        self.free_ids.push(id);
        trace!("ghost {} freed", id);
    }

    /// Ghosts with something to write, most important first. Deletes go
    /// before everything else, and nothing but a create goes out for a ghost
    /// whose create is unacknowledged.
    fn prioritize<R, S>(&self, source: &S) -> Vec<GhostId>
    where
        R: Replicate,
        S: GhostSource<R> + ?Sized,
    {
        let mut candidates: Vec<(f32, GhostId)> = Vec::new();
        for (index, slot) in self.ghosts.iter().enumerate() {
            let Some(info) = slot else {
                continue;
            };
            let priority = match (info.create, info.kill) {
                (CreateState::Acked, KillState::Pending) => f32::INFINITY,
                (_, KillState::Pending | KillState::InFlight) => continue,
                (CreateState::InFlight, _) => continue,
                (CreateState::Acked, _) if info.update_mask == 0 => continue,
                _ => match source.object(info.object) {
                    Some(object) => object.update_priority(info.update_mask, info.skip_count),
                    None => continue,
                },
            };
            candidates.push((priority, index as GhostId));
        }
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        candidates.into_iter().map(|(_, id)| id).collect()
    }

    fn write_ghost<R, S>(
        &mut self,
        id: GhostId,
        writer: &mut BitWriter,
        strings: &mut StringPacker,
        source: &S,
        record: &mut GhostPacketRecord,
    ) where
        R: Replicate,
        S: GhostSource<R> + ?Sized,
    {
        let Some(info) = self.ghosts[usize::from(id)].as_mut() else {
            return;
        };

        if info.kill == KillState::Pending {
            let mut counter = writer.counter();
            write_entry_header(&mut counter, id, true, None);
            if counter.overflowed() {
                info.skip_count = info.skip_count.saturating_add(1);
                return;
            }
            write_entry_header(writer, id, true, None);
            info.kill = KillState::InFlight;
            record.entries.push(GhostRecordEntry {
                ghost: id,
                kind: GhostRecordKind::Kill,
                mask: 0,
            });
            return;
        }

        let Some(object) = source.object(info.object) else {
            return;
        };
        let create = (info.create == CreateState::NotSent).then_some(info.class_id);
        let mask = if create.is_some() {
            FULL_STATE_MASK
        } else {
            info.update_mask
        };

        let mut counter = writer.counter();
        write_entry_header(&mut counter, id, false, create);
        object.pack_update(mask, &mut strings.reborrow(), &mut counter);
        if counter.overflowed() {
            info.skip_count = info.skip_count.saturating_add(1);
            return;
        }

        write_entry_header(writer, id, false, create);
        let unsent = object.pack_update(mask, strings, writer);

        info.update_mask = unsent;
        info.skip_count = 0;
        let kind = if create.is_some() {
            info.create = CreateState::InFlight;
            GhostRecordKind::Create
        } else {
            GhostRecordKind::Update
        };
        record.entries.push(GhostRecordEntry {
            ghost: id,
            kind,
            mask: mask & !unsent,
        });
    }

    // Notifications

    pub fn packet_received(&mut self, record: GhostPacketRecord) {
        if record.sequence != self.sequence {
            return;
        }
        for entry in record.entries {
            match entry.kind {
                GhostRecordKind::Create => {
                    if let Some(info) = self.ghosts[usize::from(entry.ghost)].as_mut() {
                        if info.create == CreateState::InFlight {
                            info.create = CreateState::Acked;
                        }
                    }
                }
                GhostRecordKind::Update => {}
                GhostRecordKind::Kill => self.free_ghost(entry.ghost),
            }
        }
    }

    /// The packet carrying `record` was lost. `later` are the records of
    /// every packet sent after it that is still in flight; state they carry
    /// is not marked for resending.
    pub fn packet_dropped<'r>(
        &mut self,
        record: GhostPacketRecord,
        later: impl Iterator<Item = &'r GhostPacketRecord>,
    ) {
        if record.sequence != self.sequence {
            return;
        }
        let later: Vec<&GhostPacketRecord> = later
            .filter(|later| later.sequence == self.sequence)
            .collect();

        for entry in record.entries {
            let Some(info) = self.ghosts[usize::from(entry.ghost)].as_mut() else {
                continue;
            };
            match entry.kind {
                GhostRecordKind::Create => {
                    if info.create != CreateState::InFlight {
                        continue;
                    }
                    info.create = CreateState::NotSent;
                    info.update_mask = FULL_STATE_MASK;
                    if info.kill != KillState::Alive {
                        self.free_ghost(entry.ghost);
                    }
                }
                GhostRecordKind::Update => {
                    if !info.is_alive() {
                        continue;
                    }
                    let superseded = later
                        .iter()
                        .fold(0, |mask, later| mask | later.mask_for(entry.ghost));
                    info.update_mask |= entry.mask & !superseded;
                }
                GhostRecordKind::Kill => {
                    if info.kill == KillState::InFlight {
                        info.kill = KillState::Pending;
                    }
                }
            }
        }
    }
}

fn write_entry_header(
    writer: &mut dyn BitWrite,
    id: GhostId,
    kill: bool,
    create: Option<ClassId>,
) {
    writer.write_bit(true);
    writer.write_bits(u64::from(id), GHOST_ID_BIT_SIZE);
    writer.write_bit(kill);
    if kill {
        return;
    }
    writer.write_bit(create.is_some());
    if let Some(class_id) = create {
        UnsignedVariableInteger::<7>::new(class_id).ser(writer);
    }
}
