use std::collections::{btree_set, BTreeMap, BTreeSet};

use wraith_serde::{BitReader, BitWrite, SerdeErr};

use crate::{
    strings::string_codec::{StringPacker, StringUnpacker},
    types::{ClassId, ObjectId, StateMask},
};

/// An object whose state can be ghosted to a remote peer.
///
/// State is split into up to 32 independently replicated parts, one bit of
/// a [`StateMask`] each. The sender hands `pack_update` the parts the peer is
/// missing and the object writes as many of them as it wants, returning the
/// ones it left out. Whatever it writes must be self-describing, since
/// `unpack_update` receives no mask.
pub trait Replicate: Sized {
    fn class_id(&self) -> ClassId;

    /// Fresh replica for a ghost of `class_id`, or `None` if the class is
    /// unknown on this side.
    fn create(class_id: ClassId) -> Option<Self>;

    fn pack_update(
        &self,
        mask: StateMask,
        strings: &mut StringPacker,
        writer: &mut dyn BitWrite,
    ) -> StateMask;

    /// Applies an update written by `pack_update`, returning the parts that
    /// changed.
    fn unpack_update(
        &mut self,
        strings: &StringUnpacker,
        reader: &mut BitReader,
    ) -> Result<StateMask, SerdeErr>;

    /// Relative importance of sending `mask` now. Called for every pending
    /// ghost on every packet; `skip_count` is how many packets in a row this
    /// ghost has been left out.
    fn update_priority(&self, mask: StateMask, skip_count: u32) -> f32 {
        let _ = mask;
        skip_count as f32 * 0.1
    }
}

/// Objects gathered by a scope query.
#[derive(Default, Debug, Clone)]
pub struct ScopeSet {
    objects: BTreeSet<ObjectId>,
}

impl ScopeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: ObjectId) {
        self.objects.insert(object);
    }

    pub fn remove(&mut self, object: &ObjectId) -> bool {
        self.objects.remove(object)
    }

    pub fn contains(&self, object: &ObjectId) -> bool {
        self.objects.contains(object)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, ObjectId> {
        self.objects.iter()
    }
}

/// The simulation as seen by a ghosting connection.
pub trait GhostSource<R: Replicate> {
    fn object(&self, object: ObjectId) -> Option<&R>;

    /// Adds every object visible from `scope_object` to `scope`.
    fn scope_query(&self, scope_object: Option<ObjectId>, scope: &mut ScopeSet);
}

/// A side that never ghosts anything.
impl<R: Replicate> GhostSource<R> for () {
    fn object(&self, _: ObjectId) -> Option<&R> {
        None
    }

    fn scope_query(&self, _: Option<ObjectId>, _: &mut ScopeSet) {}
}

/// Every object in the map is always in scope.
impl<R: Replicate> GhostSource<R> for BTreeMap<ObjectId, R> {
    fn object(&self, object: ObjectId) -> Option<&R> {
        self.get(&object)
    }

    fn scope_query(&self, _: Option<ObjectId>, scope: &mut ScopeSet) {
        for object in self.keys() {
            scope.insert(*object);
        }
    }
}
