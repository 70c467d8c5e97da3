use std::collections::BTreeMap;

use wraith_shared::{GhostSource, ObjectId, ScopeSet, StateMask};

use crate::test_protocol::{TestObject, NAME_MASK, X_MASK, Y_MASK};

/// Minimal simulation for ghosting tests.
///
/// Without a scope radius every object is visible. With one, only objects
/// within the radius of the connection's scope object are, on both axes.
#[derive(Default)]
pub struct TestWorld {
    objects: BTreeMap<ObjectId, TestObject>,
    scope_radius: Option<i32>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scope_radius(radius: i32) -> Self {
        Self {
            objects: BTreeMap::new(),
            scope_radius: Some(radius),
        }
    }

    pub fn spawn(&mut self, id: ObjectId, object: TestObject) {
        self.objects.insert(id, object);
    }

    pub fn despawn(&mut self, id: ObjectId) -> Option<TestObject> {
        self.objects.remove(&id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&TestObject> {
        self.objects.get(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Moves an object, returning the state bits that changed.
    pub fn move_to(&mut self, id: ObjectId, x: i32, y: i32) -> StateMask {
        let Some(object) = self.objects.get_mut(&id) else {
            return 0;
        };
        let mut changed = 0;
        if object.x != x {
            object.x = x;
            changed |= X_MASK;
        }
        if object.y != y {
            object.y = y;
            changed |= Y_MASK;
        }
        changed
    }

    pub fn rename(&mut self, id: ObjectId, name: &str) -> StateMask {
        match self.objects.get_mut(&id) {
            Some(object) if object.name != name => {
                object.name = name.to_string();
                NAME_MASK
            }
            _ => 0,
        }
    }
}

impl GhostSource<TestObject> for TestWorld {
    fn object(&self, object: ObjectId) -> Option<&TestObject> {
        self.objects.get(&object)
    }

    fn scope_query(&self, scope_object: Option<ObjectId>, scope: &mut ScopeSet) {
        let center = scope_object.and_then(|id| self.objects.get(&id));
        for (id, object) in &self.objects {
            let visible = match (self.scope_radius, center) {
                (Some(radius), Some(center)) => {
                    (object.x - center.x).abs() <= radius && (object.y - center.y).abs() <= radius
                }
                (Some(_), None) => false,
                (None, _) => true,
            };
            if visible {
                scope.insert(*id);
            }
        }
    }
}
