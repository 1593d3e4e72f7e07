//! Identity map - one live slot per (entity, primary key)

use std::collections::HashMap;
use crate::entity::Record;
use crate::value::Value;
use super::key::{ObjectId, ObjectState};

/// Cached state of one relationship attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RelationState {
    /// Many-to-one, resolved
    One(Option<ObjectId>),
    /// One-to-many, loaded and order-preserving
    Many(Vec<ObjectId>),
}

/// Where a foreign key currently points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    None,
    /// An instance tracked by this session (possibly still pending)
    Resident(ObjectId),
    /// A row not loaded into this session
    Stored(i64),
}

/// One tracked instance.
#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub entity: &'static str,
    pub pk_field: &'static str,
    /// Current in-memory values
    pub record: Record,
    /// Values as last read from or written to the store
    pub committed: Record,
    pub state: ObjectState,
    /// Must be reloaded before its values are trusted
    pub expired: bool,
    pub staged_delete: bool,
    /// In-memory foreign key links (fk field -> target), set through relationships
    pub links: HashMap<&'static str, Option<ObjectId>>,
    /// Relationship caches; a missing entry means unloaded
    pub relations: HashMap<&'static str, RelationState>,
}

impl Slot {
    pub fn pending(entity: &'static str, pk_field: &'static str, record: Record) -> Self {
        Self {
            entity,
            pk_field,
            record,
            committed: Record::new(),
            state: ObjectState::Pending,
            expired: false,
            staged_delete: false,
            links: HashMap::new(),
            relations: HashMap::new(),
        }
    }

    pub fn persistent(entity: &'static str, pk_field: &'static str, record: Record) -> Self {
        Self {
            committed: record.clone(),
            state: ObjectState::Persistent,
            ..Self::pending(entity, pk_field, record)
        }
    }

    pub fn pk(&self) -> Option<i64> {
        self.record.value(self.pk_field).as_i64()
    }

    /// Primary key as a column value (NULL while unassigned)
    pub fn pk_value(&self) -> Value {
        self.pk().map(Value::Integer).unwrap_or(Value::Null)
    }

    pub fn is_live(&self) -> bool {
        matches!(self.state, ObjectState::Pending | ObjectState::Persistent)
    }

    /// Replace both copies with store values and drop every cache
    pub fn load(&mut self, record: Record) {
        self.committed = record.clone();
        self.record = record;
        self.expired = false;
        self.links.clear();
        self.relations.clear();
    }

    pub fn is_modified(&self) -> bool {
        self.state == ObjectState::Pending || !self.record.diff(&self.committed).is_empty() || !self.links.is_empty()
    }

    pub fn label(&self) -> String {
        match self.pk() {
            Some(pk) => format!("{}#{}", self.entity, pk),
            None => format!("{}(pending)", self.entity),
        }
    }
}

/// Temporary key standing in for a pending instance's primary key in the
/// foreign key columns that point at it; always negative
pub(crate) fn provisional_key(oid: ObjectId) -> i64 {
    -1 - oid.0 as i64
}

/// Slot named by a temporary key
pub(crate) fn provisional_owner(key: i64) -> Option<ObjectId> {
    if key < 0 {
        usize::try_from(-1 - key).ok().map(ObjectId)
    } else {
        None
    }
}

/// Session-scoped identity map.
///
/// Slots are never reused, so an [`ObjectId`] stays meaningful for the
/// lifetime of the session even after the instance is detached.
#[derive(Debug, Default)]
pub(crate) struct IdentityMap {
    slots: Vec<Slot>,
    index: HashMap<(&'static str, i64), ObjectId>,
}

impl IdentityMap {
    pub fn insert(&mut self, slot: Slot) -> ObjectId {
        let id = ObjectId(self.slots.len());
        if slot.state == ObjectState::Persistent {
            if let Some(pk) = slot.pk() {
                self.index.insert((slot.entity, pk), id);
            }
        }
        self.slots.push(slot);
        id
    }

    pub fn slot(&self, id: ObjectId) -> &Slot {
        &self.slots[id.0]
    }

    pub fn slot_mut(&mut self, id: ObjectId) -> &mut Slot {
        &mut self.slots[id.0]
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        id.0 < self.slots.len()
    }

    pub fn lookup(&self, entity: &'static str, pk: i64) -> Option<ObjectId> {
        self.index.get(&(entity, pk)).copied()
    }

    /// Value a foreign key column holds while it points at `target`: the
    /// primary key once assigned, a temporary key while still pending
    pub fn link_value(&self, target: ObjectId) -> Value {
        let slot = self.slot(target);
        match (slot.pk(), slot.state) {
            (Some(pk), _) => Value::Integer(pk),
            (None, ObjectState::Pending) => Value::Integer(provisional_key(target)),
            (None, _) => Value::Null,
        }
    }

    /// Instance of `entity` a foreign key column value refers to
    pub fn resolve_fk(&self, entity: &'static str, value: &Value) -> Target {
        let Some(pk) = value.as_i64() else {
            return Target::None;
        };
        if let Some(oid) = self.lookup(entity, pk) {
            return Target::Resident(oid);
        }
        match provisional_owner(pk) {
            Some(oid) if self.contains(oid) && self.slot(oid).entity == entity && self.slot(oid).is_live() => {
                Target::Resident(oid)
            }
            _ => Target::Stored(pk),
        }
    }

    /// Register the identity of a slot that became persistent
    pub fn index(&mut self, id: ObjectId) {
        let slot = &self.slots[id.0];
        if let Some(pk) = slot.pk() {
            self.index.insert((slot.entity, pk), id);
        }
    }

    pub fn unindex(&mut self, id: ObjectId) {
        let slot = &self.slots[id.0];
        if let Some(pk) = slot.pk() {
            if self.index.get(&(slot.entity, pk)) == Some(&id) {
                self.index.remove(&(slot.entity, pk));
            }
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + use<> {
        (0..self.slots.len()).map(ObjectId)
    }

    /// Live slots of one entity, in the order they entered the session
    pub fn live_of(&self, entity: &str) -> Vec<ObjectId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.entity == entity && s.is_live())
            .map(|(i, _)| ObjectId(i))
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_live()).count()
    }

    /// Detach everything; used when the session closes
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            if slot.state != ObjectState::Deleted {
                slot.state = ObjectState::Detached;
            }
            slot.relations.clear();
            slot.links.clear();
        }
        self.index.clear();
    }
}
