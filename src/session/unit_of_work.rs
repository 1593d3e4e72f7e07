//! Session - identity map, change tracking and transaction boundaries

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use crate::entity::{Entity, Record};
use crate::query::select::CompiledSelect;
use crate::query::{Results, Select};
use crate::schema::{EntityShape, SchemaRegistry};
use crate::storage::{SqliteStore, Statement};
use crate::value::Value;
use crate::{Error, Result};
use super::identity::{IdentityMap, RelationState, Slot, Target};
use super::key::{Key, ObjectId, ObjectState};

static SESSIONS: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Flushing,
    Closed,
}

/// State of an instance before the first flush of the open transaction
/// wrote it
#[derive(Debug)]
pub(crate) struct Undo {
    pub oid: ObjectId,
    pub pk: Value,
    pub committed: Record,
    pub links: HashMap<&'static str, Option<ObjectId>>,
}

impl Undo {
    pub fn capture(oid: ObjectId, slot: &Slot) -> Self {
        Self {
            oid,
            pk: slot.pk_value(),
            committed: slot.committed.clone(),
            links: slot.links.clone(),
        }
    }
}

/// Objects written by flushes of the currently open store transaction
#[derive(Debug, Default)]
pub(crate) struct TxLog {
    pub inserted: Vec<Undo>,
    pub updated: Vec<Undo>,
    pub deleted: Vec<ObjectId>,
}

impl TxLog {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Whether `oid` already has its pre-transaction state recorded
    pub fn covers(&self, oid: ObjectId) -> bool {
        self.inserted.iter().chain(&self.updated).any(|u| u.oid == oid)
    }
}

/// Unit of work over one store connection.
///
/// The session exclusively owns the identity map: callers hold [`Key`]s and
/// read or mutate instances through the session. Changes are staged in
/// memory and written on [`Session::flush`] / [`Session::commit`].
pub struct Session {
    pub(crate) id: u64,
    pub(crate) schema: Arc<SchemaRegistry>,
    pub(crate) store: Option<SqliteStore>,
    pub(crate) state: SessionState,
    pub(crate) expire_on_commit: bool,
    pub(crate) map: IdentityMap,
    pub(crate) tx_log: TxLog,
}

impl Session {
    pub(crate) fn new(schema: Arc<SchemaRegistry>, store: SqliteStore, expire_on_commit: bool) -> Self {
        let id = SESSIONS.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Session {} opened", id);
        Self {
            id,
            schema,
            store: Some(store),
            state: SessionState::Active,
            expire_on_commit,
            map: IdentityMap::default(),
            tx_log: TxLog::default(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Number of pending and persistent instances tracked
    pub fn len(&self) -> usize {
        self.map.live_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub(crate) fn store(&self) -> Result<&SqliteStore> {
        self.store.as_ref().ok_or(Error::SessionClosed)
    }

    fn key_label<E: Entity>(key: Key<E>) -> String {
        format!("{}@{}:{}", E::TABLE, key.session, key.id.0)
    }

    /// Slot of a key that this session still tracks (deleted instances included)
    pub(crate) fn resolve<E: Entity>(&self, key: Key<E>) -> Result<ObjectId> {
        if self.store.is_none() || key.session != self.id || !self.map.contains(key.id) {
            return Err(Error::Detached(Self::key_label(key)));
        }
        if self.map.slot(key.id).state == ObjectState::Detached {
            return Err(Error::Detached(self.map.slot(key.id).label()));
        }
        Ok(key.id)
    }

    /// Slot of a pending or persistent instance
    pub(crate) fn resolve_live<E: Entity>(&self, key: Key<E>) -> Result<ObjectId> {
        let oid = self.resolve(key)?;
        if !self.map.slot(oid).is_live() {
            return Err(Error::Detached(self.map.slot(oid).label()));
        }
        Ok(oid)
    }

    pub(crate) fn key<E>(&self, oid: ObjectId) -> Key<E> {
        Key::new(self.id, oid)
    }

    // ========== Staging ==========

    /// Register a new instance; it is inserted on the next flush
    pub fn add<E: Entity>(&mut self, entity: E) -> Result<Key<E>> {
        self.store()?;
        let record = entity.to_record();
        let oid = self.add_record(E::TABLE, record)?;
        Ok(self.key(oid))
    }

    fn add_record(&mut self, entity: &'static str, record: Record) -> Result<ObjectId> {
        let shape = self.schema.shape(entity)?;
        let mut record = normalize(shape, &record);
        let pk_field = shape.primary_key();
        if let Some(pk) = record.value(pk_field).as_i64() {
            if self.map.lookup(shape.name, pk).is_some() {
                return Err(Error::IdentityConflict {
                    entity: entity.to_string(),
                    id: pk,
                });
            }
        }
        let links: Vec<_> = shape
            .foreign_keys()
            .filter_map(|(field, fk)| match self.map.resolve_fk(fk.entity, record.value(field)) {
                Target::Resident(t) => Some((field, t)),
                _ => None,
            })
            .collect();
        for &(field, _) in &links {
            record.set(field, Value::Null);
        }
        let oid = self.map.insert(Slot::pending(shape.name, pk_field, record));
        tracing::debug!("Staged insert of {} as slot {}", entity, oid.0);
        // Owners already in the session see the new dependent immediately
        for (field, target) in links {
            self.set_link(oid, field, Target::Resident(target), true)?;
        }
        Ok(oid)
    }

    /// Re-attach a detached value.
    ///
    /// Its fields are copied onto the identity-mapped instance with the same
    /// primary key (loaded from the store if needed); without a matching row
    /// it is added as new.
    pub fn merge<E: Entity>(&mut self, entity: E) -> Result<Key<E>> {
        self.store()?;
        let record = entity.to_record();
        let pk_field = self.schema.shape(E::TABLE)?.primary_key();
        let existing = match record.value(pk_field).as_i64() {
            Some(pk) => self.load_by_pk(E::TABLE, pk)?,
            None => None,
        };
        let oid = match existing {
            Some(oid) => {
                self.ensure_loaded(oid)?;
                self.apply_record(oid, record)?;
                oid
            }
            None => self.add_record(E::TABLE, record)?,
        };
        Ok(self.key(oid))
    }

    /// Mutate an instance; changed columns are written on the next flush
    pub fn modify<E: Entity>(&mut self, key: Key<E>, f: impl FnOnce(&mut E)) -> Result<()> {
        let oid = self.resolve_live(key)?;
        self.ensure_loaded(oid)?;
        let mut value = E::from_record(&self.map.slot(oid).record)?;
        f(&mut value);
        self.apply_record(oid, value.to_record())
    }

    /// Copy `new` onto a slot, re-pointing relationships whose foreign key changed
    pub(crate) fn apply_record(&mut self, oid: ObjectId, new: Record) -> Result<()> {
        let schema = Arc::clone(&self.schema);
        let shape = schema.shape(self.map.slot(oid).entity)?;
        let new = normalize(shape, &new);
        let pk_field = shape.primary_key();

        let slot = self.map.slot(oid);
        if slot.state == ObjectState::Persistent && new.value(pk_field) != slot.record.value(pk_field) {
            return Err(Error::InvalidOperation(format!(
                "primary key of persistent {} cannot change",
                slot.label()
            )));
        }

        // A link to a pending target reads as its temporary key, so an
        // explicit None still counts as a change
        let mut repoint = Vec::new();
        for (field, fk) in shape.foreign_keys() {
            let value = new.value(field);
            if value != slot.record.value(field) {
                repoint.push((field, self.map.resolve_fk(fk.entity, value)));
            }
        }

        {
            let slot = self.map.slot_mut(oid);
            for field in &shape.fields {
                if field.foreign_key.is_none() {
                    slot.record.set(field.name, new.value(field.name).clone());
                }
            }
        }
        for (field, target) in repoint {
            self.set_link(oid, field, target, true)?;
        }
        Ok(())
    }

    /// Stage an instance for deletion.
    ///
    /// A pending instance is simply discarded. Dependents are handled at
    /// flush time according to their foreign key's on-delete policy.
    pub fn delete<E: Entity>(&mut self, key: Key<E>) -> Result<()> {
        let oid = self.resolve_live(key)?;
        let slot = self.map.slot_mut(oid);
        match slot.state {
            ObjectState::Pending => {
                slot.state = ObjectState::Detached;
                tracing::debug!("Discarded pending {}", slot.label());
                self.detach_from_relations(oid);
            }
            _ => {
                slot.staged_delete = true;
                tracing::debug!("Staged delete of {}", slot.label());
            }
        }
        Ok(())
    }

    /// Stop tracking an instance without touching the store
    pub fn expunge<E: Entity>(&mut self, key: Key<E>) -> Result<()> {
        let oid = self.resolve(key)?;
        self.map.unindex(oid);
        self.map.slot_mut(oid).state = ObjectState::Detached;
        self.detach_from_relations(oid);
        Ok(())
    }

    /// Drop `oid` from every loaded relationship cache
    pub(crate) fn detach_from_relations(&mut self, oid: ObjectId) {
        let unassigned = self.map.slot(oid).pk().is_none();
        for other in self.map.ids() {
            let slot = self.map.slot_mut(other);
            for state in slot.relations.values_mut() {
                match state {
                    RelationState::Many(items) => items.retain(|&i| i != oid),
                    RelationState::One(target) if *target == Some(oid) => *target = None,
                    RelationState::One(_) => {}
                }
            }
            let dropped: Vec<_> = slot
                .links
                .iter()
                .filter(|(_, target)| **target == Some(oid))
                .map(|(&field, _)| field)
                .collect();
            for field in dropped {
                slot.links.remove(field);
                // A temporary key would dangle
                if unassigned {
                    slot.record.set(field, Value::Null);
                }
            }
        }
    }

    // ========== Reading ==========

    /// Snapshot of an instance's current values.
    ///
    /// Expired instances are reloaded first; deleted instances return their
    /// last known values.
    pub fn entity<E: Entity>(&mut self, key: Key<E>) -> Result<E> {
        let oid = self.resolve(key)?;
        self.ensure_loaded(oid)?;
        E::from_record(&self.map.slot(oid).record)
    }

    /// Primary key of an instance (`None` until flushed)
    pub fn id_of<E: Entity>(&mut self, key: Key<E>) -> Result<Option<i64>> {
        let oid = self.resolve(key)?;
        self.ensure_loaded(oid)?;
        Ok(self.map.slot(oid).pk())
    }

    /// Lifecycle state of a key as seen by this session
    pub fn object_state<E: Entity>(&self, key: Key<E>) -> ObjectState {
        match self.resolve(key) {
            Ok(oid) => self.map.slot(oid).state,
            Err(_) => ObjectState::Detached,
        }
    }

    /// Whether an instance has changes not yet flushed
    pub fn is_modified<E: Entity>(&self, key: Key<E>) -> Result<bool> {
        let oid = self.resolve(key)?;
        let slot = self.map.slot(oid);
        Ok(slot.is_modified() || slot.staged_delete)
    }

    /// Whether an instance is staged for deletion on the next flush
    pub fn is_deleted<E: Entity>(&self, key: Key<E>) -> Result<bool> {
        let oid = self.resolve(key)?;
        let slot = self.map.slot(oid);
        Ok(slot.staged_delete || slot.state == ObjectState::Deleted)
    }

    /// Fetch by primary key: the identity-mapped instance if loaded, otherwise
    /// the stored row. `None` when no row matches.
    pub fn get<E: Entity>(&mut self, pk: i64) -> Result<Option<Key<E>>> {
        self.store()?;
        let found = self.load_by_pk(E::TABLE, pk)?;
        Ok(found.map(|oid| self.key(oid)))
    }

    /// Reload every attribute from the store, discarding unflushed changes
    pub fn refresh<E: Entity>(&mut self, key: Key<E>) -> Result<()> {
        let oid = self.resolve_live(key)?;
        if self.map.slot(oid).state == ObjectState::Pending {
            return Err(Error::NotPersistent(self.map.slot(oid).label()));
        }
        self.reload_slot(oid)
    }

    /// Mark an instance stale; its next read reloads it
    pub fn expire<E: Entity>(&mut self, key: Key<E>) -> Result<()> {
        let oid = self.resolve_live(key)?;
        expire_slot(self.map.slot_mut(oid));
        Ok(())
    }

    /// Mark every persistent instance stale
    pub fn expire_all(&mut self) {
        for oid in self.map.ids() {
            expire_slot(self.map.slot_mut(oid));
        }
    }

    pub(crate) fn ensure_loaded(&mut self, oid: ObjectId) -> Result<()> {
        let slot = self.map.slot(oid);
        if slot.expired && slot.state == ObjectState::Persistent {
            self.reload_slot(oid)?;
        }
        Ok(())
    }

    pub(crate) fn reload_slot(&mut self, oid: ObjectId) -> Result<()> {
        let slot = self.map.slot(oid);
        let entity = slot.entity;
        let pk = slot.pk().ok_or_else(|| Error::NotPersistent(slot.label()))?;
        match self.select_by_pk(entity, pk)? {
            Some(record) => {
                self.map.slot_mut(oid).load(record);
                tracing::debug!("Reloaded {}#{}", entity, pk);
                Ok(())
            }
            None => Err(Error::NotFound(format!("{}#{}", entity, pk))),
        }
    }

    pub(crate) fn load_by_pk(&mut self, entity: &'static str, pk: i64) -> Result<Option<ObjectId>> {
        if let Some(oid) = self.map.lookup(entity, pk) {
            return Ok(Some(oid));
        }
        let pk_field = self.schema.shape(entity)?.primary_key();
        Ok(self
            .select_by_pk(entity, pk)?
            .map(|record| self.map.insert(Slot::persistent(entity, pk_field, record))))
    }

    fn select_by_pk(&self, entity: &str, pk: i64) -> Result<Option<Record>> {
        let shape = self.schema.shape(entity)?;
        let mut stmt = Statement::default();
        let p = stmt.bind(Value::Integer(pk));
        stmt.sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            column_list(shape),
            shape.name,
            shape.primary_key(),
            p
        );
        let rows = self.store()?.execute(&stmt)?;
        Ok(rows.rows.first().map(|row| record_from_row(shape, row)))
    }

    /// Route a stored row through the identity map.
    ///
    /// A resident instance keeps its in-memory state unless it is expired.
    pub(crate) fn materialize(&mut self, entity: &'static str, values: &[Value]) -> Result<Option<ObjectId>> {
        let shape = self.schema.shape(entity)?;
        let record = record_from_row(shape, values);
        let pk_field = shape.primary_key();
        let Some(pk) = record.value(pk_field).as_i64() else {
            return Ok(None);
        };
        if let Some(oid) = self.map.lookup(entity, pk) {
            let slot = self.map.slot_mut(oid);
            if slot.expired {
                slot.load(record);
            }
            return Ok(Some(oid));
        }
        Ok(Some(self.map.insert(Slot::persistent(entity, pk_field, record))))
    }

    // ========== Queries ==========

    /// Execute a select, returning identity-mapped instances
    pub fn exec<E: Entity>(&mut self, query: &Select<E>) -> Result<Results<Key<E>>> {
        let compiled = query.compile(&self.schema)?;
        let rows = self.run(&compiled)?;
        let keys = rows
            .into_iter()
            .filter_map(|objects| objects.into_iter().next().flatten())
            .map(|oid| self.key(oid))
            .collect();
        Ok(Results::new(E::TABLE, keys))
    }

    /// Execute a two-entity select; the second member is `None` for an
    /// unmatched left outer join row
    pub fn exec_pair<A: Entity, B: Entity>(
        &mut self,
        query: &Select<(A, B)>,
    ) -> Result<Results<(Key<A>, Option<Key<B>>)>> {
        let compiled = query.compile(&self.schema)?;
        let rows = self.run(&compiled)?;
        let mut pairs = Vec::with_capacity(rows.len());
        for objects in rows {
            let first = objects.first().copied().flatten();
            let second = objects.get(1).copied().flatten();
            if let Some(a) = first {
                pairs.push((self.key(a), second.map(|b| self.key(b))));
            }
        }
        Ok(Results::new(A::TABLE, pairs))
    }

    fn run(&mut self, compiled: &CompiledSelect) -> Result<Vec<Vec<Option<ObjectId>>>> {
        let rowset = self.store()?.execute(&compiled.statement)?;
        let mut out = Vec::with_capacity(rowset.rows.len());
        for row in &rowset.rows {
            let mut objects = Vec::with_capacity(compiled.layout.len());
            for part in &compiled.layout {
                let values = &row[part.offset..part.offset + part.width];
                objects.push(self.materialize(part.entity, values)?);
            }
            out.push(objects);
        }
        Ok(out)
    }

    // ========== Closing ==========

    /// Discard the identity map and release the connection.
    ///
    /// An open flush transaction is rolled back. Every key becomes detached.
    pub fn close(&mut self) -> Result<()> {
        let Some(store) = self.store.take() else {
            return Ok(());
        };
        let result = if store.in_transaction() { store.rollback() } else { Ok(()) };
        self.map.clear();
        self.tx_log = TxLog::default();
        self.state = SessionState::Closed;
        drop(store);
        tracing::debug!("Session {} closed", self.id);
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close session {}: {}", self.id, e);
        }
    }
}

fn expire_slot(slot: &mut Slot) {
    if slot.state == ObjectState::Persistent {
        slot.record = slot.committed.clone();
        slot.expired = true;
        slot.links.clear();
        slot.relations.clear();
    }
}

/// Comma-separated column names of a shape, in declaration order
pub(crate) fn column_list(shape: &EntityShape) -> String {
    shape.field_names().collect::<Vec<_>>().join(", ")
}

/// Build a record from a row laid out in shape field order
pub(crate) fn record_from_row(shape: &EntityShape, values: &[Value]) -> Record {
    let mut record = Record::new();
    for (field, value) in shape.fields.iter().zip(values) {
        record.set(field.name, value.clone());
    }
    record
}

/// Keep only declared fields, filling missing ones with NULL
fn normalize(shape: &EntityShape, record: &Record) -> Record {
    let mut out = Record::new();
    for field in &shape.fields {
        out.set(field.name, record.value(field.name).clone());
    }
    out
}
