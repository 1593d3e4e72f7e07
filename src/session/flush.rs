//! Flush planning and transaction boundaries

use std::cmp::Reverse;
use std::collections::HashMap;
use crate::entity::Record;
use crate::schema::{EntityShape, OnDelete};
use crate::storage::{SqliteStore, Statement};
use crate::value::Value;
use crate::{Error, Result};
use super::identity::{Slot, Target};
use super::key::{ObjectId, ObjectState};
use super::unit_of_work::{Session, SessionState, TxLog, Undo};

/// What a successful flush wrote; applied to the identity map only after
/// the store accepted every statement
#[derive(Debug, Default)]
struct FlushOutcome {
    inserted: Vec<(ObjectId, Record)>,
    updated: Vec<(ObjectId, Record)>,
    deleted: Vec<ObjectId>,
    discarded: Vec<ObjectId>,
    statements: usize,
}

impl Session {
    /// Write staged changes inside the current store transaction, opening
    /// one if needed. Nothing becomes durable until [`Session::commit`].
    pub fn flush(&mut self) -> Result<()> {
        let store = self.store()?;
        if !store.in_transaction() {
            store.begin()?;
        }
        self.state = SessionState::Flushing;
        let result = self.write_changes();
        self.state = SessionState::Active;
        match result {
            Ok(outcome) => {
                tracing::debug!("Flushed {} statements", outcome.statements);
                self.apply(outcome);
                Ok(())
            }
            Err(e) => {
                self.abort(&e);
                Err(e)
            }
        }
    }

    /// Flush and commit.
    ///
    /// On failure the store transaction is rolled back and every instance is
    /// left as it was before the call: pending instances stay pending, even
    /// those an earlier [`Session::flush`] had inserted; with `expire_on_commit` every persistent instance is
    /// reloaded on its next read.
    pub fn commit(&mut self) -> Result<()> {
        let store = self.store()?;
        if !store.in_transaction() {
            store.begin()?;
        }
        self.state = SessionState::Flushing;
        let result = self.write_changes().and_then(|outcome| {
            self.store()?.commit()?;
            Ok(outcome)
        });
        self.state = SessionState::Active;
        match result {
            Ok(outcome) => {
                tracing::info!(
                    "Committed {} inserts, {} updates, {} deletes",
                    outcome.inserted.len(),
                    outcome.updated.len(),
                    outcome.deleted.len()
                );
                self.apply(outcome);
                self.tx_log = TxLog::default();
                if self.expire_on_commit {
                    self.expire_all();
                }
                Ok(())
            }
            Err(e) => {
                self.abort(&e);
                Err(e)
            }
        }
    }

    /// Abandon the current transaction.
    ///
    /// Pending instances are discarded, instances flushed in this transaction
    /// revert, and every persistent instance is expired.
    pub fn rollback(&mut self) -> Result<()> {
        let store = self.store()?;
        if store.in_transaction() {
            store.rollback()?;
        }
        self.discard_transaction();
        tracing::info!("Session {} rolled back", self.id);
        Ok(())
    }

    /// Roll back after a failed flush or commit
    fn abort(&mut self, cause: &Error) {
        tracing::warn!("Flush failed, rolling back: {}", cause);
        if let Some(store) = &self.store {
            if store.in_transaction() {
                if let Err(e) = store.rollback() {
                    tracing::warn!("Rollback failed: {}", e);
                }
            }
        }
        // Earlier flushes of this transaction are gone from the store as well
        if !self.tx_log.is_empty() {
            self.restore_unflushed();
        }
    }

    /// Put instances written by earlier flushes of the rolled-back
    /// transaction back into their unflushed state: inserts become pending
    /// again, deletes are staged again, updates are dirty again.
    fn restore_unflushed(&mut self) {
        let log = std::mem::take(&mut self.tx_log);
        for undo in log.inserted {
            self.map.unindex(undo.oid);
            let slot = self.map.slot_mut(undo.oid);
            slot.state = ObjectState::Pending;
            slot.expired = false;
            slot.record.set(slot.pk_field, undo.pk);
            slot.committed = undo.committed;
            restore_links(slot, undo.links);
        }
        for undo in log.updated {
            let slot = self.map.slot_mut(undo.oid);
            slot.committed = undo.committed;
            restore_links(slot, undo.links);
        }
        for oid in log.deleted {
            let slot = self.map.slot_mut(oid);
            slot.state = ObjectState::Persistent;
            slot.staged_delete = true;
            self.map.index(oid);
        }

        for oid in self.map.ids() {
            self.map.slot_mut(oid).relations.clear();
        }
        // Links to instances that lost their primary key again
        for oid in self.map.ids() {
            if !self.map.slot(oid).is_live() {
                continue;
            }
            let links: Vec<_> = self
                .map
                .slot(oid)
                .links
                .iter()
                .filter_map(|(&field, link)| link.map(|t| (field, t)))
                .collect();
            for (field, target) in links {
                let value = self.map.link_value(target);
                self.map.slot_mut(oid).record.set(field, value);
            }
        }
    }

    fn discard_transaction(&mut self) {
        let log = std::mem::take(&mut self.tx_log);
        for undo in log.inserted {
            self.map.unindex(undo.oid);
            self.map.slot_mut(undo.oid).state = ObjectState::Detached;
        }
        for oid in log.deleted {
            self.map.slot_mut(oid).state = ObjectState::Persistent;
            self.map.index(oid);
        }
        for oid in self.map.ids() {
            if self.map.slot(oid).state == ObjectState::Pending {
                self.map.slot_mut(oid).state = ObjectState::Detached;
            }
        }
        for oid in self.map.ids() {
            let slot = self.map.slot_mut(oid);
            slot.links.clear();
            slot.relations.clear();
            if slot.state == ObjectState::Persistent {
                slot.record = slot.committed.clone();
                slot.staged_delete = false;
                slot.expired = true;
            }
        }
    }

    fn apply(&mut self, outcome: FlushOutcome) {
        for (oid, row) in outcome.inserted {
            if !self.tx_log.covers(oid) {
                self.tx_log.inserted.push(Undo::capture(oid, self.map.slot(oid)));
            }
            let slot = self.map.slot_mut(oid);
            slot.committed = row.clone();
            slot.record = row;
            slot.state = ObjectState::Persistent;
            slot.links.clear();
            self.map.index(oid);
        }
        for (oid, row) in outcome.updated {
            if !self.tx_log.covers(oid) {
                self.tx_log.updated.push(Undo::capture(oid, self.map.slot(oid)));
            }
            let slot = self.map.slot_mut(oid);
            slot.committed = row.clone();
            slot.record = row;
            slot.links.clear();
        }
        for oid in outcome.deleted {
            self.map.unindex(oid);
            let slot = self.map.slot_mut(oid);
            slot.state = ObjectState::Deleted;
            slot.staged_delete = false;
            self.detach_from_relations(oid);
            self.tx_log.deleted.push(oid);
        }
        for oid in outcome.discarded {
            self.map.slot_mut(oid).state = ObjectState::Detached;
            self.detach_from_relations(oid);
        }
    }

    /// Issue every statement of the flush without touching in-memory state.
    ///
    /// Inserts and updates run principals first, deletes run dependents first
    /// and after all inserts and updates.
    fn write_changes(&self) -> Result<FlushOutcome> {
        let store = self.store()?;
        let order = self.schema.dependency_order()?;
        let rank = |entity: &str| order.iter().position(|e| *e == entity).unwrap_or(usize::MAX);

        let (deleted, discarded, nulled) = self.plan_deletes()?;
        let mut outcome = FlushOutcome::default();
        let mut assigned: HashMap<ObjectId, i64> = HashMap::new();

        let mut writes: Vec<ObjectId> = self
            .map
            .ids()
            .filter(|oid| {
                self.map.slot(*oid).is_live() && !deleted.contains(oid) && !discarded.contains(oid)
            })
            .collect();
        writes.sort_by_key(|oid| (rank(self.map.slot(*oid).entity), *oid));

        for oid in writes {
            let slot = self.map.slot(oid);
            let shape = self.schema.shape(slot.entity)?;
            let row = self.effective_row(oid, shape, &assigned, &nulled);
            match slot.state {
                ObjectState::Pending => {
                    let pk = insert_row(store, shape, &row)?;
                    let mut row = row;
                    row.set(shape.primary_key(), pk);
                    assigned.insert(oid, pk);
                    outcome.inserted.push((oid, row));
                    outcome.statements += 1;
                }
                ObjectState::Persistent => {
                    let changed = row.diff(&slot.committed);
                    if changed.is_empty() {
                        continue;
                    }
                    let pk = slot.pk().ok_or_else(|| Error::NotPersistent(slot.label()))?;
                    update_row(store, shape, pk, &row, &changed)?;
                    outcome.updated.push((oid, row));
                    outcome.statements += 1;
                }
                _ => {}
            }
        }

        let mut deleted = deleted;
        deleted.sort_by_key(|oid| (Reverse(rank(self.map.slot(*oid).entity)), *oid));
        for &oid in &deleted {
            let slot = self.map.slot(oid);
            let shape = self.schema.shape(slot.entity)?;
            let pk = slot.pk().ok_or_else(|| Error::NotPersistent(slot.label()))?;
            let mut stmt = Statement::default();
            let p = stmt.bind(Value::Integer(pk));
            stmt.sql = format!("DELETE FROM {} WHERE {} = {}", shape.name, shape.primary_key(), p);
            let rows = store.execute(&stmt)?;
            if rows.affected == 0 {
                tracing::warn!("Delete of {} matched no row", slot.label());
            }
            outcome.statements += 1;
        }
        outcome.deleted = deleted;
        outcome.discarded = discarded;
        Ok(outcome)
    }

    /// Expand staged deletes through resident dependents.
    ///
    /// Returns persistent instances to delete, pending instances to discard
    /// and (instance, field) pairs whose foreign key must become NULL.
    #[allow(clippy::type_complexity)]
    fn plan_deletes(&self) -> Result<(Vec<ObjectId>, Vec<ObjectId>, Vec<(ObjectId, &'static str)>)> {
        let mut deleted: Vec<ObjectId> = self
            .map
            .ids()
            .filter(|oid| {
                let slot = self.map.slot(*oid);
                slot.state == ObjectState::Persistent && slot.staged_delete
            })
            .collect();
        let mut discarded = Vec::new();
        let mut nulled = Vec::new();

        let mut next = 0;
        while next < deleted.len() {
            let principal = deleted[next];
            next += 1;
            for dep in self.schema.dependents_of(self.map.slot(principal).entity) {
                for oid in self.map.live_of(dep.entity) {
                    if deleted.contains(&oid) || discarded.contains(&oid) {
                        continue;
                    }
                    if self.link_target(oid, dep.field, dep.fk) != Target::Resident(principal) {
                        continue;
                    }
                    match dep.fk.on_delete {
                        OnDelete::Cascade if self.map.slot(oid).state == ObjectState::Pending => {
                            discarded.push(oid)
                        }
                        OnDelete::Cascade => deleted.push(oid),
                        OnDelete::SetNull => nulled.push((oid, dep.field)),
                        // The store rejects the delete if the row still references it
                        OnDelete::Restrict => {}
                    }
                }
            }
        }
        Ok((deleted, discarded, nulled))
    }

    /// Values to write for a slot: its record with relationship links
    /// resolved to primary keys and delete policies applied
    fn effective_row(
        &self,
        oid: ObjectId,
        shape: &EntityShape,
        assigned: &HashMap<ObjectId, i64>,
        nulled: &[(ObjectId, &'static str)],
    ) -> Record {
        let slot = self.map.slot(oid);
        let mut row = Record::new();
        for field in &shape.fields {
            row.set(field.name, slot.record.value(field.name).clone());
        }
        for (field, fk) in shape.foreign_keys() {
            let value = match self.link_target(oid, field, fk) {
                Target::None => Value::Null,
                Target::Stored(pk) => Value::Integer(pk),
                Target::Resident(target) => match assigned.get(&target) {
                    Some(&pk) => Value::Integer(pk),
                    None => {
                        let target = self.map.slot(target);
                        if !target.is_live() {
                            tracing::warn!("{} links to untracked {}", slot.label(), target.label());
                        }
                        target.pk_value()
                    }
                },
            };
            row.set(field, value);
        }
        for &(_, field) in nulled.iter().filter(|(o, _)| *o == oid) {
            row.set(field, Value::Null);
        }
        row
    }
}

/// Re-add links cleared by a flush unless the field was linked again since
fn restore_links(slot: &mut Slot, links: HashMap<&'static str, Option<ObjectId>>) {
    for (field, link) in links {
        slot.links.entry(field).or_insert(link);
    }
}

/// Insert one row; a NULL primary key is left for the store to assign
fn insert_row(store: &SqliteStore, shape: &EntityShape, row: &Record) -> Result<i64> {
    let explicit = row.value(shape.primary_key()).as_i64();
    let mut stmt = Statement::default();
    let mut columns = Vec::new();
    let mut placeholders = Vec::new();
    for field in &shape.fields {
        if field.primary_key && explicit.is_none() {
            continue;
        }
        columns.push(field.name);
        placeholders.push(stmt.bind(row.value(field.name).clone()));
    }
    stmt.sql = if columns.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", shape.name)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            shape.name,
            columns.join(", "),
            placeholders.join(", ")
        )
    };
    store.execute(&stmt)?;
    Ok(explicit.unwrap_or_else(|| store.last_insert_id()))
}

/// Update only the changed columns of one row
fn update_row(store: &SqliteStore, shape: &EntityShape, pk: i64, row: &Record, changed: &[&'static str]) -> Result<()> {
    let mut stmt = Statement::default();
    let mut assignments = Vec::with_capacity(changed.len());
    for field in changed {
        let p = stmt.bind(row.value(field).clone());
        assignments.push(format!("{} = {}", field, p));
    }
    let p = stmt.bind(Value::Integer(pk));
    stmt.sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        shape.name,
        assignments.join(", "),
        shape.primary_key(),
        p
    );
    let rows = store.execute(&stmt)?;
    if rows.affected != 1 {
        return Err(Error::NotFound(format!("{}#{} (row vanished before update)", shape.name, pk)));
    }
    Ok(())
}
