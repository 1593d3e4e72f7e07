//! Relationship Resolver - lazy navigation and link maintenance

use std::sync::Arc;
use crate::entity::Entity;
use crate::schema::{ForeignKey, RelationshipDef, RelationshipKind};
use crate::storage::Statement;
use crate::value::Value;
use crate::{Error, Result};
use super::identity::{RelationState, Target};
use super::key::{Key, ManyToOne, ObjectId, OneToMany};
use super::unit_of_work::{Session, column_list};

impl Session {
    /// Follow a many-to-one relationship (`hero.team`).
    ///
    /// Loads the target on first access; `None` when the foreign key is NULL
    /// or points at a row that no longer exists.
    pub fn related<S: Entity, T: Entity>(&mut self, key: Key<S>, rel: ManyToOne<S, T>) -> Result<Option<Key<T>>> {
        let oid = self.resolve_live(key)?;
        self.ensure_loaded(oid)?;
        let def = self.relationship(S::TABLE, rel.name, RelationshipKind::ManyToOne)?;

        if let Some(RelationState::One(cached)) = self.map.slot(oid).relations.get(def.name) {
            let cached = *cached;
            if cached.is_none_or(|t| self.map.slot(t).is_live()) {
                return Ok(cached.map(|t| self.key(t)));
            }
        }

        let fk = self.foreign_key(S::TABLE, def.fk_field)?;
        let resolved = match self.link_target(oid, def.fk_field, fk) {
            Target::None => None,
            Target::Resident(t) => Some(t),
            Target::Stored(pk) => self.load_by_pk(def.target, pk)?,
        };
        self.map
            .slot_mut(oid)
            .relations
            .insert(def.name, RelationState::One(resolved));
        Ok(resolved.map(|t| self.key(t)))
    }

    /// Point a many-to-one relationship at `target` (or clear it).
    ///
    /// The foreign key column follows the target's primary key. While the
    /// target is pending it holds a negative temporary key, replaced by the
    /// assigned one at flush. With `back_populates` the old and new owners'
    /// loaded collections are updated too.
    pub fn set_related<S: Entity, T: Entity>(
        &mut self,
        key: Key<S>,
        rel: ManyToOne<S, T>,
        target: Option<Key<T>>,
    ) -> Result<()> {
        let oid = self.resolve_live(key)?;
        self.ensure_loaded(oid)?;
        let def = self.relationship(S::TABLE, rel.name, RelationshipKind::ManyToOne)?;
        let target = match target {
            Some(t) => Target::Resident(self.resolve_live(t)?),
            None => Target::None,
        };
        self.set_link(oid, def.fk_field, target, true)
    }

    /// Load a one-to-many collection (`team.heroes`).
    ///
    /// Rows are read by foreign key on first access, then merged with
    /// resident instances whose in-memory link points at the owner.
    pub fn collection<S: Entity, T: Entity>(&mut self, key: Key<S>, rel: OneToMany<S, T>) -> Result<Vec<Key<T>>> {
        let owner = self.resolve_live(key)?;
        self.ensure_loaded(owner)?;
        let def = self.relationship(S::TABLE, rel.name, RelationshipKind::OneToMany)?;
        let items = self.load_collection(owner, &def)?;
        Ok(items.into_iter().map(|i| self.key(i)).collect())
    }

    /// Add `item` to a collection, pointing its foreign key at the owner
    pub fn append<S: Entity, T: Entity>(&mut self, owner: Key<S>, rel: OneToMany<S, T>, item: Key<T>) -> Result<()> {
        let owner = self.resolve_live(owner)?;
        let item = self.resolve_live(item)?;
        self.ensure_loaded(owner)?;
        self.ensure_loaded(item)?;
        let def = self.relationship(S::TABLE, rel.name, RelationshipKind::OneToMany)?;
        self.load_collection(owner, &def)?;
        self.set_link(item, def.fk_field, Target::Resident(owner), false)?;
        if let Some(RelationState::Many(items)) = self.map.slot_mut(owner).relations.get_mut(def.name) {
            if !items.contains(&item) {
                items.push(item);
            }
        }
        Ok(())
    }

    /// Take `item` out of a collection, clearing its foreign key
    pub fn remove<S: Entity, T: Entity>(&mut self, owner: Key<S>, rel: OneToMany<S, T>, item: Key<T>) -> Result<()> {
        let owner = self.resolve_live(owner)?;
        let item = self.resolve_live(item)?;
        self.ensure_loaded(owner)?;
        self.ensure_loaded(item)?;
        let def = self.relationship(S::TABLE, rel.name, RelationshipKind::OneToMany)?;
        self.load_collection(owner, &def)?;
        if let Some(RelationState::Many(items)) = self.map.slot_mut(owner).relations.get_mut(def.name) {
            items.retain(|&i| i != item);
        }
        let fk = self.foreign_key(def.target, def.fk_field)?;
        if self.link_target(item, def.fk_field, fk) == Target::Resident(owner) {
            self.set_link(item, def.fk_field, Target::None, false)?;
        }
        Ok(())
    }

    fn relationship(&self, entity: &str, name: &str, kind: RelationshipKind) -> Result<RelationshipDef> {
        let shape = self.schema.shape(entity)?;
        match shape.get_relationship(name) {
            Some(def) if def.kind == kind => Ok(def.clone()),
            Some(_) => Err(Error::Schema(format!("{}.{} is not a {:?} relationship", entity, name, kind))),
            None => Err(Error::Schema(format!("{} has no relationship {}", entity, name))),
        }
    }

    fn foreign_key(&self, entity: &str, field: &str) -> Result<ForeignKey> {
        self.schema
            .shape(entity)?
            .get_field(field)
            .and_then(|f| f.foreign_key)
            .ok_or_else(|| Error::Schema(format!("{}.{} is not a foreign key", entity, field)))
    }

    /// Current target of a foreign key: the in-memory link if one was set,
    /// otherwise the column value resolved through the identity map
    pub(crate) fn link_target(&self, oid: ObjectId, field: &'static str, fk: ForeignKey) -> Target {
        let slot = self.map.slot(oid);
        if let Some(link) = slot.links.get(field) {
            return match link {
                Some(t) => Target::Resident(*t),
                None => Target::None,
            };
        }
        self.map.resolve_fk(fk.entity, slot.record.value(field))
    }

    /// Re-point a foreign key and keep relationship caches consistent.
    ///
    /// `own_side` is set when the change comes from the dependent itself; its
    /// many-to-one cache is then always updated. The opposite side is only
    /// maintained for relationships declared with `back_populates`.
    pub(crate) fn set_link(&mut self, dep: ObjectId, field: &'static str, new: Target, own_side: bool) -> Result<()> {
        let schema = Arc::clone(&self.schema);
        let shape = schema.shape(self.map.slot(dep).entity)?;
        let fk = shape
            .get_field(field)
            .and_then(|f| f.foreign_key)
            .ok_or_else(|| Error::Schema(format!("{}.{} is not a foreign key", shape.name, field)))?;
        let old = self.link_target(dep, field, fk);

        let value = match new {
            Target::None => Value::Null,
            Target::Resident(t) => self.map.link_value(t),
            Target::Stored(pk) => Value::Integer(pk),
        };
        let slot = self.map.slot_mut(dep);
        slot.record.set(field, value);
        match new {
            Target::None => {
                slot.links.insert(field, None);
            }
            Target::Resident(t) => {
                slot.links.insert(field, Some(t));
            }
            Target::Stored(_) => {
                slot.links.remove(field);
            }
        }

        let new_resident = match new {
            Target::Resident(t) => Some(t),
            _ => None,
        };
        for rel in shape
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::ManyToOne && r.fk_field == field)
        {
            if own_side || rel.back_populates.is_some() {
                let slot = self.map.slot_mut(dep);
                match new {
                    Target::Stored(_) => {
                        slot.relations.remove(rel.name);
                    }
                    _ => {
                        slot.relations.insert(rel.name, RelationState::One(new_resident));
                    }
                }
            }
            let Some(inverse) = rel.back_populates else { continue };
            if old == new {
                continue;
            }
            if let Target::Resident(previous) = old {
                if let Some(RelationState::Many(items)) = self.map.slot_mut(previous).relations.get_mut(inverse) {
                    items.retain(|&i| i != dep);
                }
            }
            if let Some(owner) = new_resident {
                if let Some(RelationState::Many(items)) = self.map.slot_mut(owner).relations.get_mut(inverse) {
                    if !items.contains(&dep) {
                        items.push(dep);
                    }
                }
            }
        }
        Ok(())
    }

    /// Loaded members of a collection, querying the store on first access
    fn load_collection(&mut self, owner: ObjectId, def: &RelationshipDef) -> Result<Vec<ObjectId>> {
        if let Some(RelationState::Many(items)) = self.map.slot(owner).relations.get(def.name) {
            return Ok(items
                .iter()
                .copied()
                .filter(|&i| self.map.slot(i).is_live())
                .collect());
        }

        let schema = Arc::clone(&self.schema);
        let shape = schema.shape(def.target)?;
        let fk = self.foreign_key(def.target, def.fk_field)?;
        let mut items: Vec<ObjectId> = Vec::new();

        if let Some(pk) = self.map.slot(owner).pk() {
            let mut stmt = Statement::default();
            let p = stmt.bind(Value::Integer(pk));
            stmt.sql = format!(
                "SELECT {} FROM {} WHERE {} = {} ORDER BY {}",
                column_list(shape),
                shape.name,
                def.fk_field,
                p,
                shape.primary_key()
            );
            let rows = self.store()?.execute(&stmt)?;
            for row in &rows.rows {
                let Some(oid) = self.materialize(shape.name, row)? else { continue };
                if self.map.slot(oid).is_live()
                    && self.link_target(oid, def.fk_field, fk) == Target::Resident(owner)
                    && !items.contains(&oid)
                {
                    items.push(oid);
                }
            }
        }

        for oid in self.map.live_of(shape.name) {
            if !items.contains(&oid) && self.link_target(oid, def.fk_field, fk) == Target::Resident(owner) {
                items.push(oid);
            }
        }

        tracing::debug!("Loaded {}.{} ({} items)", self.map.slot(owner).label(), def.name, items.len());
        self.map
            .slot_mut(owner)
            .relations
            .insert(def.name, RelationState::Many(items.clone()));
        Ok(items)
    }
}
