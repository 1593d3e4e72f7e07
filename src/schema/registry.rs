//! Schema registry - the set of declared entities and their dependency order

use std::collections::{HashMap, VecDeque};
use std::sync::OnceLock;
use crate::storage::SqliteStore;
use crate::{Error, Result};
use super::ddl;
use super::shape::{EntityShape, ForeignKey, RelationshipKind};

/// A foreign key held by `entity.field`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependent {
    pub entity: &'static str,
    pub field: &'static str,
    pub fk: ForeignKey,
}

/// Join condition between two entities: `dependent.fk_field = principal.pk`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinPath {
    pub dependent: &'static str,
    pub fk_field: &'static str,
    pub principal: &'static str,
    pub pk_field: &'static str,
}

/// Registry of declared entity shapes.
///
/// The flush order (principals before dependents) is computed once and
/// cached until the next declaration.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    shapes: Vec<EntityShape>,
    by_name: HashMap<&'static str, usize>,
    order: OnceLock<Vec<&'static str>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity shape
    pub fn declare(&mut self, shape: EntityShape) -> Result<()> {
        if self.by_name.contains_key(shape.name) {
            return Err(Error::DuplicateEntity(shape.name.to_string()));
        }
        let pk_count = shape.fields.iter().filter(|f| f.primary_key).count();
        if pk_count != 1 {
            return Err(Error::Schema(format!(
                "{} must declare exactly one primary key field (found {})",
                shape.name, pk_count
            )));
        }
        for (i, field) in shape.fields.iter().enumerate() {
            if shape.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(Error::Schema(format!("{}.{} is declared twice", shape.name, field.name)));
            }
        }

        tracing::debug!("Declared entity {} ({} fields)", shape.name, shape.fields.len());
        self.by_name.insert(shape.name, self.shapes.len());
        self.shapes.push(shape);
        self.order = OnceLock::new();
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&EntityShape> {
        self.by_name.get(name).map(|&i| &self.shapes[i])
    }

    /// Shape of a declared entity, or a schema error naming it
    pub fn shape(&self, name: &str) -> Result<&EntityShape> {
        self.get(name)
            .ok_or_else(|| Error::Schema(format!("Entity {} is not declared", name)))
    }

    pub fn shapes(&self) -> &[EntityShape] {
        &self.shapes
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Check cross-entity references: foreign keys, relationship targets and
    /// back-populated inverses.
    pub fn validate(&self) -> Result<()> {
        for shape in &self.shapes {
            for (field, fk) in shape.foreign_keys() {
                let target = self.get(fk.entity).ok_or_else(|| {
                    Error::Schema(format!("{}.{} references undeclared entity {}", shape.name, field, fk.entity))
                })?;
                if target.get_field(fk.field).is_none() {
                    return Err(Error::Schema(format!(
                        "{}.{} references unknown field {}.{}",
                        shape.name, field, fk.entity, fk.field
                    )));
                }
            }

            for rel in &shape.relationships {
                let target = self.get(rel.target).ok_or_else(|| {
                    Error::Schema(format!("{}.{} targets undeclared entity {}", shape.name, rel.name, rel.target))
                })?;
                let holder = match rel.kind {
                    RelationshipKind::ManyToOne => shape,
                    RelationshipKind::OneToMany => target,
                };
                let principal = match rel.kind {
                    RelationshipKind::ManyToOne => rel.target,
                    RelationshipKind::OneToMany => shape.name,
                };
                let fk = holder
                    .get_field(rel.fk_field)
                    .and_then(|f| f.foreign_key)
                    .ok_or_else(|| {
                        Error::Schema(format!(
                            "{}.{} uses {}.{} which is not a foreign key",
                            shape.name, rel.name, holder.name, rel.fk_field
                        ))
                    })?;
                if fk.entity != principal {
                    return Err(Error::Schema(format!(
                        "{}.{}: {}.{} points at {}, not {}",
                        shape.name, rel.name, holder.name, rel.fk_field, fk.entity, principal
                    )));
                }

                if let Some(inverse) = rel.back_populates {
                    let inv = target.get_relationship(inverse).ok_or_else(|| {
                        Error::Schema(format!(
                            "{}.{} back-populates missing relationship {}.{}",
                            shape.name, rel.name, rel.target, inverse
                        ))
                    })?;
                    if inv.target != shape.name || inv.fk_field != rel.fk_field || inv.kind == rel.kind {
                        return Err(Error::Schema(format!(
                            "{}.{} and {}.{} are not inverses of each other",
                            shape.name, rel.name, rel.target, inverse
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Entity names ordered so that every principal precedes its dependents
    pub fn dependency_order(&self) -> Result<&[&'static str]> {
        if let Some(order) = self.order.get() {
            return Ok(order);
        }
        let order = self.topological_sort()?;
        Ok(self.order.get_or_init(|| order))
    }

    fn topological_sort(&self) -> Result<Vec<&'static str>> {
        let mut in_degree: Vec<usize> = vec![0; self.shapes.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.shapes.len()];

        for (i, shape) in self.shapes.iter().enumerate() {
            for (field, fk) in shape.foreign_keys() {
                // Self references do not constrain insert order between tables
                if fk.entity == shape.name {
                    continue;
                }
                let principal = *self.by_name.get(fk.entity).ok_or_else(|| {
                    Error::Schema(format!("{}.{} references undeclared entity {}", shape.name, field, fk.entity))
                })?;
                dependents[principal].push(i);
                in_degree[i] += 1;
            }
        }

        let mut queue: VecDeque<usize> = (0..self.shapes.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(self.shapes.len());
        while let Some(i) = queue.pop_front() {
            order.push(self.shapes[i].name);
            for &d in &dependents[i] {
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    queue.push_back(d);
                }
            }
        }

        if order.len() != self.shapes.len() {
            let stuck: Vec<&str> = self
                .shapes
                .iter()
                .enumerate()
                .filter(|(i, _)| in_degree[*i] > 0)
                .map(|(_, s)| s.name)
                .collect();
            return Err(Error::Schema(format!("Foreign key cycle between {}", stuck.join(", "))));
        }
        Ok(order)
    }

    /// Every foreign key that references `entity`
    pub fn dependents_of(&self, entity: &str) -> Vec<Dependent> {
        self.shapes
            .iter()
            .flat_map(|shape| {
                shape
                    .foreign_keys()
                    .filter(|(_, fk)| fk.entity == entity)
                    .map(|(field, fk)| Dependent { entity: shape.name, field, fk })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// The declared foreign key path joining `a` and `b`, in either direction
    pub fn join_path(&self, a: &str, b: &str) -> Result<JoinPath> {
        let mut paths = Vec::new();
        for (dependent, principal) in [(a, b), (b, a)] {
            let Some(shape) = self.get(dependent) else { continue };
            for (field, fk) in shape.foreign_keys() {
                if fk.entity == principal {
                    paths.push(JoinPath {
                        dependent: shape.name,
                        fk_field: field,
                        principal: fk.entity,
                        pk_field: fk.field,
                    });
                }
            }
            if a == b {
                break;
            }
        }
        match paths.len() {
            0 => Err(Error::NoRelationship { from: a.to_string(), to: b.to_string() }),
            1 => Ok(paths[0]),
            _ => Err(Error::AmbiguousRelationship { from: a.to_string(), to: b.to_string() }),
        }
    }

    /// Create every declared table and index that does not exist yet.
    ///
    /// Tables are created principals first so foreign keys resolve.
    pub fn materialize(&self, store: &SqliteStore) -> Result<()> {
        self.validate()?;
        let order = self.dependency_order()?.to_vec();

        store.begin()?;
        match self.create_tables(store, &order) {
            Ok(()) => {
                store.commit()?;
                tracing::info!("Schema materialized for {} entities", order.len());
                Ok(())
            }
            Err(e) => {
                store.rollback()?;
                Err(e)
            }
        }
    }

    fn create_tables(&self, store: &SqliteStore, order: &[&'static str]) -> Result<()> {
        for name in order {
            let shape = self.shape(name)?;
            for stmt in ddl::schema_statements(shape) {
                store.execute_batch(&stmt)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::shape::{FieldDef, OnDelete, RelationshipDef};

    fn team() -> EntityShape {
        EntityShape::new("team")
            .field(FieldDef::primary_key("id"))
            .field(FieldDef::text("name").indexed())
            .relationship(RelationshipDef::one_to_many("heroes", "hero", "team_id").back_populates("team"))
    }

    fn hero() -> EntityShape {
        EntityShape::new("hero")
            .field(FieldDef::primary_key("id"))
            .field(FieldDef::text("name"))
            .field(FieldDef::integer("team_id").nullable().references("team", "id", OnDelete::SetNull))
            .relationship(RelationshipDef::many_to_one("team", "team", "team_id").back_populates("heroes"))
    }

    #[test]
    fn test_duplicate_declaration() {
        let mut registry = SchemaRegistry::new();
        registry.declare(team()).unwrap();
        let err = registry.declare(team()).unwrap_err();
        assert!(matches!(err, Error::DuplicateEntity(ref n) if n == "team"));
    }

    #[test]
    fn test_missing_primary_key() {
        let mut registry = SchemaRegistry::new();
        let err = registry.declare(EntityShape::new("x").field(FieldDef::text("a"))).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_dependency_order_puts_principal_first() {
        let mut registry = SchemaRegistry::new();
        // Declared dependent-first on purpose
        registry.declare(hero()).unwrap();
        registry.declare(team()).unwrap();
        registry.validate().unwrap();
        assert_eq!(registry.dependency_order().unwrap(), &["team", "hero"]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut registry = SchemaRegistry::new();
        registry
            .declare(
                EntityShape::new("a")
                    .field(FieldDef::primary_key("id"))
                    .field(FieldDef::integer("b_id").references("b", "id", OnDelete::Restrict)),
            )
            .unwrap();
        registry
            .declare(
                EntityShape::new("b")
                    .field(FieldDef::primary_key("id"))
                    .field(FieldDef::integer("a_id").references("a", "id", OnDelete::Restrict)),
            )
            .unwrap();
        assert!(matches!(registry.dependency_order(), Err(Error::Schema(_))));
    }

    #[test]
    fn test_join_path_both_directions() {
        let mut registry = SchemaRegistry::new();
        registry.declare(team()).unwrap();
        registry.declare(hero()).unwrap();
        let p1 = registry.join_path("hero", "team").unwrap();
        let p2 = registry.join_path("team", "hero").unwrap();
        assert_eq!(p1, p2);
        assert_eq!(p1.dependent, "hero");
        assert_eq!(p1.fk_field, "team_id");
    }

    #[test]
    fn test_no_relationship() {
        let mut registry = SchemaRegistry::new();
        registry.declare(team()).unwrap();
        registry
            .declare(EntityShape::new("power").field(FieldDef::primary_key("id")))
            .unwrap();
        assert!(matches!(registry.join_path("team", "power"), Err(Error::NoRelationship { .. })));
    }

    #[test]
    fn test_validate_rejects_bad_back_populates() {
        let mut registry = SchemaRegistry::new();
        registry.declare(team()).unwrap();
        registry
            .declare(hero().without_back_populates().relationship(
                RelationshipDef::many_to_one("squad", "team", "team_id").back_populates("missing"),
            ))
            .unwrap();
        assert!(matches!(registry.validate(), Err(Error::Schema(_))));
    }

    #[test]
    fn test_dependents_of() {
        let mut registry = SchemaRegistry::new();
        registry.declare(team()).unwrap();
        registry.declare(hero()).unwrap();
        let deps = registry.dependents_of("team");
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].entity, "hero");
        assert_eq!(deps[0].fk.on_delete, OnDelete::SetNull);
    }
}
