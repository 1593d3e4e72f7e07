//! Entity shape declarations - fields, keys, indexes and relationships

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::Error;

/// Declared storage type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlType {
    Integer,
    Real,
    Text,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
        }
    }
}

/// What the store does to dependent rows when their principal is deleted.
///
/// One policy per foreign key, fixed when the schema is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OnDelete {
    /// Reject the delete while dependents exist
    #[default]
    Restrict,
    /// Null the dependents' foreign key
    SetNull,
    /// Delete the dependents too
    Cascade,
}

impl OnDelete {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OnDelete::Restrict => "RESTRICT",
            OnDelete::SetNull => "SET NULL",
            OnDelete::Cascade => "CASCADE",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OnDelete::Restrict => "restrict",
            OnDelete::SetNull => "set-null",
            OnDelete::Cascade => "cascade",
        }
    }
}

impl FromStr for OnDelete {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "restrict" | "no-action" => Ok(OnDelete::Restrict),
            "set-null" | "setnull" | "null" => Ok(OnDelete::SetNull),
            "cascade" => Ok(OnDelete::Cascade),
            _ => Err(Error::Config(format!("Unknown on-delete policy: {}", s))),
        }
    }
}

impl fmt::Display for OnDelete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Foreign key target of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub entity: &'static str,
    pub field: &'static str,
    pub on_delete: OnDelete,
}

/// One declared field (column).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub primary_key: bool,
    pub indexed: bool,
    pub foreign_key: Option<ForeignKey>,
}

impl FieldDef {
    fn new(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            nullable: false,
            primary_key: false,
            indexed: false,
            foreign_key: None,
        }
    }

    /// Store-assigned integer primary key
    pub fn primary_key(name: &'static str) -> Self {
        Self {
            primary_key: true,
            ..Self::new(name, SqlType::Integer)
        }
    }

    pub fn integer(name: &'static str) -> Self {
        Self::new(name, SqlType::Integer)
    }

    pub fn real(name: &'static str) -> Self {
        Self::new(name, SqlType::Real)
    }

    pub fn text(name: &'static str) -> Self {
        Self::new(name, SqlType::Text)
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn references(mut self, entity: &'static str, field: &'static str, on_delete: OnDelete) -> Self {
        self.foreign_key = Some(ForeignKey { entity, field, on_delete });
        self
    }
}

/// Direction of a navigable relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    /// This entity holds `fk_field` pointing at `target`
    ManyToOne,
    /// `target` holds `fk_field` pointing at this entity
    OneToMany,
}

/// A navigable relationship attribute (e.g. `hero.team`, `team.heroes`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipDef {
    pub name: &'static str,
    pub kind: RelationshipKind,
    pub target: &'static str,
    pub fk_field: &'static str,
    pub back_populates: Option<&'static str>,
}

impl RelationshipDef {
    pub fn many_to_one(name: &'static str, target: &'static str, fk_field: &'static str) -> Self {
        Self {
            name,
            kind: RelationshipKind::ManyToOne,
            target,
            fk_field,
            back_populates: None,
        }
    }

    pub fn one_to_many(name: &'static str, target: &'static str, fk_field: &'static str) -> Self {
        Self {
            name,
            kind: RelationshipKind::OneToMany,
            target,
            fk_field,
            back_populates: None,
        }
    }

    pub fn back_populates(mut self, inverse: &'static str) -> Self {
        self.back_populates = Some(inverse);
        self
    }
}

/// Declared shape of one entity: its table, fields and relationships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityShape {
    pub name: &'static str,
    pub fields: Vec<FieldDef>,
    pub relationships: Vec<RelationshipDef>,
}

impl EntityShape {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn relationship(mut self, relationship: RelationshipDef) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Replace the on-delete policy of a foreign key field
    pub fn with_on_delete(mut self, field: &str, on_delete: OnDelete) -> Self {
        if let Some(fk) = self
            .fields
            .iter_mut()
            .find(|f| f.name == field)
            .and_then(|f| f.foreign_key.as_mut())
        {
            fk.on_delete = on_delete;
        }
        self
    }

    /// Drop the inverse links so the relationships only navigate one way
    pub fn without_back_populates(mut self) -> Self {
        for rel in &mut self.relationships {
            rel.back_populates = None;
        }
        self
    }

    /// The primary key field.
    ///
    /// Shapes accepted by the registry always have exactly one.
    pub fn primary_key(&self) -> &'static str {
        self.fields
            .iter()
            .find(|f| f.primary_key)
            .map(|f| f.name)
            .unwrap_or("id")
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn get_relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships.iter().find(|r| r.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }

    /// Foreign key fields and their targets
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&'static str, ForeignKey)> + '_ {
        self.fields
            .iter()
            .filter_map(|f| f.foreign_key.map(|fk| (f.name, fk)))
    }
}
