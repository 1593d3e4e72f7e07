//! Hero / Team domain model

use std::fmt;
use serde::{Deserialize, Serialize};
use crate::entity::{Entity, Record};
use crate::query::Column;
use crate::schema::{EntityShape, FieldDef, OnDelete, RelationshipDef, SchemaRegistry};
use crate::session::{ManyToOne, OneToMany};
use crate::Result;

/// A hero, optionally affiliated with one team.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hero {
    pub id: Option<i64>,
    pub name: String,
    pub secret_name: String,
    pub age: Option<i64>,
    pub team_id: Option<i64>,
}

impl Hero {
    pub const ID: Column = Column::new("hero", "id");
    pub const NAME: Column = Column::new("hero", "name");
    pub const SECRET_NAME: Column = Column::new("hero", "secret_name");
    pub const AGE: Column = Column::new("hero", "age");
    pub const TEAM_ID: Column = Column::new("hero", "team_id");

    /// `hero.team`
    pub const TEAM: ManyToOne<Hero, Team> = ManyToOne::new("team");

    pub fn new(name: impl Into<String>, secret_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secret_name: secret_name.into(),
            ..Default::default()
        }
    }

    pub fn with_age(mut self, age: i64) -> Self {
        self.age = Some(age);
        self
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_team_id(mut self, team_id: i64) -> Self {
        self.team_id = Some(team_id);
        self
    }
}

impl fmt::Display for Hero {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id={} name='{}' secret_name='{}' age={} team_id={}",
            display_opt(self.id),
            self.name,
            self.secret_name,
            display_opt(self.age),
            display_opt(self.team_id)
        )
    }
}

impl Entity for Hero {
    const TABLE: &'static str = "hero";

    fn shape() -> EntityShape {
        EntityShape::new(Self::TABLE)
            .field(FieldDef::primary_key("id"))
            .field(FieldDef::text("name").indexed())
            .field(FieldDef::text("secret_name"))
            .field(FieldDef::integer("age").nullable().indexed())
            .field(
                FieldDef::integer("team_id")
                    .nullable()
                    .references(Team::TABLE, "id", OnDelete::SetNull),
            )
            .relationship(RelationshipDef::many_to_one("team", Team::TABLE, "team_id").back_populates("heroes"))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("name", self.name.as_str())
            .with("secret_name", self.secret_name.as_str())
            .with("age", self.age)
            .with("team_id", self.team_id)
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: record.get("id")?,
            name: record.get("name")?,
            secret_name: record.get("secret_name")?,
            age: record.get("age")?,
            team_id: record.get("team_id")?,
        })
    }
}

/// A team with a headquarters and many heroes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: Option<i64>,
    pub name: String,
    pub headquarters: String,
}

impl Team {
    pub const ID: Column = Column::new("team", "id");
    pub const NAME: Column = Column::new("team", "name");
    pub const HEADQUARTERS: Column = Column::new("team", "headquarters");

    /// `team.heroes`
    pub const HEROES: OneToMany<Team, Hero> = OneToMany::new("heroes");

    pub fn new(name: impl Into<String>, headquarters: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            headquarters: headquarters.into(),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id={} name='{}' headquarters='{}'",
            display_opt(self.id),
            self.name,
            self.headquarters
        )
    }
}

impl Entity for Team {
    const TABLE: &'static str = "team";

    fn shape() -> EntityShape {
        EntityShape::new(Self::TABLE)
            .field(FieldDef::primary_key("id"))
            .field(FieldDef::text("name").indexed())
            .field(FieldDef::text("headquarters"))
            .relationship(RelationshipDef::one_to_many("heroes", Hero::TABLE, "team_id").back_populates("team"))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("name", self.name.as_str())
            .with("headquarters", self.headquarters.as_str())
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: record.get("id")?,
            name: record.get("name")?,
            headquarters: record.get("headquarters")?,
        })
    }
}

fn display_opt(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "None".to_string())
}

/// Which variant of the Hero/Team model to declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// Policy of `hero.team_id` when its team is deleted
    pub on_delete: OnDelete,
    /// Whether `hero.team` and `team.heroes` keep each other in sync
    pub bidirectional: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            on_delete: OnDelete::SetNull,
            bidirectional: true,
        }
    }
}

impl ModelOptions {
    /// Declare `team` and `hero` in a fresh registry
    pub fn registry(&self) -> Result<SchemaRegistry> {
        let mut team = Team::shape();
        let mut hero = Hero::shape().with_on_delete("team_id", self.on_delete);
        if !self.bidirectional {
            team = team.without_back_populates();
            hero = hero.without_back_populates();
        }

        let mut registry = SchemaRegistry::new();
        registry.declare(team)?;
        registry.declare(hero)?;
        registry.validate()?;
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_round_trip() {
        let hero = Hero::new("Rusty-Man", "Tommy Sharp").with_age(48);
        let record = hero.to_record();
        assert!(record.value("id").is_null());
        assert_eq!(Hero::from_record(&record).unwrap(), hero);
    }

    #[test]
    fn test_display_matches_tutorial_output() {
        let team = Team::new("Preventers", "Sharp Tower").with_id(1);
        assert_eq!(team.to_string(), "id=1 name='Preventers' headquarters='Sharp Tower'");
        let hero = Hero::new("Deadpond", "Dive Wilson");
        assert_eq!(
            hero.to_string(),
            "id=None name='Deadpond' secret_name='Dive Wilson' age=None team_id=None"
        );
    }

    #[test]
    fn test_registry_variants() {
        let registry = ModelOptions::default().registry().unwrap();
        assert_eq!(registry.dependency_order().unwrap(), &["team", "hero"]);
        let hero = registry.shape("hero").unwrap();
        assert_eq!(hero.get_field("team_id").unwrap().foreign_key.unwrap().on_delete, OnDelete::SetNull);

        let options = ModelOptions {
            on_delete: OnDelete::Cascade,
            bidirectional: false,
        };
        let registry = options.registry().unwrap();
        let hero = registry.shape("hero").unwrap();
        assert_eq!(hero.get_field("team_id").unwrap().foreign_key.unwrap().on_delete, OnDelete::Cascade);
        assert_eq!(hero.get_relationship("team").unwrap().back_populates, None);
    }
}
