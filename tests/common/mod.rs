#![allow(dead_code)]

use rowkeeper::{Descriptor, Engine, EngineConfig, Hero, Key, ModelOptions, Session, Team};
use tempfile::TempDir;

/// File-backed engine in a temporary directory
pub fn engine(dir: &TempDir, options: ModelOptions) -> Engine {
    engine_with_config(dir, options, EngineConfig::default())
}

pub fn engine_with_config(dir: &TempDir, options: ModelOptions, config: EngineConfig) -> Engine {
    let path = dir.path().join("database.db");
    let engine = Engine::from_descriptor(Descriptor::file(&path), options.registry().unwrap(), config).unwrap();
    engine.create_all().unwrap();
    engine
}

pub struct Tutorial {
    pub preventers: Key<Team>,
    pub z_force: Key<Team>,
    pub deadpond: Key<Hero>,
    pub rusty_man: Key<Hero>,
    pub spider_boy: Key<Hero>,
}

/// Two teams and three heroes, committed
pub fn tutorial(session: &mut Session) -> Tutorial {
    let preventers = session.add(Team::new("Preventers", "Sharp Tower")).unwrap();
    let z_force = session.add(Team::new("Z-Force", "Sister Margaret's Bar")).unwrap();
    let deadpond = session.add(Hero::new("Deadpond", "Dive Wilson")).unwrap();
    let rusty_man = session.add(Hero::new("Rusty-Man", "Tommy Sharp").with_age(48)).unwrap();
    let spider_boy = session.add(Hero::new("Spider-Boy", "Pedro Parqueador")).unwrap();
    session.set_related(deadpond, Hero::TEAM, Some(z_force)).unwrap();
    session.set_related(rusty_man, Hero::TEAM, Some(preventers)).unwrap();
    session.commit().unwrap();
    Tutorial {
        preventers,
        z_force,
        deadpond,
        rusty_man,
        spider_boy,
    }
}

pub fn names(session: &mut Session, heroes: &[Key<Hero>]) -> Vec<String> {
    heroes
        .iter()
        .map(|&h| session.entity(h).unwrap().name)
        .collect()
}
