//! Unit-of-Work Session
//!
//! A [`Session`] tracks instances in an identity map keyed by
//! (entity, primary key), records changes in memory and writes them on flush:
//!
//! - inserts and updates run principals before dependents,
//!   deletes run dependents before principals
//! - relationship links set in memory resolve to primary keys at flush time;
//!   until then a link to a pending instance reads as a negative temporary key
//! - in-memory state changes only after the store accepted the flush

mod flush;
mod identity;
mod key;
mod relations;
mod unit_of_work;

pub use key::{Key, ManyToOne, ObjectId, ObjectState, OneToMany};
pub use unit_of_work::{Session, SessionState};

#[cfg(test)]
mod tests {
    use crate::models::{Hero, ModelOptions, Team};
    use crate::storage::SqliteStore;
    use crate::{Error, Session};
    use std::sync::Arc;

    fn session() -> Session {
        let schema = ModelOptions::default().registry().unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        schema.materialize(&store).unwrap();
        Session::new(Arc::new(schema), store, true)
    }

    #[test]
    fn test_add_commit_assigns_ids() {
        let mut session = session();
        let a = session.add(Hero::new("Deadpond", "Dive Wilson")).unwrap();
        let b = session.add(Hero::new("Spider-Boy", "Pedro Parqueador")).unwrap();
        assert_eq!(session.id_of(a).unwrap(), None);
        session.commit().unwrap();

        let id_a = session.id_of(a).unwrap().unwrap();
        let id_b = session.id_of(b).unwrap().unwrap();
        assert_ne!(id_a, id_b);
        assert_eq!(session.get::<Hero>(id_a).unwrap(), Some(a));
    }

    #[test]
    fn test_identity_conflict() {
        let mut session = session();
        session.add(Hero::new("Deadpond", "Dive Wilson").with_id(1)).unwrap();
        session.commit().unwrap();
        let found = session.get::<Hero>(1).unwrap();
        assert!(found.is_some());

        let err = session.add(Hero::new("Copy", "Copy").with_id(1)).unwrap_err();
        assert!(matches!(err, Error::IdentityConflict { id: 1, .. }));
    }

    #[test]
    fn test_pending_team_link_resolves_on_flush() {
        let mut session = session();
        let team = session.add(Team::new("Preventers", "Sharp Tower")).unwrap();
        let hero = session.add(Hero::new("Rusty-Man", "Tommy Sharp").with_age(48)).unwrap();
        session.set_related(hero, Hero::TEAM, Some(team)).unwrap();
        assert_eq!(session.collection(team, Team::HEROES).unwrap(), vec![hero]);
        assert!(session.entity(hero).unwrap().team_id.is_some_and(|k| k < 0));

        session.commit().unwrap();
        let team_id = session.id_of(team).unwrap();
        assert_eq!(session.entity(hero).unwrap().team_id, team_id);
    }

    #[test]
    fn test_modify_primary_key_rejected() {
        let mut session = session();
        let hero = session.add(Hero::new("Deadpond", "Dive Wilson")).unwrap();
        session.commit().unwrap();
        let err = session.modify(hero, |h| h.id = Some(99)).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn test_keys_from_another_session_are_detached() {
        let mut first = session();
        let mut second = session();
        let hero = first.add(Hero::new("Deadpond", "Dive Wilson")).unwrap();
        assert!(matches!(second.entity(hero), Err(Error::Detached(_))));
    }
}
