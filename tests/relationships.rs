mod common;

use common::{engine, names, tutorial};
use rowkeeper::{Error, Hero, ModelOptions, ObjectState, OnDelete, Team, select};
use tempfile::TempDir;

fn options(on_delete: OnDelete, bidirectional: bool) -> ModelOptions {
    ModelOptions { on_delete, bidirectional }
}

#[test]
fn test_related_loads_team_lazily() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, ModelOptions::default());
    let mut s = engine.session().unwrap();
    tutorial(&mut s);
    s.close().unwrap();

    let mut s = engine.session().unwrap();
    let rusty = s
        .exec(&select::<Hero>().filter(Hero::NAME.eq("Rusty-Man")))
        .unwrap()
        .one()
        .unwrap();
    let team = s.related(rusty, Hero::TEAM).unwrap().unwrap();
    assert_eq!(s.entity(team).unwrap().name, "Preventers");

    let spider = s
        .exec(&select::<Hero>().filter(Hero::NAME.eq("Spider-Boy")))
        .unwrap()
        .one()
        .unwrap();
    assert_eq!(s.related(spider, Hero::TEAM).unwrap(), None);
}

#[test]
fn test_bidirectional_set_related_updates_collection() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, ModelOptions::default());
    let mut s = engine.session().unwrap();
    let t = tutorial(&mut s);

    let heroes = s.collection(t.preventers, Team::HEROES).unwrap();
    assert_eq!(heroes, vec![t.rusty_man]);

    s.set_related(t.spider_boy, Hero::TEAM, Some(t.preventers)).unwrap();
    assert_eq!(
        s.collection(t.preventers, Team::HEROES).unwrap(),
        vec![t.rusty_man, t.spider_boy]
    );
    assert_eq!(s.related(t.spider_boy, Hero::TEAM).unwrap(), Some(t.preventers));
}

#[test]
fn test_spider_boy_joins_and_leaves_preventers() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, ModelOptions::default());
    let mut s = engine.session().unwrap();
    let t = tutorial(&mut s);

    s.set_related(t.spider_boy, Hero::TEAM, Some(t.preventers)).unwrap();
    s.commit().unwrap();
    s.refresh(t.spider_boy).unwrap();
    let preventers_id = s.id_of(t.preventers).unwrap();
    assert_eq!(s.entity(t.spider_boy).unwrap().team_id, preventers_id);

    let heroes = s.collection(t.preventers, Team::HEROES).unwrap();
    assert_eq!(names(&mut s, &heroes), vec!["Rusty-Man", "Spider-Boy"]);

    s.set_related(t.spider_boy, Hero::TEAM, None).unwrap();
    assert_eq!(s.collection(t.preventers, Team::HEROES).unwrap(), vec![t.rusty_man]);
    s.commit().unwrap();

    s.refresh(t.spider_boy).unwrap();
    assert_eq!(s.entity(t.spider_boy).unwrap().team_id, None);
}

#[test]
fn test_append_to_collection_links_pending_heroes() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, ModelOptions::default());
    let mut s = engine.session().unwrap();
    let t = tutorial(&mut s);

    let tarantula = s.add(Hero::new("Tarantula", "Natalia Roman-on").with_age(32)).unwrap();
    let dr_weird = s.add(Hero::new("Dr. Weird", "Steve Weird").with_age(36)).unwrap();
    s.append(t.preventers, Team::HEROES, tarantula).unwrap();
    s.append(t.preventers, Team::HEROES, dr_weird).unwrap();
    assert_eq!(s.related(tarantula, Hero::TEAM).unwrap(), Some(t.preventers));
    s.commit().unwrap();

    let preventers_id = s.id_of(t.preventers).unwrap();
    assert_eq!(s.entity(tarantula).unwrap().team_id, preventers_id);
    assert_eq!(s.entity(dr_weird).unwrap().team_id, preventers_id);

    s.remove(t.preventers, Team::HEROES, dr_weird).unwrap();
    assert_eq!(s.related(dr_weird, Hero::TEAM).unwrap(), None);
    s.commit().unwrap();
    assert_eq!(s.entity(dr_weird).unwrap().team_id, None);
}

#[test]
fn test_pending_team_with_heroes_inserts_team_first() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, ModelOptions::default());
    let mut s = engine.session().unwrap();

    let black_lion = s.add(Hero::new("Black Lion", "Trevor Challa").with_age(35)).unwrap();
    let sure_e = s.add(Hero::new("Princess Sure-E", "Sure-E")).unwrap();
    let wakaland = s.add(Team::new("Wakaland", "Wakaland Capital City")).unwrap();
    s.append(wakaland, Team::HEROES, black_lion).unwrap();
    s.append(wakaland, Team::HEROES, sure_e).unwrap();
    s.commit().unwrap();

    let team_id = s.id_of(wakaland).unwrap();
    assert!(team_id.is_some());
    assert_eq!(s.entity(black_lion).unwrap().team_id, team_id);
    assert_eq!(s.entity(sure_e).unwrap().team_id, team_id);
    assert_eq!(s.collection(wakaland, Team::HEROES).unwrap(), vec![black_lion, sure_e]);
}

#[test]
fn test_modifying_foreign_key_repoints_relationship() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, ModelOptions::default());
    let mut s = engine.session().unwrap();
    let t = tutorial(&mut s);

    assert_eq!(s.collection(t.z_force, Team::HEROES).unwrap(), vec![t.deadpond]);
    let preventers_id = s.id_of(t.preventers).unwrap();
    s.modify(t.deadpond, |h| h.team_id = preventers_id).unwrap();

    assert_eq!(s.related(t.deadpond, Hero::TEAM).unwrap(), Some(t.preventers));
    assert!(s.collection(t.z_force, Team::HEROES).unwrap().is_empty());
}

#[test]
fn test_clearing_foreign_key_of_hero_linked_to_pending_team() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, ModelOptions::default());
    let mut s = engine.session().unwrap();

    let hero = s.add(Hero::new("Black Lion", "Trevor Challa")).unwrap();
    let wakaland = s.add(Team::new("Wakaland", "Wakaland Capital City")).unwrap();
    s.set_related(hero, Hero::TEAM, Some(wakaland)).unwrap();

    // Other columns leave the link alone
    s.modify(hero, |h| h.age = Some(35)).unwrap();
    assert_eq!(s.related(hero, Hero::TEAM).unwrap(), Some(wakaland));
    assert_eq!(s.collection(wakaland, Team::HEROES).unwrap(), vec![hero]);

    s.modify(hero, |h| h.team_id = None).unwrap();
    assert_eq!(s.related(hero, Hero::TEAM).unwrap(), None);
    assert!(s.collection(wakaland, Team::HEROES).unwrap().is_empty());

    s.commit().unwrap();
    let stored = s.entity(hero).unwrap();
    assert_eq!(stored.team_id, None);
    assert_eq!(stored.age, Some(35));
    assert!(s.id_of(wakaland).unwrap().is_some());
}

#[test]
fn test_added_hero_with_team_id_joins_loaded_collection() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, ModelOptions::default());
    let mut s = engine.session().unwrap();
    let t = tutorial(&mut s);

    assert_eq!(s.collection(t.preventers, Team::HEROES).unwrap(), vec![t.rusty_man]);
    let preventers_id = s.id_of(t.preventers).unwrap().unwrap();
    let tarantula = s
        .add(Hero::new("Tarantula", "Natalia Roman-on").with_age(32).with_team_id(preventers_id))
        .unwrap();

    assert_eq!(s.related(tarantula, Hero::TEAM).unwrap(), Some(t.preventers));
    assert_eq!(
        s.collection(t.preventers, Team::HEROES).unwrap(),
        vec![t.rusty_man, tarantula]
    );

    s.commit().unwrap();
    let heroes = s.collection(t.preventers, Team::HEROES).unwrap();
    assert_eq!(names(&mut s, &heroes), vec!["Rusty-Man", "Tarantula"]);
}

#[test]
fn test_unidirectional_collection_stays_stale_until_refresh() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, options(OnDelete::SetNull, false));
    let mut s = engine.session().unwrap();
    let t = tutorial(&mut s);

    assert_eq!(s.collection(t.preventers, Team::HEROES).unwrap(), vec![t.rusty_man]);
    s.set_related(t.rusty_man, Hero::TEAM, None).unwrap();
    assert_eq!(s.related(t.rusty_man, Hero::TEAM).unwrap(), None);
    assert_eq!(s.collection(t.preventers, Team::HEROES).unwrap(), vec![t.rusty_man]);

    s.commit().unwrap();
    assert!(s.collection(t.preventers, Team::HEROES).unwrap().is_empty());
}

#[test]
fn test_set_null_delete_keeps_heroes() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, options(OnDelete::SetNull, true));
    let mut s = engine.session().unwrap();
    let t = tutorial(&mut s);

    let members = s.collection(t.preventers, Team::HEROES).unwrap();
    assert_eq!(members, vec![t.rusty_man]);
    s.delete(t.preventers).unwrap();
    s.commit().unwrap();

    assert_eq!(s.object_state(t.preventers), ObjectState::Deleted);
    assert_eq!(s.object_state(t.rusty_man), ObjectState::Persistent);
    assert_eq!(s.entity(t.rusty_man).unwrap().team_id, None);
    assert_eq!(s.related(t.rusty_man, Hero::TEAM).unwrap(), None);
}

#[test]
fn test_set_null_delete_of_unloaded_dependents() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, options(OnDelete::SetNull, true));
    let mut s = engine.session().unwrap();
    tutorial(&mut s);
    s.close().unwrap();

    let mut s = engine.session().unwrap();
    let z_force = s
        .exec(&select::<Team>().filter(Team::NAME.eq("Z-Force")))
        .unwrap()
        .one()
        .unwrap();
    s.delete(z_force).unwrap();
    s.commit().unwrap();

    let deadpond = s
        .exec(&select::<Hero>().filter(Hero::NAME.eq("Deadpond")))
        .unwrap()
        .one()
        .unwrap();
    assert_eq!(s.entity(deadpond).unwrap().team_id, None);
}

#[test]
fn test_cascade_delete_removes_heroes() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, options(OnDelete::Cascade, true));
    let mut s = engine.session().unwrap();
    let t = tutorial(&mut s);

    s.collection(t.preventers, Team::HEROES).unwrap();
    s.delete(t.preventers).unwrap();
    s.commit().unwrap();

    assert_eq!(s.object_state(t.rusty_man), ObjectState::Deleted);
    assert_eq!(s.entity(t.rusty_man).unwrap().name, "Rusty-Man");
    let remaining = s.exec(&select::<Hero>().order_by(Hero::ID)).unwrap().all();
    assert_eq!(remaining, vec![t.deadpond, t.spider_boy]);
}

#[test]
fn test_cascade_delete_of_unloaded_dependents() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, options(OnDelete::Cascade, true));
    let mut s = engine.session().unwrap();
    tutorial(&mut s);
    s.close().unwrap();

    let mut s = engine.session().unwrap();
    let z_force = s
        .exec(&select::<Team>().filter(Team::NAME.eq("Z-Force")))
        .unwrap()
        .one()
        .unwrap();
    s.delete(z_force).unwrap();
    s.commit().unwrap();
    assert_eq!(engine.connect().unwrap().count_rows("hero").unwrap(), 2);
}

#[test]
fn test_restrict_rejects_deleting_team_with_heroes() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, options(OnDelete::Restrict, true));
    let mut s = engine.session().unwrap();
    let t = tutorial(&mut s);

    s.delete(t.preventers).unwrap();
    let err = s.commit().unwrap_err();
    assert!(matches!(err, Error::Integrity { .. }), "{err}");
    assert_eq!(s.object_state(t.preventers), ObjectState::Persistent);
    assert_eq!(engine.connect().unwrap().count_rows("team").unwrap(), 2);

    // A team without heroes can go
    let mut other = engine.session().unwrap();
    let empty = other.add(Team::new("Wakaland", "Wakaland Capital City")).unwrap();
    other.commit().unwrap();
    other.delete(empty).unwrap();
    other.commit().unwrap();
    assert_eq!(other.object_state(empty), ObjectState::Deleted);
}
