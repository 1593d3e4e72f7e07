mod common;

use common::{engine, names, tutorial};
use rowkeeper::demo::young_or_old;
use rowkeeper::{Error, Hero, ModelOptions, Team, and_, select, select_pair};
use tempfile::TempDir;

fn seven_heroes(s: &mut rowkeeper::Session) {
    let heroes = [
        Hero::new("Deadpond", "Dive Wilson"),
        Hero::new("Spider-Boy", "Pedro Parqueador"),
        Hero::new("Rusty-Man", "Tommy Sharp").with_age(48),
        Hero::new("Tarantula", "Natalia Roman-on").with_age(32),
        Hero::new("Black Lion", "Trevor Challa").with_age(35),
        Hero::new("Dr. Weird", "Steve Weird").with_age(36),
        Hero::new("Captain North America", "Esteban Rogelios").with_age(93),
    ];
    for hero in heroes {
        s.add(hero).unwrap();
    }
    s.commit().unwrap();
}

#[test]
fn test_young_or_old_filter() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, ModelOptions::default());
    let mut s = engine.session().unwrap();
    seven_heroes(&mut s);

    let heroes = s.exec(&young_or_old()).unwrap().all();
    assert_eq!(
        names(&mut s, &heroes),
        vec!["Tarantula", "Black Lion", "Captain North America"]
    );
}

#[test]
fn test_chained_filters_and_range() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, ModelOptions::default());
    let mut s = engine.session().unwrap();
    seven_heroes(&mut s);

    let query = select::<Hero>()
        .filter(Hero::AGE.ge(35))
        .filter(Hero::AGE.lt(40))
        .order_by(Hero::AGE);
    let heroes = s.exec(&query).unwrap().all();
    assert_eq!(names(&mut s, &heroes), vec!["Black Lion", "Dr. Weird"]);

    let same = s
        .exec(&select::<Hero>().filter(and_([Hero::AGE.ge(35), Hero::AGE.lt(40)])).order_by(Hero::AGE))
        .unwrap()
        .all();
    assert_eq!(same, heroes);
}

#[test]
fn test_limit_offset_and_ordering() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, ModelOptions::default());
    let mut s = engine.session().unwrap();
    seven_heroes(&mut s);

    let page = s
        .exec(&select::<Hero>().order_by(Hero::ID).offset(2).limit(3))
        .unwrap()
        .all();
    assert_eq!(names(&mut s, &page), vec!["Rusty-Man", "Tarantula", "Black Lion"]);

    let oldest = s
        .exec(&select::<Hero>().filter(Hero::AGE.is_not_null()).order_by_desc(Hero::AGE))
        .unwrap()
        .first()
        .unwrap();
    assert_eq!(s.entity(oldest).unwrap().name, "Captain North America");

    let ageless = s.exec(&select::<Hero>().filter(Hero::AGE.eq(None::<i64>))).unwrap();
    assert_eq!(ageless.len(), 2);
}

#[test]
fn test_one_and_first_terminals() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, ModelOptions::default());
    let mut s = engine.session().unwrap();
    seven_heroes(&mut s);

    let err = s.exec(&select::<Hero>()).unwrap().one().unwrap_err();
    assert!(matches!(err, Error::MultipleResults { count: 7, .. }));

    let none = s.exec(&select::<Hero>().filter(Hero::NAME.eq("Nobody"))).unwrap();
    assert!(matches!(none.clone().one(), Err(Error::NotFound(_))));
    assert_eq!(none.first(), None);
}

#[test]
fn test_query_results_share_identity() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, ModelOptions::default());
    let mut s = engine.session().unwrap();
    let t = tutorial(&mut s);

    let found = s
        .exec(&select::<Hero>().filter(Hero::NAME.eq("Deadpond")))
        .unwrap()
        .one()
        .unwrap();
    assert_eq!(found, t.deadpond);
}

#[test]
fn test_join_filters_by_team() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, ModelOptions::default());
    let mut s = engine.session().unwrap();
    tutorial(&mut s);

    let heroes = s
        .exec(&select::<Hero>().join::<Team>().filter(Team::NAME.eq("Preventers")))
        .unwrap()
        .all();
    assert_eq!(names(&mut s, &heroes), vec!["Rusty-Man"]);
}

#[test]
fn test_implicit_and_explicit_joins_agree() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, ModelOptions::default());
    let mut s = engine.session().unwrap();
    let t = tutorial(&mut s);

    let implicit = s
        .exec_pair(&select_pair::<Hero, Team>().filter(Hero::TEAM_ID.eq(Team::ID)).order_by(Hero::ID))
        .unwrap()
        .all();
    let joined = s
        .exec_pair(&select_pair::<Hero, Team>().join::<Team>().order_by(Hero::ID))
        .unwrap()
        .all();
    assert_eq!(implicit, joined);
    assert_eq!(
        implicit,
        vec![(t.deadpond, Some(t.z_force)), (t.rusty_man, Some(t.preventers))]
    );
}

#[test]
fn test_outer_join_yields_none_for_unaffiliated() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, ModelOptions::default());
    let mut s = engine.session().unwrap();
    let t = tutorial(&mut s);

    let pairs = s
        .exec_pair(&select_pair::<Hero, Team>().outer_join::<Team>().order_by(Hero::ID))
        .unwrap()
        .all();
    assert_eq!(
        pairs,
        vec![
            (t.deadpond, Some(t.z_force)),
            (t.rusty_man, Some(t.preventers)),
            (t.spider_boy, None),
        ]
    );
}

#[test]
fn test_invalid_queries() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, ModelOptions::default());
    let mut s = engine.session().unwrap();

    let unknown = rowkeeper::Column::new("hero", "power");
    assert!(matches!(
        s.exec(&select::<Hero>().filter(unknown.eq(9000))),
        Err(Error::InvalidQuery(_))
    ));
    assert!(matches!(
        s.exec(&select::<Hero>().join::<Hero>()),
        Err(Error::InvalidQuery(_))
    ));
}
