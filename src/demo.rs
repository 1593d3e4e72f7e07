//! Hero/Team tutorial scenarios used by the command-line program

use serde::Serialize;
use tabled::Tabled;
use crate::models::{Hero, Team};
use crate::query::{Select, or_, select, select_pair};
use crate::session::{Key, Session};
use crate::Result;

/// Teams created by [`seed`]: name and headquarters
pub const TEAMS: &[(&str, &str)] = &[
    ("Preventers", "Sharp Tower"),
    ("Z-Force", "Sister Margaret's Bar"),
    ("Wakaland", "Wakaland Capital City"),
];

/// Heroes created by [`seed`]
pub const HEROES: &[SeedHero] = &[
    SeedHero::new("Deadpond", "Dive Wilson", None, Some("Z-Force")),
    SeedHero::new("Spider-Boy", "Pedro Parqueador", None, None),
    SeedHero::new("Rusty-Man", "Tommy Sharp", Some(48), Some("Preventers")),
    SeedHero::new("Tarantula", "Natalia Roman-on", Some(32), Some("Preventers")),
    SeedHero::new("Black Lion", "Trevor Challa", Some(35), Some("Wakaland")),
    SeedHero::new("Princess Sure-E", "Sure-E", None, Some("Wakaland")),
    SeedHero::new("Dr. Weird", "Steve Weird", Some(36), Some("Preventers")),
    SeedHero::new("Captain North America", "Esteban Rogelios", Some(93), Some("Preventers")),
];

#[derive(Debug, Clone, Copy)]
pub struct SeedHero {
    pub name: &'static str,
    pub secret_name: &'static str,
    pub age: Option<i64>,
    pub team: Option<&'static str>,
}

impl SeedHero {
    const fn new(name: &'static str, secret_name: &'static str, age: Option<i64>, team: Option<&'static str>) -> Self {
        Self { name, secret_name, age, team }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub teams_created: usize,
    pub heroes_created: usize,
}

/// Insert the tutorial teams and heroes that are not present yet.
///
/// Heroes of a team already in the store are added through the team's
/// collection, the others through `hero.team`.
pub fn seed(session: &mut Session) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    let mut teams = Vec::with_capacity(TEAMS.len());
    for (name, headquarters) in TEAMS {
        let key = match find_team(session, name)? {
            Some(key) => key,
            None => {
                report.teams_created += 1;
                session.add(Team::new(*name, *headquarters))?
            }
        };
        teams.push((*name, key));
    }

    for entry in HEROES {
        if find_hero(session, entry.name)?.is_some() {
            continue;
        }
        let mut hero = Hero::new(entry.name, entry.secret_name);
        hero.age = entry.age;
        let key = session.add(hero)?;
        report.heroes_created += 1;

        let Some(team_name) = entry.team else { continue };
        let Some(&(_, team)) = teams.iter().find(|(name, _)| *name == team_name) else { continue };
        if session.id_of(team)?.is_some() {
            session.append(team, Team::HEROES, key)?;
        } else {
            session.set_related(key, Hero::TEAM, Some(team))?;
        }
    }

    session.commit()?;
    tracing::info!(
        "Seeded {} teams and {} heroes",
        report.teams_created,
        report.heroes_created
    );
    Ok(report)
}

pub fn find_team(session: &mut Session, name: &str) -> Result<Option<Key<Team>>> {
    Ok(session.exec(&select::<Team>().filter(Team::NAME.eq(name)))?.first())
}

pub fn find_hero(session: &mut Session, name: &str) -> Result<Option<Key<Hero>>> {
    Ok(session.exec(&select::<Hero>().filter(Hero::NAME.eq(name)))?.first())
}

/// Heroes aged 35 or younger, or older than 90
pub fn young_or_old() -> Select<Hero> {
    select::<Hero>()
        .filter(or_([Hero::AGE.le(35), Hero::AGE.gt(90)]))
        .order_by(Hero::ID)
}

/// Move a hero to a team, or out of any team with `None`
pub fn assign(session: &mut Session, hero: &str, team: Option<&str>) -> Result<Hero> {
    let hero = session
        .exec(&select::<Hero>().filter(Hero::NAME.eq(hero)))?
        .one()?;
    let team = match team {
        Some(name) => Some(session.exec(&select::<Team>().filter(Team::NAME.eq(name)))?.one()?),
        None => None,
    };
    session.set_related(hero, Hero::TEAM, team)?;
    session.commit()?;
    session.refresh(hero)?;
    session.entity(hero)
}

/// Delete a team by name; returns its last values and the heroes it had
pub fn delete_team(session: &mut Session, name: &str) -> Result<(Team, Vec<Hero>)> {
    let team = session
        .exec(&select::<Team>().filter(Team::NAME.eq(name)))?
        .one()?;
    let members = session.collection(team, Team::HEROES)?;
    session.delete(team)?;
    session.commit()?;

    let mut affected = Vec::with_capacity(members.len());
    for hero in members {
        affected.push(session.entity(hero)?);
    }
    Ok((session.entity(team)?, affected))
}

/// One hero line of the listing commands
#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct HeroRow {
    #[tabled(rename = "ID")]
    pub id: i64,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Secret name")]
    pub secret_name: String,
    #[tabled(rename = "Age", display_with = "display_opt")]
    pub age: Option<i64>,
    #[tabled(rename = "Team", display_with = "display_opt")]
    pub team: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct TeamRow {
    #[tabled(rename = "ID")]
    pub id: i64,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Headquarters")]
    pub headquarters: String,
    #[tabled(rename = "Heroes")]
    pub heroes: usize,
}

fn display_opt<T: std::fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "-".to_string(),
    }
}

/// Rows for a set of heroes, resolving each hero's team
pub fn hero_rows(session: &mut Session, heroes: &[Key<Hero>]) -> Result<Vec<HeroRow>> {
    let mut rows = Vec::with_capacity(heroes.len());
    for &key in heroes {
        let hero = session.entity(key)?;
        let team = match session.related(key, Hero::TEAM)? {
            Some(team) => Some(session.entity(team)?.name),
            None => None,
        };
        rows.push(HeroRow {
            id: hero.id.unwrap_or_default(),
            name: hero.name,
            secret_name: hero.secret_name,
            age: hero.age,
            team,
        });
    }
    Ok(rows)
}

pub fn team_rows(session: &mut Session) -> Result<Vec<TeamRow>> {
    let teams = session.exec(&select::<Team>().order_by(Team::ID))?;
    let mut rows = Vec::with_capacity(teams.len());
    for key in teams {
        let heroes = session.collection(key, Team::HEROES)?.len();
        let team = session.entity(key)?;
        rows.push(TeamRow {
            id: team.id.unwrap_or_default(),
            name: team.name,
            headquarters: team.headquarters,
            heroes,
        });
    }
    Ok(rows)
}

/// Hero/team pairs joined on `hero.team_id`.
///
/// With `outer` unaffiliated heroes are included with no team.
pub fn join_rows(session: &mut Session, outer: bool, team: Option<&str>) -> Result<Vec<(Hero, Option<Team>)>> {
    let mut query = if outer {
        select_pair::<Hero, Team>().outer_join::<Team>()
    } else {
        select_pair::<Hero, Team>().join::<Team>()
    };
    if let Some(name) = team {
        query = query.filter(Team::NAME.eq(name));
    }
    let pairs = session.exec_pair(&query.order_by(Hero::ID))?;

    let mut rows = Vec::with_capacity(pairs.len());
    for (hero, team) in pairs {
        let team = match team {
            Some(key) => Some(session.entity(key)?),
            None => None,
        };
        rows.push((session.entity(hero)?, team));
    }
    Ok(rows)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub teams: usize,
    pub heroes: usize,
    pub unaffiliated: usize,
}

pub fn stats(session: &mut Session) -> Result<Stats> {
    Ok(Stats {
        teams: session.exec(&select::<Team>())?.len(),
        heroes: session.exec(&select::<Hero>())?.len(),
        unaffiliated: session
            .exec(&select::<Hero>().filter(Hero::TEAM_ID.is_null()))?
            .len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, EngineConfig};
    use crate::models::ModelOptions;

    fn engine() -> Engine {
        let engine = Engine::new("sqlite://", ModelOptions::default().registry().unwrap(), EngineConfig::default()).unwrap();
        engine.create_all().unwrap();
        engine
    }

    #[test]
    fn test_seed_is_idempotent() {
        let engine = engine();
        let mut session = engine.session().unwrap();
        let first = seed(&mut session).unwrap();
        assert_eq!(first, SeedReport { teams_created: 3, heroes_created: 8 });
        let second = seed(&mut session).unwrap();
        assert_eq!(second, SeedReport::default());
        assert_eq!(stats(&mut session).unwrap(), Stats { teams: 3, heroes: 8, unaffiliated: 1 });
    }

    #[test]
    fn test_team_rows_count_heroes() {
        let engine = engine();
        let mut session = engine.session().unwrap();
        seed(&mut session).unwrap();
        let rows = team_rows(&mut session).unwrap();
        let counts: Vec<(String, usize)> = rows.into_iter().map(|r| (r.name, r.heroes)).collect();
        assert_eq!(
            counts,
            vec![
                ("Preventers".to_string(), 4),
                ("Z-Force".to_string(), 1),
                ("Wakaland".to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_assign_and_delete_team() {
        let engine = engine();
        let mut session = engine.session().unwrap();
        seed(&mut session).unwrap();

        let hero = assign(&mut session, "Spider-Boy", Some("Preventers")).unwrap();
        assert!(hero.team_id.is_some());

        let (team, members) = delete_team(&mut session, "Wakaland").unwrap();
        assert_eq!(team.name, "Wakaland");
        assert_eq!(members.len(), 2);
        assert!(members.iter().all(|h| h.team_id.is_none()));
        assert_eq!(stats(&mut session).unwrap().teams, 2);
    }
}
