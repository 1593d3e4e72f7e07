use anyhow::Context;
use owo_colors::OwoColorize;
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;
use rowkeeper::config::{self, RowkeeperConfig};
use rowkeeper::demo::{self, HeroRow};
use rowkeeper::output::{OutputMode, emit_success};
use rowkeeper::ui::{self, Icons};
use rowkeeper::{Descriptor, Engine, EngineConfig, Hero, ModelOptions, Session, select};
use crate::{Cli, Commands};

/// Effective settings: config file values overridden by flags
pub struct Settings {
    pub config_path: PathBuf,
    pub descriptor: Descriptor,
    pub database: String,
    pub engine: EngineConfig,
    pub model: ModelOptions,
}

impl Settings {
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
        let file = config::load_config(Some(&config_path))?.unwrap_or_default();

        let database = cli.database.clone().unwrap_or_else(|| file.database_or_default());
        let descriptor = Descriptor::parse(&database)?;

        let mut engine = file.engine_config();
        engine.echo |= cli.echo;

        let mut model = file.model;
        if let Some(on_delete) = cli.on_delete {
            model.on_delete = on_delete;
        }
        if cli.unidirectional {
            model.bidirectional = false;
        }

        Ok(Self {
            config_path,
            descriptor,
            database,
            engine,
            model,
        })
    }

    fn engine(&self) -> anyhow::Result<Engine> {
        if let Descriptor::File(path) = &self.descriptor {
            config::ensure_db_dir(path)?;
        }
        let engine = Engine::from_descriptor(self.descriptor.clone(), self.model.registry()?, self.engine)?;
        // Every command works on materialized tables
        engine.create_all()?;
        Ok(engine)
    }
}

pub fn run(command: Commands, settings: &Settings, mode: OutputMode) -> anyhow::Result<()> {
    match command {
        Commands::Init { force } => run_init(settings, force, mode),
        Commands::Seed => run_seed(settings, mode),
        Commands::Heroes { young_or_old, limit, offset } => run_heroes(settings, young_or_old, limit, offset, mode),
        Commands::Hero { id, name } => run_hero(settings, id, name, mode),
        Commands::Teams => run_teams(settings, mode),
        Commands::TeamHeroes { name } => run_team_heroes(settings, &name, mode),
        Commands::Join { outer, team } => run_join(settings, outer, team.as_deref(), mode),
        Commands::Assign { hero, team, none } => {
            let team = if none { None } else { Some(team.context("pass a team name or --none")?) };
            run_assign(settings, &hero, team.as_deref(), mode)
        }
        Commands::DeleteTeam { name } => run_delete_team(settings, &name, mode),
        Commands::Stats => run_stats(settings, mode),
    }
}

fn with_session<T>(settings: &Settings, f: impl FnOnce(&mut Session) -> rowkeeper::Result<T>) -> anyhow::Result<T> {
    let engine = settings.engine()?;
    Ok(engine.with_session(f)?)
}

fn run_init(settings: &Settings, force: bool, mode: OutputMode) -> anyhow::Result<()> {
    let wrote_config = if settings.config_path.exists() && !force {
        false
    } else {
        let file = RowkeeperConfig {
            database: Some(settings.database.clone()),
            echo: Some(settings.engine.echo),
            expire_on_commit: Some(settings.engine.expire_on_commit),
            model: settings.model,
        };
        config::write_config(&settings.config_path, &file, force)?;
        true
    };

    let engine = settings.engine()?;
    let tables = engine.connect()?.table_names()?;

    if mode.is_human() {
        ui::header("Rowkeeper initialized");
        if wrote_config {
            ui::status(Icons::NEW, "Config", &settings.config_path.display().to_string());
        } else {
            ui::warn(&format!(
                "Keeping existing config at {} (use --force to overwrite)",
                settings.config_path.display()
            ));
        }
        ui::status(Icons::DATABASE, "Database", &settings.descriptor.to_string());
        ui::status(Icons::LINK, "On delete", settings.model.on_delete.as_str());
        ui::status(Icons::INFO, "Tables", &tables.join(", "));
    } else {
        emit_success(
            "init",
            serde_json::json!({
                "config": settings.config_path.display().to_string(),
                "config_written": wrote_config,
                "database": settings.descriptor.to_string(),
                "tables": tables,
            }),
        )?;
    }
    Ok(())
}

fn run_seed(settings: &Settings, mode: OutputMode) -> anyhow::Result<()> {
    let report = with_session(settings, demo::seed)?;
    if mode.is_human() {
        if report.teams_created + report.heroes_created == 0 {
            ui::info("Seed", "tutorial data already present");
        } else {
            ui::success("Seeded tutorial data");
            ui::summary_row("Teams created:", &report.teams_created.to_string());
            ui::summary_row("Heroes created:", &report.heroes_created.to_string());
        }
    } else {
        emit_success("seed", report)?;
    }
    Ok(())
}

fn print_heroes(title: &str, rows: &[HeroRow]) {
    ui::section(title);
    if rows.is_empty() {
        println!("{}", ui::muted("No heroes found."));
    } else {
        println!("{}", ui::render(rows));
    }
}

fn run_heroes(
    settings: &Settings,
    young_or_old: bool,
    limit: Option<u64>,
    offset: Option<u64>,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let rows = with_session(settings, |s| {
        let mut query = if young_or_old {
            demo::young_or_old()
        } else {
            select::<Hero>().order_by(Hero::ID)
        };
        if let Some(n) = limit {
            query = query.limit(n);
        }
        if let Some(n) = offset {
            query = query.offset(n);
        }
        let heroes = s.exec(&query)?.all();
        demo::hero_rows(s, &heroes)
    })?;

    if mode.is_human() {
        print_heroes("Heroes", &rows);
    } else {
        emit_success("heroes", rows)?;
    }
    Ok(())
}

fn run_hero(settings: &Settings, id: Option<i64>, name: Option<String>, mode: OutputMode) -> anyhow::Result<()> {
    let row = with_session(settings, |s| {
        let key = match (id, name.as_deref()) {
            (Some(id), _) => s.get::<Hero>(id)?,
            (None, Some(name)) => demo::find_hero(s, name)?,
            (None, None) => None,
        };
        match key {
            Some(key) => Ok(demo::hero_rows(s, &[key])?.pop()),
            None => Ok(None),
        }
    })?;

    let lookup = match (id, &name) {
        (Some(id), _) => format!("id {}", id),
        (None, Some(name)) => format!("name '{}'", name),
        (None, None) => String::from("no lookup"),
    };
    match (mode.is_human(), row) {
        (true, Some(row)) => print_heroes("Hero", std::slice::from_ref(&row)),
        (true, None) => ui::warn(&format!("No hero with {}", lookup)),
        (false, row) => emit_success("hero", row)?,
    }
    Ok(())
}

fn run_teams(settings: &Settings, mode: OutputMode) -> anyhow::Result<()> {
    let rows = with_session(settings, demo::team_rows)?;
    if mode.is_human() {
        ui::section(&format!("{} Teams", Icons::TEAM));
        if rows.is_empty() {
            println!("{}", ui::muted("No teams found."));
        } else {
            println!("{}", ui::render(&rows));
        }
    } else {
        emit_success("teams", rows)?;
    }
    Ok(())
}

fn run_team_heroes(settings: &Settings, name: &str, mode: OutputMode) -> anyhow::Result<()> {
    let rows = with_session(settings, |s| {
        let Some(team) = demo::find_team(s, name)? else {
            return Ok(None);
        };
        let heroes = s.collection(team, rowkeeper::Team::HEROES)?;
        Ok(Some(demo::hero_rows(s, &heroes)?))
    })?
    .with_context(|| format!("no team named '{}'", name))?;

    if mode.is_human() {
        print_heroes(&format!("{} heroes", name), &rows);
    } else {
        emit_success("team-heroes", rows)?;
    }
    Ok(())
}

#[derive(Serialize, Tabled)]
struct JoinRow {
    #[tabled(rename = "Hero")]
    hero: String,
    #[tabled(rename = "Team")]
    team: String,
    #[tabled(rename = "Headquarters")]
    headquarters: String,
}

fn run_join(settings: &Settings, outer: bool, team: Option<&str>, mode: OutputMode) -> anyhow::Result<()> {
    let pairs = with_session(settings, |s| demo::join_rows(s, outer, team))?;

    if mode.is_human() {
        let rows: Vec<JoinRow> = pairs
            .iter()
            .map(|(hero, team)| JoinRow {
                hero: hero.name.clone(),
                team: team.as_ref().map(|t| t.name.clone()).unwrap_or_else(|| "None".to_string()),
                headquarters: team.as_ref().map(|t| t.headquarters.clone()).unwrap_or_default(),
            })
            .collect();
        ui::section(if outer { "Heroes and teams (outer join)" } else { "Heroes and teams" });
        if rows.is_empty() {
            println!("{}", ui::muted("No rows."));
        } else {
            println!("{}", ui::render(&rows));
        }
    } else {
        let data: Vec<_> = pairs
            .into_iter()
            .map(|(hero, team)| serde_json::json!({ "hero": hero, "team": team }))
            .collect();
        emit_success("join", data)?;
    }
    Ok(())
}

fn run_assign(settings: &Settings, hero: &str, team: Option<&str>, mode: OutputMode) -> anyhow::Result<()> {
    let updated = with_session(settings, |s| demo::assign(s, hero, team))?;
    if mode.is_human() {
        let label = match team {
            Some(team) => format!("Moved to {}", team),
            None => "Removed from team".to_string(),
        };
        ui::entity_line(Icons::PERSON, &label, &updated);
    } else {
        emit_success("assign", updated)?;
    }
    Ok(())
}

fn run_delete_team(settings: &Settings, name: &str, mode: OutputMode) -> anyhow::Result<()> {
    let (team, members) = with_session(settings, |s| demo::delete_team(s, name))?;
    if mode.is_human() {
        ui::entity_line(Icons::DEL, "Deleted team", &team);
        ui::status(Icons::LINK, "Policy", settings.model.on_delete.as_str());
        for hero in &members {
            ui::entity_line(Icons::PERSON, "Former member", hero);
        }
    } else {
        emit_success(
            "delete-team",
            serde_json::json!({
                "team": team,
                "on_delete": settings.model.on_delete,
                "members": members,
            }),
        )?;
    }
    Ok(())
}

fn run_stats(settings: &Settings, mode: OutputMode) -> anyhow::Result<()> {
    let stats = with_session(settings, demo::stats)?;
    if mode.is_human() {
        println!(
            "{} {} {}",
            Icons::STATS,
            "Rowkeeper Statistics".style(ui::theme().style(ui::Role::Title)),
            ui::dim(&format!("({})", settings.descriptor))
        );
        println!(
            "{}",
            ui::stats_table(&[
                ("Teams", stats.teams.to_string()),
                ("Heroes", stats.heroes.to_string()),
                ("Heroes without a team", stats.unaffiliated.to_string()),
            ])
        );
    } else {
        emit_success("stats", stats)?;
    }
    Ok(())
}
