//! Rowkeeper CLI - Hero/Team tutorial scenarios over a SQLite file

mod commands;

use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use rowkeeper::OnDelete;
use rowkeeper::output::{OutputMode, emit_error};
use rowkeeper::ui;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rowkeeper")]
#[command(version)]
#[command(about = "Unit-of-work ORM over SQLite - Hero/Team demo")]
#[command(long_about = r#"
Rowkeeper stores heroes and teams in a SQLite file through a small
unit-of-work ORM: identity map, ordered flushes, joins and lazy
relationships with set-null / cascade / restrict delete policies.

Example usage:
  rowkeeper init
  rowkeeper seed
  rowkeeper heroes --young-or-old
  rowkeeper join --outer
  rowkeeper assign Spider-Boy Preventers
  rowkeeper delete-team Wakaland
"#)]
pub(crate) struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Connection descriptor (default: sqlite:///database.db)
    #[arg(short, long, global = true)]
    database: Option<String>,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log every SQL statement
    #[arg(long, global = true)]
    echo: bool,

    /// Emit JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Policy for a hero's team_id when its team is deleted (restrict, set-null, cascade)
    #[arg(long, global = true)]
    on_delete: Option<OnDelete>,

    /// Declare hero.team and team.heroes without back-population
    #[arg(long, global = true)]
    unidirectional: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Write rowkeeper.toml and create the tables
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Insert the tutorial teams and heroes
    Seed,

    /// List heroes
    Heroes {
        /// Only heroes aged 35 or younger, or older than 90
        #[arg(long)]
        young_or_old: bool,

        /// Maximum number of heroes
        #[arg(short, long)]
        limit: Option<u64>,

        /// Number of heroes to skip
        #[arg(long)]
        offset: Option<u64>,
    },

    /// Show one hero
    #[command(group(ArgGroup::new("lookup").required(true).args(["id", "name"])))]
    Hero {
        /// Primary key
        #[arg(long)]
        id: Option<i64>,

        /// Exact name
        #[arg(long)]
        name: Option<String>,
    },

    /// List teams with their hero counts
    Teams,

    /// List the heroes of one team
    TeamHeroes {
        /// Team name
        name: String,
    },

    /// Heroes joined with their teams
    Join {
        /// Include heroes without a team (left outer join)
        #[arg(long)]
        outer: bool,

        /// Only this team
        #[arg(long)]
        team: Option<String>,
    },

    /// Move a hero to a team
    Assign {
        /// Hero name
        hero: String,

        /// Team name
        #[arg(required_unless_present = "none")]
        team: Option<String>,

        /// Remove the hero from its team
        #[arg(long, conflicts_with = "team")]
        none: bool,
    },

    /// Delete a team; its heroes follow the on-delete policy
    DeleteTeam {
        /// Team name
        name: String,
    },

    /// Show row counts
    Stats,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Init { .. } => "init",
            Commands::Seed => "seed",
            Commands::Heroes { .. } => "heroes",
            Commands::Hero { .. } => "hero",
            Commands::Teams => "teams",
            Commands::TeamHeroes { .. } => "team-heroes",
            Commands::Join { .. } => "join",
            Commands::Assign { .. } => "assign",
            Commands::DeleteTeam { .. } => "delete-team",
            Commands::Stats => "stats",
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let output_mode = OutputMode::from_json_flag(cli.json);
    let command = cli.command.name();
    let result = commands::Settings::resolve(&cli).and_then(|settings| commands::run(cli.command, &settings, output_mode));

    if let Err(e) = &result {
        if output_mode.is_human() {
            ui::error(&format!("{:#}", e));
        } else {
            emit_error(command, &format!("{:#}", e))?;
        }
        std::process::exit(1);
    }
    Ok(())
}
