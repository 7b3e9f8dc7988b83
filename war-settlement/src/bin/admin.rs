//! ledger-admin: operator tool for the clan points ledger
//!
//! Prints JSON on stdout; logs go to stderr.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clan_ledger::{
    level::{level_floor, points_to_next_level},
    ClanId, ClanRecord, WarStats,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use war_settlement::{Config, SettlementEngine};

#[derive(Parser)]
#[command(name = "ledger-admin")]
#[command(about = "Inspect and reconcile the clan points ledger")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "war-settlement.toml")]
    config: String,

    /// Data directory (overrides config file)
    #[arg(short, long, env = "CLAN_LEDGER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Current leaderboard
    Rankings {
        /// Number of clans to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Ledger entries of a clan, newest first
    History {
        /// Clan ID
        clan: u64,

        /// Number of entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Replay a clan's ledger against its balance
    Reconcile {
        /// Clan ID
        clan: u64,
    },

    /// Balance, level progress and war counters of a clan
    Stats {
        /// Clan ID
        clan: u64,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("war_settlement=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = load_config(Path::new(&cli.config))?;
    if let Some(data_dir) = cli.data_dir {
        config.ledger.data_dir = data_dir;
    }
    info!(data_dir = %config.ledger.data_dir.display(), "Opening ledger");

    let engine = SettlementEngine::new(config).context("failed to open ledger")?;

    match cli.command {
        Command::Rankings { limit } => {
            let rankings = match limit {
                Some(limit) => engine.get_rankings(limit)?,
                None => engine.get_default_rankings()?,
            };
            print_json(&rankings)
        }
        Command::History { clan, limit } => print_json(&engine.clan_history(ClanId(clan), limit)?),
        Command::Reconcile { clan } => {
            let report = engine.reconcile(ClanId(clan))?;
            print_json(&report)?;
            if !report.consistent {
                anyhow::bail!("clan {} does not reconcile", clan);
            }
            Ok(())
        }
        Command::Stats { clan } => {
            let record = engine
                .get_clan(ClanId(clan))?
                .with_context(|| format!("clan {} is not registered", clan))?;
            let stats = engine.get_war_stats(record.clan_id)?;
            print_json(&ClanSummary::new(record, stats))
        }
    }
}

#[derive(Serialize)]
struct ClanSummary {
    clan: ClanRecord,
    stats: WarStats,
    /// Points at which the current level starts
    level_floor: Option<u64>,
    /// `None` at the top level
    points_to_next_level: Option<u64>,
}

impl ClanSummary {
    fn new(clan: ClanRecord, stats: WarStats) -> Self {
        Self {
            level_floor: level_floor(clan.level),
            points_to_next_level: points_to_next_level(clan.total_points),
            clan,
            stats,
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        Config::from_file(path).with_context(|| format!("failed to load {}", path.display()))
    } else {
        info!("Config file not found, using environment and defaults");
        Ok(Config::from_env()?)
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
