//! Ripline Control - CLI client for the Ripline progression engine.
//!
//! Pure previews (maneuver calc, XP snapshots) plus read-only inspection
//! of a ripline database.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "riplinectl")]
#[command(about = "Ripline - wakepark progression engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Database path (read-only commands)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Preview the XP breakdown for a maneuver payload (JSON, inline or @file)
    Calc {
        payload: String,
    },

    /// Show the growth-curve state for a total XP value
    Snapshot {
        total: i64,
    },

    /// List the active component catalog
    Catalog,

    /// Show a user's progression and specialization tracks
    Rider {
        user_id: String,
    },

    /// Show a specialization leaderboard
    Leaderboard {
        /// slider, kicker, or surface
        track: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Quest suggestions for a user
    Quests {
        user_id: String,

        /// Show suggested retries instead of recommendations
        #[arg(long)]
        retries: bool,

        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Check a user's ledger against their progression total
    Audit {
        user_id: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Calc { payload } => commands::calc(cli.db.as_deref(), &payload),
        Commands::Snapshot { total } => commands::snapshot(total),
        Commands::Catalog => commands::catalog(cli.db.as_deref()),
        Commands::Rider { user_id } => commands::rider(cli.db.as_deref(), &user_id),
        Commands::Leaderboard { track, limit } => {
            commands::leaderboard(cli.db.as_deref(), &track, limit)
        }
        Commands::Quests {
            user_id,
            retries,
            limit,
        } => commands::quests(cli.db.as_deref(), &user_id, retries, limit),
        Commands::Audit { user_id } => commands::audit(cli.db.as_deref(), &user_id),
    }
}
