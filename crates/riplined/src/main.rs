//! Ripline Daemon - progression engine for wakepark trick videos.
//!
//! Scores maneuvers, maintains the XP ledger and specialization tracks,
//! and keeps the quest skill tree consistent.

use anyhow::Result;
use riplined::config::RiplinedConfig;
use riplined::engine::ProgressionEngine;
use riplined::notifier::{NullNotifier, ProgressionNotifier, TracingNotifier};
use riplined::seed;
use riplined::service::VideoService;
use riplined::store::ProgressionStore;
use std::sync::Arc;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("riplined v{} starting", env!("CARGO_PKG_VERSION"));

    let config = RiplinedConfig::load();
    let store = ProgressionStore::open(&config.db_path)?;

    let notifier: Arc<dyn ProgressionNotifier> = if config.notifications_enabled {
        Arc::new(TracingNotifier)
    } else {
        Arc::new(NullNotifier)
    };

    let engine = Arc::new(ProgressionEngine::new(store, &config, notifier)?);
    seed::seed_defaults(&engine.store, &engine.quests)?;

    let _service = VideoService::new(engine);
    info!("riplined ready");

    // Keep running; the video collaborator drives us over the wire.
    tokio::signal::ctrl_c().await?;
    info!("Shutting down gracefully");

    Ok(())
}
