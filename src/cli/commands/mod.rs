//! CLI command implementations.

pub mod agent;
pub mod init;
pub mod reconcile;
pub mod serve;
pub mod sweep;
pub mod task;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::adapters::sqlite::{initialize_database, PoolConfig};
use crate::adapters::workers::{ProcessWorkerSpawner, SignalLivenessCheck};
use crate::domain::models::Config;
use crate::domain::ports::Notifier;
use crate::services::{Orchestrator, OrchestratorSettings, Stores};

/// Open and migrate the configured database.
pub(crate) async fn open_pool(config: &Config) -> Result<SqlitePool> {
    let pool_config = PoolConfig::default().with_max_connections(config.database.max_connections);
    initialize_database(&config.database.url(), Some(pool_config))
        .await
        .with_context(|| {
            format!(
                "Failed to open database at {}. Run 'taskforce init' first.",
                config.database.path
            )
        })
}

/// An orchestrator wired to real worker processes.
pub(crate) fn build_orchestrator(
    config: &Config,
    pool: SqlitePool,
    notifier: Arc<dyn Notifier>,
) -> Orchestrator {
    Orchestrator::new(
        Stores::sqlite(pool),
        Arc::new(ProcessWorkerSpawner::from_config(&config.workers)),
        Arc::new(SignalLivenessCheck),
        OrchestratorSettings::from(config),
    )
    .with_notifier(notifier)
}

/// Wait for every worker this process started to exit.
///
/// Short-lived commands can start workers through replay or resume; their
/// exit watchers live in this process.
pub(crate) async fn drain_live_runs(orchestrator: &Orchestrator) {
    let mut announced = false;
    loop {
        let live = orchestrator.live_runs().await;
        if live == 0 {
            return;
        }
        if !announced {
            tracing::info!(live, "waiting for started workers to exit");
            announced = true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }
}
