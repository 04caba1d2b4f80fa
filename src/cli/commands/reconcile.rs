//! Implementation of the `taskforce reconcile` command.

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use uuid::Uuid;

use super::{build_orchestrator, open_pool};
use crate::adapters::sinks::TracingNotifier;
use crate::cli::display::{output, CommandOutput};
use crate::domain::models::Config;
use crate::services::ReconcileReport;

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Only reconcile the subtasks of this parent task
    #[arg(short, long)]
    pub task: Option<Uuid>,
}

#[derive(Debug, serde::Serialize)]
pub struct ReconcileOutput {
    pub task_id: Option<Uuid>,
    #[serde(flatten)]
    pub report: ReconcileReport,
}

impl CommandOutput for ReconcileOutput {
    fn to_human(&self) -> String {
        format!(
            "Reconciled {} parent task(s): {} subtask(s) re-linked, {} updated",
            self.report.parents, self.report.linked, self.report.updated
        )
    }
}

pub async fn execute(args: ReconcileArgs, config: &Config, json_mode: bool) -> Result<()> {
    let pool = open_pool(config).await?;
    let orchestrator = build_orchestrator(config, pool, Arc::new(TracingNotifier));

    let report = match args.task {
        Some(task_id) => orchestrator
            .reconcile(task_id)
            .await
            .with_context(|| format!("Failed to reconcile task {task_id}"))?,
        None => orchestrator
            .reconcile_all()
            .await
            .context("Failed to reconcile tasks")?,
    };

    output(
        &ReconcileOutput {
            task_id: args.task,
            report,
        },
        json_mode,
    );
    Ok(())
}
