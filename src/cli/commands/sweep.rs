//! Implementation of the `taskforce sweep` command.

use anyhow::{Context, Result};
use std::sync::Arc;

use super::{build_orchestrator, drain_live_runs, open_pool};
use crate::adapters::sinks::ConsoleNotifier;
use crate::cli::display::{output, CommandOutput};
use crate::domain::models::Config;
use crate::services::SweepReport;

#[derive(Debug, serde::Serialize)]
pub struct SweepOutput {
    #[serde(flatten)]
    pub report: SweepReport,
}

impl CommandOutput for SweepOutput {
    fn to_human(&self) -> String {
        let r = &self.report;
        let mut lines = vec![format!("Inspected {} in-progress task(s)", r.inspected)];
        lines.push(format!("  Live:             {}", r.skipped_live));
        lines.push(format!("  In grace period:  {}", r.skipped_young));
        lines.push(format!("  Recently active:  {}", r.skipped_active));
        lines.push(format!("  Replayed success: {}", r.replayed_success));
        lines.push(format!("  Replayed failure: {}", r.replayed_failure));
        lines.push(format!("  Reset to inbox:   {}", r.reset_to_inbox));
        if r.stale_handles > 0 {
            lines.push(format!("  Stale handles:    {}", r.stale_handles));
        }
        if r.redispatched + r.still_deferred > 0 {
            lines.push(format!("  Redispatched:     {}", r.redispatched));
            lines.push(format!("  Still deferred:   {}", r.still_deferred));
        }
        lines.join("\n")
    }
}

pub async fn execute(config: &Config, json_mode: bool) -> Result<()> {
    let pool = open_pool(config).await?;
    let orchestrator = build_orchestrator(config, pool, Arc::new(ConsoleNotifier::new(json_mode)));

    let report = orchestrator.sweep().await.context("Recovery sweep failed")?;
    drain_live_runs(&orchestrator).await;

    output(&SweepOutput { report }, json_mode);
    Ok(())
}
