//! Startup recovery and the stale-run sweep.
//!
//! A task can claim `in_progress` while nothing runs it: the process
//! restarted, or a worker died without its exit being observed. The sweep
//! looks for evidence in this order and acts on the first that applies:
//!
//! 1. a live handle whose process is still alive
//! 2. a task younger than the grace period
//! 3. recent log lines, or a recently written worker log file
//! 4. the last run marker, which is replayed through the normal exit path
//!
//! A task with no run marker at all is reset to `inbox`. Replay never starts
//! the worker again.
//!
//! The sweep also retries dispatches that never happened. A task whose latest
//! log line is a deferral marker, or one that was created or planned and never
//! got a worker, is handed to its executor again once past the grace period.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

use super::{Orchestrator, ReconcileReport};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{RunMarker, Task, TaskStatus};
use crate::services::notices::Notice;

/// Outcome counts of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub inspected: usize,
    pub skipped_live: usize,
    pub skipped_young: usize,
    pub skipped_active: usize,
    pub replayed_success: usize,
    pub replayed_failure: usize,
    pub reset_to_inbox: usize,
    /// Handles discarded because their process was gone.
    pub stale_handles: usize,
    /// Deferred tasks handed to a worker.
    pub redispatched: usize,
    /// Deferred tasks whose executor is still unavailable.
    pub still_deferred: usize,
}

impl SweepReport {
    /// Tasks whose state the sweep changed.
    pub fn acted(&self) -> usize {
        self.replayed_success + self.replayed_failure + self.reset_to_inbox + self.redispatched
    }
}

/// Everything startup recovery did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StartupReport {
    pub reconcile: ReconcileReport,
    pub coordinations_resumed: usize,
    pub reviews_finalized: usize,
    pub sweep: SweepReport,
}

enum Verdict {
    Live,
    Young,
    Active,
    ReplayedSuccess,
    ReplayedFailure,
    Reset,
}

impl Orchestrator {
    /// Run once at startup, before any new directive is accepted.
    pub async fn recover_on_startup(&self) -> DomainResult<StartupReport> {
        let reconcile = self.reconcile_all().await?;
        let coordinations_resumed = self.resume_coordinations().await?;

        let mut reviews_finalized = 0;
        for (i, task) in self
            .tasks
            .list_by_status(TaskStatus::Review)
            .await?
            .into_iter()
            .enumerate()
        {
            if i > 0 {
                Self::pace(self.settings.orchestrator.review_stagger_ms).await;
            }
            match self.finalize_review(task.id).await {
                Ok(()) => reviews_finalized += 1,
                Err(e) => tracing::warn!(task_id = %task.id, error = %e, "review finalization failed"),
            }
        }

        let sweep = self.sweep().await?;
        let report = StartupReport {
            reconcile,
            coordinations_resumed,
            reviews_finalized,
            sweep,
        };
        tracing::info!(report = ?report, "startup recovery complete");
        Ok(report)
    }

    /// Inspect every `in_progress` task once.
    pub async fn sweep(&self) -> DomainResult<SweepReport> {
        let mut report = SweepReport::default();
        let now = Utc::now();

        for task in self.tasks.list_by_status(TaskStatus::InProgress).await? {
            report.inspected += 1;
            match self.inspect(&task, now, &mut report).await {
                Ok(Verdict::Live) => report.skipped_live += 1,
                Ok(Verdict::Young) => report.skipped_young += 1,
                Ok(Verdict::Active) => report.skipped_active += 1,
                Ok(Verdict::ReplayedSuccess) => report.replayed_success += 1,
                Ok(Verdict::ReplayedFailure) => report.replayed_failure += 1,
                Ok(Verdict::Reset) => report.reset_to_inbox += 1,
                Err(e) => tracing::warn!(task_id = %task.id, error = %e, "sweep failed for task"),
            }
        }

        self.redispatch_deferred(now, &mut report).await?;

        if report.acted() > 0 || report.stale_handles > 0 {
            tracing::info!(report = ?report, "recovery sweep acted");
        } else {
            tracing::debug!(inspected = report.inspected, "recovery sweep idle");
        }
        Ok(report)
    }

    async fn inspect(
        &self,
        task: &Task,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> DomainResult<Verdict> {
        let config = &self.settings.orchestrator;
        let grace = seconds(config.stale_grace_secs);

        if let Some(run) = self.registry.live_run(task.id).await {
            match run.pid {
                _ if run.exiting => return Ok(Verdict::Live),
                None if now - run.started_at < grace => return Ok(Verdict::Live),
                None => {
                    tracing::warn!(task_id = %task.id, "run claimed but never spawned; discarding handle");
                    self.registry.release_run(task.id).await;
                    report.stale_handles += 1;
                }
                Some(pid) if self.liveness.is_alive(pid) => return Ok(Verdict::Live),
                Some(pid) => {
                    tracing::warn!(task_id = %task.id, pid, "worker process gone; discarding handle");
                    self.registry.release_run(task.id).await;
                    report.stale_handles += 1;
                }
            }
        }

        if now - task.last_touched_at() < grace {
            return Ok(Verdict::Young);
        }

        let window = seconds(config.activity_window_secs);
        if let Some(last) = self.logs.latest_activity_at(task.id).await? {
            if now - last < window {
                return Ok(Verdict::Active);
            }
        }
        if let Some(modified) = self.log_file_modified(task).await {
            if now - modified < window {
                return Ok(Verdict::Active);
            }
        }

        let marker = self
            .logs
            .latest_run_marker(task.id)
            .await?
            .and_then(|line| RunMarker::parse(&line.message));

        match marker {
            Some(RunMarker::Exited(0)) => {
                tracing::info!(task_id = %task.id, "replaying clean exit");
                self.finish_run(task.id, 0).await?;
                Ok(Verdict::ReplayedSuccess)
            }
            Some(RunMarker::Exited(code)) => {
                tracing::info!(task_id = %task.id, exit_code = code, "replaying failed exit");
                self.finish_run(task.id, code).await?;
                Ok(Verdict::ReplayedFailure)
            }
            Some(RunMarker::SpawnFailed(reason)) => {
                tracing::info!(task_id = %task.id, reason = %reason, "replaying spawn failure");
                self.finish_run(task.id, -1).await?;
                Ok(Verdict::ReplayedFailure)
            }
            Some(RunMarker::Started) => {
                tracing::warn!(task_id = %task.id, "worker lost without an exit");
                self.log_system(task.id, &RunMarker::exit_line(-1)).await;
                self.finish_run(task.id, -1).await?;
                Ok(Verdict::ReplayedFailure)
            }
            Some(RunMarker::Deferred(_)) | None => {
                self.reset_to_inbox(task).await?;
                Ok(Verdict::Reset)
            }
        }
    }

    /// Hand deferred tasks to their executor again.
    async fn redispatch_deferred(
        &self,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> DomainResult<()> {
        let grace = seconds(self.settings.orchestrator.stale_grace_secs);
        for status in [
            TaskStatus::Planned,
            TaskStatus::Inbox,
            TaskStatus::Pending,
            TaskStatus::Collaborating,
        ] {
            for task in self.tasks.list_by_status(status).await? {
                if task.coordination.is_some()
                    || now - task.last_touched_at() < grace
                    || self.registry.live_run(task.id).await.is_some()
                    || self.stop_requested(&task).await.is_some()
                    || !self.is_deferred(&task).await?
                {
                    continue;
                }

                let outcome = match self.executor_for(&task).await {
                    Ok(agent_id) => self.run_task(task.id, agent_id).await,
                    Err(e) => Err(e),
                };
                match outcome {
                    Ok(()) => {
                        tracing::info!(task_id = %task.id, status = %status, "deferred task dispatched");
                        report.redispatched += 1;
                    }
                    Err(DomainError::DispatchRefused { reason, .. }) => {
                        tracing::debug!(task_id = %task.id, reason = %reason, "task still deferred");
                        report.still_deferred += 1;
                    }
                    Err(e) => {
                        tracing::warn!(task_id = %task.id, error = %e, "failed to dispatch deferred task");
                    }
                }
            }
        }
        Ok(())
    }

    /// A refused dispatch is the last thing in the task's log, or the task was
    /// created and never reached a worker.
    async fn is_deferred(&self, task: &Task) -> DomainResult<bool> {
        let latest = self.logs.recent(task.id, 1).await?;
        let Some(line) = latest.first() else {
            return Ok(matches!(task.status, TaskStatus::Inbox | TaskStatus::Planned));
        };
        if matches!(RunMarker::parse(&line.message), Some(RunMarker::Deferred(_))) {
            return Ok(true);
        }
        if task.status != TaskStatus::Planned {
            return Ok(false);
        }
        Ok(self.logs.latest_run_marker(task.id).await?.is_none())
    }

    async fn log_file_modified(&self, task: &Task) -> Option<DateTime<Utc>> {
        let metadata = tokio::fs::metadata(self.log_path(task.id)).await.ok()?;
        metadata.modified().ok().map(DateTime::<Utc>::from)
    }

    /// No evidence a worker ever ran: back to the inbox.
    async fn reset_to_inbox(&self, task: &Task) -> DomainResult<()> {
        let mut task = self.load_task(task.id).await?;
        Self::transition(&mut task, TaskStatus::Inbox)?;
        task.coordination = None;
        self.save_task(&task).await?;
        self.release_executor(task.id).await;
        self.registry.take_hook(task.id).await;
        self.take_batch_of(&task).await;

        tracing::warn!(task_id = %task.id, "no run evidence; task reset to inbox");
        self.log_system(task.id, "Watchdog: no run evidence, reset to inbox")
            .await;
        self.notify_task(&task, Notice::WatchdogReset { title: &task.title })
            .await;
        Ok(())
    }
}

fn seconds(secs: u64) -> ChronoDuration {
    ChronoDuration::from_std(std::time::Duration::from_secs(secs))
        .unwrap_or_else(|_| ChronoDuration::weeks(52 * 100))
}
