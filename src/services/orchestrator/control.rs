//! Operator pause, cancel and resume.

use uuid::Uuid;

use super::Orchestrator;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{SubtaskStatus, Task, TaskStatus};
use crate::services::notices::Notice;
use crate::services::registry::StopMode;

impl Orchestrator {
    /// Ask a task to stop.
    ///
    /// A running worker is terminated and its exit path applies the stop;
    /// otherwise the stop is applied right away. Active children are
    /// terminated too and inherit the request through their source task.
    pub async fn request_stop(&self, task_id: Uuid, mode: StopMode) -> DomainResult<Task> {
        let task = self.load_task(task_id).await?;
        if task.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: task.status.to_string(),
                to: mode.as_str().to_string(),
            });
        }

        self.registry.request_stop(task_id, mode).await;
        self.log_system(task_id, &format!("Stop requested ({})", mode.as_str()))
            .await;
        tracing::info!(task_id = %task_id, mode = mode.as_str(), "stop requested");

        for child in self.tasks.children_of(task_id).await? {
            if child.is_terminal() {
                continue;
            }
            if !self.terminate_run(child.id).await {
                self.apply_stop(child, mode).await?;
            }
        }

        if self.terminate_run(task_id).await {
            return self.load_task(task_id).await;
        }
        let task = self.load_task(task_id).await?;
        self.apply_stop(task, mode).await
    }

    /// Terminate the live worker of a task. False when there is none.
    async fn terminate_run(&self, task_id: Uuid) -> bool {
        let Some(pid) = self.registry.live_run(task_id).await.and_then(|run| run.pid) else {
            return false;
        };
        if let Err(e) = self.spawner.terminate(pid).await {
            tracing::warn!(task_id = %task_id, pid, error = %e, "failed to terminate worker");
        }
        true
    }

    /// Apply a stop to a task that has no running worker.
    pub(super) async fn apply_stop(&self, mut task: Task, mode: StopMode) -> DomainResult<Task> {
        let target = match mode {
            StopMode::Cancel => TaskStatus::Cancelled,
            StopMode::Pause if task.status == TaskStatus::Review => TaskStatus::Review,
            StopMode::Pause => TaskStatus::Pending,
        };
        if task.status == target || !task.can_transition_to(target) {
            return Ok(task);
        }

        Self::transition(&mut task, target)?;
        if mode == StopMode::Cancel {
            task.coordination = None;
        }
        self.save_task(&task).await?;
        self.release_executor(task.id).await;

        match mode {
            StopMode::Cancel => {
                self.registry.take_hook(task.id).await;
                self.notify_task(&task, Notice::Cancelled { title: &task.title })
                    .await;
            }
            StopMode::Pause => {
                self.notify_task(&task, Notice::Paused { title: &task.title })
                    .await;
            }
        }
        Ok(task)
    }

    /// Exit path of a cancelled run.
    pub(super) async fn cancel_after_exit(&self, task: Task) -> DomainResult<()> {
        let task = self.apply_stop(task, StopMode::Cancel).await?;
        let linked: Vec<Uuid> = self
            .subtasks
            .list_by_delegated_task(task.id)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        self.take_batch_of(&task).await;
        if !linked.is_empty() {
            let written = self
                .subtasks
                .set_status_many(&linked, SubtaskStatus::Blocked, Some("cancelled"))
                .await?;
            self.emit_subtasks(&written);
        }
        if let Some(parent_id) = task.source_task_id {
            self.reconcile(parent_id).await?;
        }
        Ok(())
    }

    /// Exit path of a paused run that did not finish. Subtasks stay as they are.
    pub(super) async fn pause_after_exit(&self, task: Task) -> DomainResult<()> {
        self.apply_stop(task, StopMode::Pause).await?;
        Ok(())
    }

    /// Clear a stop request and pick the work back up.
    pub async fn resume(&self, task_id: Uuid) -> DomainResult<Task> {
        let mut task = self.load_task(task_id).await?;
        if task.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: task.status.to_string(),
                to: "resumed".to_string(),
            });
        }
        self.registry.clear_stop(task_id).await;
        self.log_system(task_id, "Resumed").await;
        tracing::info!(task_id = %task_id, status = %task.status, "resuming task");

        if task.coordination.is_some() {
            if task.status == TaskStatus::Pending {
                Self::transition(&mut task, TaskStatus::Collaborating)?;
                self.save_task(&task).await?;
            }
            self.coordination_step(task.id, 0, true).await?;
            return self.load_task(task_id).await;
        }

        for child in self.tasks.children_of(task_id).await? {
            if matches!(child.status, TaskStatus::Pending | TaskStatus::Inbox) {
                let agent_id = self.executor_for(&child).await?;
                if let Err(e) = self.run_task(child.id, agent_id).await {
                    self.defer_refused(child.id, e).await?;
                }
            }
        }

        match task.status {
            TaskStatus::Pending | TaskStatus::Inbox | TaskStatus::Planned => {
                self.reopen_blocked(task.id).await?;
                let agent_id = self.executor_for(&task).await?;
                if let Err(e) = self.run_task(task.id, agent_id).await {
                    self.defer_refused(task.id, e).await?;
                }
            }
            TaskStatus::Review => self.finalize_review(task.id).await?,
            _ => {}
        }
        self.load_task(task_id).await
    }

    /// Put a task's own blocked subtasks back to pending before a rerun.
    async fn reopen_blocked(&self, task_id: Uuid) -> DomainResult<()> {
        let blocked: Vec<Uuid> = self
            .subtasks
            .list_for_task(task_id)
            .await?
            .into_iter()
            .filter(|s| s.status == SubtaskStatus::Blocked && s.delegated_task_id.is_none())
            .map(|s| s.id)
            .collect();
        if !blocked.is_empty() {
            let written = self
                .subtasks
                .set_status_many(&blocked, SubtaskStatus::Pending, None)
                .await?;
            self.emit_subtasks(&written);
        }
        Ok(())
    }
}
