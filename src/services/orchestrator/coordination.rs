//! Sequential cross-department coordination.
//!
//! A parent walks its department queue one department at a time. Each step
//! hands the parent's work to that department's lead as a child task and
//! waits for the child's exit before advancing. The queue is persisted on the
//! parent; the position in it never is. It is always re-derived from which
//! departments already have a finished child, so a restart resumes at the
//! first department still owed work.

use uuid::Uuid;

use super::Orchestrator;
use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AfterCoordination, CoordinationState, Task, TaskMetadata, TaskStatus,
};
use crate::services::notices::Notice;
use crate::services::registry::CoordinationHook;

impl Orchestrator {
    /// Persist a department queue on `parent_id` and run its first step.
    pub async fn start_coordination(
        &self,
        parent_id: Uuid,
        department_queue: Vec<String>,
        after: AfterCoordination,
    ) -> DomainResult<()> {
        let mut parent = self.load_task(parent_id).await?;
        parent.coordination = Some(CoordinationState::new(department_queue.clone(), after));
        if after == AfterCoordination::RunParent {
            Self::transition(&mut parent, TaskStatus::Collaborating)?;
        }
        self.save_task(&parent).await?;
        self.log_system(
            parent.id,
            &format!("Coordinating with: {}", department_queue.join(", ")),
        )
        .await;
        tracing::info!(parent_id = %parent.id, queue = ?department_queue, "coordination started");

        self.coordination_step(parent.id, 0, false).await
    }

    /// Advance a coordination from `from_index`.
    ///
    /// With `rerun_stalled`, a child that failed or was paused is started again;
    /// otherwise the coordination stays halted on it.
    pub(super) async fn coordination_step(
        &self,
        parent_id: Uuid,
        from_index: usize,
        rerun_stalled: bool,
    ) -> DomainResult<()> {
        let mut index = from_index;
        loop {
            let parent = self.load_task(parent_id).await?;
            let Some(state) = parent.coordination.clone() else {
                return Ok(());
            };
            if parent.is_terminal() {
                return Ok(());
            }
            if let Some(mode) = self.stop_requested(&parent).await {
                tracing::info!(parent_id = %parent_id, mode = mode.as_str(), "coordination held by stop request");
                return Ok(());
            }
            let Some(department_id) = state.department_queue.get(index).cloned() else {
                return self.finish_coordination(parent, state.after).await;
            };

            let children: Vec<Task> = self
                .tasks
                .children_of(parent.id)
                .await?
                .into_iter()
                .filter(|c| {
                    c.department_id.as_deref() == Some(department_id.as_str())
                        && c.metadata.checklist.is_empty()
                })
                .collect();

            if children
                .iter()
                .any(|c| matches!(c.status, TaskStatus::Done | TaskStatus::Review))
            {
                index += 1;
                continue;
            }

            if let Some(child) = children.iter().find(|c| c.status != TaskStatus::Cancelled) {
                self.registry
                    .set_hook(child.id, CoordinationHook { parent_id, index })
                    .await;
                if child.status == TaskStatus::InProgress {
                    tracing::debug!(child_id = %child.id, "coordination waiting on running child");
                    return Ok(());
                }
                if !rerun_stalled {
                    tracing::info!(child_id = %child.id, status = %child.status, "coordination halted");
                    return Ok(());
                }
                let agent_id = self.executor_for(child).await?;
                if let Err(e) = self.run_task(child.id, agent_id).await {
                    self.defer_refused(child.id, e).await?;
                }
                return Ok(());
            }

            let department_name = self.department_name(&department_id).await;
            let Some(lead) = self.directory.leader_of(&department_id).await? else {
                tracing::warn!(parent_id = %parent_id, department = %department_id, "no lead; department skipped");
                self.log_system(parent_id, &format!("Skipped {department_id}: no team leader"))
                    .await;
                self.notify_task(
                    &parent,
                    Notice::DepartmentSkipped {
                        department: &department_name,
                    },
                )
                .await;
                index += 1;
                continue;
            };

            Self::pace(self.settings.orchestrator.ack_delay_ms).await;
            self.notify_task(
                &parent,
                Notice::CrossDepartmentAck {
                    department: &department_name,
                    title: &parent.title,
                },
            )
            .await;

            let executor = self.directory.pick_executor(&lead).await?;
            let mut child = Task::with_title(
                format!("[{department_name}] {}", parent.title),
                parent.description.clone(),
            )
            .with_department(department_id.clone())
            .with_source(parent.id)
            .with_metadata(TaskMetadata {
                project: parent.metadata.project.clone(),
                round_goal: parent.metadata.round_goal.clone(),
                requested_by: parent.metadata.requested_by.clone(),
                checklist: Vec::new(),
                skip_planned_meeting: true,
                locale: parent.metadata.locale,
            });
            child.project_id = parent.project_id.clone();
            child.project_path = parent.project_path.clone();
            child.assigned_agent_id = Some(executor.id);

            self.tasks.create(&child).await?;
            self.audit_creation(&child, "cross_department", Some(department_id.clone()), Some(lead.id))
                .await;
            self.emit_task(&child);
            tracing::info!(
                parent_id = %parent_id,
                child_id = %child.id,
                department = %department_id,
                index,
                "cross-department child created"
            );

            self.registry
                .set_hook(child.id, CoordinationHook { parent_id, index })
                .await;
            if let Err(e) = self.run_task(child.id, executor.id).await {
                self.defer_refused(child.id, e).await?;
            }
            return Ok(());
        }
    }

    /// Every department reported back: clear the queue and run the follow-up.
    async fn finish_coordination(
        &self,
        mut parent: Task,
        after: AfterCoordination,
    ) -> DomainResult<()> {
        parent.coordination = None;
        self.save_task(&parent).await?;
        self.log_system(parent.id, "Coordination complete").await;
        tracing::info!(parent_id = %parent.id, after = ?after, "coordination complete");

        match after {
            AfterCoordination::RunParent => {
                let agent_id = self.executor_for(&parent).await?;
                if let Err(e) = self.run_task(parent.id, agent_id).await {
                    self.defer_refused(parent.id, e).await?;
                }
                Ok(())
            }
            AfterCoordination::FinalizeReview => self.finalize_review(parent.id).await,
        }
    }

    /// Resume every persisted coordination. Returns how many were resumed.
    pub async fn resume_coordinations(&self) -> DomainResult<usize> {
        let mut resumed = 0;
        for parent in self.tasks.list_coordinating().await? {
            if parent.is_terminal() {
                continue;
            }
            if let Err(e) = self.coordination_step(parent.id, 0, false).await {
                tracing::warn!(parent_id = %parent.id, error = %e, "failed to resume coordination");
                continue;
            }
            resumed += 1;
        }
        Ok(resumed)
    }
}
