//! Batched delegation of foreign subtasks.
//!
//! Pending subtasks that target another department are grouped per target
//! department. Each group runs as a single child task carrying the whole
//! ordered checklist, and the child's single exit code finalizes every
//! subtask of the group together. Groups run one at a time per parent.

use std::collections::HashMap;
use uuid::Uuid;

use super::prompt::batch_description;
use super::Orchestrator;
use crate::domain::errors::DomainResult;
use crate::domain::models::{
    execution_order, Agent, ChecklistItem, Subtask, SubtaskStatus, Task, TaskMetadata, TaskStatus,
};
use crate::services::notices::Notice;
use crate::services::registry::BatchCorrelation;

impl Orchestrator {
    /// Dispatch the next group of `parent_id`'s foreign pending subtasks.
    ///
    /// Re-entrant calls for the same parent are ignored while one is in flight.
    pub async fn dispatch_next_batch(&self, parent_id: Uuid) -> DomainResult<()> {
        if !self.registry.begin_dispatch(parent_id).await {
            tracing::debug!(parent_id = %parent_id, "batch dispatch already in flight");
            return Ok(());
        }
        let prepared = self.prepare_next_group(parent_id).await;
        self.registry.end_dispatch(parent_id).await;

        let Some((child_id, executor_id)) = prepared? else {
            return Ok(());
        };
        if let Err(e) = self.run_task(child_id, executor_id).await {
            self.defer_refused(child_id, e).await?;
        }
        Ok(())
    }

    /// Pick the next group, create its child and link the subtasks to it.
    async fn prepare_next_group(&self, parent_id: Uuid) -> DomainResult<Option<(Uuid, Uuid)>> {
        let parent = self.load_task(parent_id).await?;
        if parent.is_terminal() || self.stop_requested(&parent).await.is_some() {
            return Ok(None);
        }

        let subtasks = self.subtasks.list_for_task(parent.id).await?;

        // One group at a time.
        if subtasks
            .iter()
            .any(|s| s.delegated_task_id.is_some() && s.status == SubtaskStatus::InProgress)
        {
            tracing::debug!(parent_id = %parent_id, "batch group still running");
            return Ok(None);
        }

        let department = parent.department_id.as_deref();
        let mut groups: Vec<(String, Vec<Subtask>)> = Vec::new();
        for subtask in subtasks.into_iter().filter(|s| s.is_delegable(department)) {
            let Some(target) = subtask.target_department_id.clone() else {
                continue;
            };
            match groups.iter_mut().find(|(id, _)| *id == target) {
                Some((_, group)) => group.push(subtask),
                None => groups.push((target, vec![subtask])),
            }
        }
        if groups.is_empty() {
            return Ok(None);
        }

        let sort_orders: HashMap<String, i64> = self
            .directory
            .departments()
            .await?
            .into_iter()
            .map(|d| (d.id, d.sort_order))
            .collect();
        groups.sort_by(|(a, _), (b, _)| {
            execution_order(a, sort_orders.get(a).copied(), b, sort_orders.get(b).copied())
        });

        for (department_id, group) in groups {
            let Some(lead) = self.directory.leader_of(&department_id).await? else {
                let ids: Vec<Uuid> = group.iter().map(|s| s.id).collect();
                let reason = format!("no team leader in {department_id}");
                tracing::warn!(parent_id = %parent_id, department = %department_id, "batch group blocked");
                let written = self
                    .subtasks
                    .set_status_many(&ids, SubtaskStatus::Blocked, Some(&reason))
                    .await?;
                self.emit_subtasks(&written);
                continue;
            };

            return self.launch_group(&parent, &department_id, &lead, group).await.map(Some);
        }
        Ok(None)
    }

    async fn launch_group(
        &self,
        parent: &Task,
        department_id: &str,
        lead: &Agent,
        group: Vec<Subtask>,
    ) -> DomainResult<(Uuid, Uuid)> {
        let department_name = self.department_name(department_id).await;
        let checklist: Vec<ChecklistItem> = group
            .iter()
            .map(|s| ChecklistItem {
                subtask_id: s.id,
                title: s.title.clone(),
                description: s.description.clone(),
            })
            .collect();
        let ids: Vec<Uuid> = group.iter().map(|s| s.id).collect();

        let executor = self.directory.pick_executor(lead).await?;
        let mut child = Task::with_title(
            format!("[{department_name}] {}", parent.title),
            batch_description(parent, &department_name, &checklist),
        )
        .with_department(department_id.to_string())
        .with_source(parent.id)
        .with_metadata(TaskMetadata {
            project: parent.metadata.project.clone(),
            round_goal: parent.metadata.round_goal.clone(),
            requested_by: parent.metadata.requested_by.clone(),
            checklist,
            skip_planned_meeting: true,
            locale: parent.metadata.locale,
        });
        child.project_id = parent.project_id.clone();
        child.project_path = parent.project_path.clone();
        child.assigned_agent_id = Some(executor.id);

        self.tasks.create(&child).await?;
        self.audit_creation(
            &child,
            "subtask_batch",
            Some(format!("{} subtasks for {department_id}", ids.len())),
            Some(lead.id),
        )
        .await;
        self.emit_task(&child);

        self.subtasks.link_delegated(&ids, child.id).await?;
        let linked = self.subtasks.list_by_delegated_task(child.id).await?;
        self.emit_subtasks(&linked);

        self.registry
            .insert_batch(BatchCorrelation {
                parent_id: parent.id,
                child_id: child.id,
                first_subtask_id: ids[0],
                subtask_ids: ids.clone(),
            })
            .await;
        tracing::info!(
            parent_id = %parent.id,
            child_id = %child.id,
            department = %department_id,
            subtasks = ids.len(),
            "batch group dispatched"
        );

        Self::pace(self.settings.orchestrator.ack_delay_ms).await;
        self.notify_task(
            parent,
            Notice::CrossDepartmentAck {
                department: &department_name,
                title: &parent.title,
            },
        )
        .await;

        Ok((child.id, executor.id))
    }

    /// Registry key of a batch child: the first subtask on its checklist.
    fn batch_key(child: &Task) -> Option<Uuid> {
        child.metadata.checklist.first().map(|item| item.subtask_id)
    }

    pub(super) async fn has_batch(&self, child: &Task) -> bool {
        match Self::batch_key(child) {
            Some(key) => self.registry.batch(key, child.id).await.is_some(),
            None => false,
        }
    }

    pub(super) async fn take_batch_of(&self, child: &Task) -> Option<BatchCorrelation> {
        let key = Self::batch_key(child)?;
        self.registry.take_batch(key, child.id).await
    }

    /// Finalize a batch child from its exit code.
    ///
    /// Every correlated subtask gets the same outcome in one transaction. After
    /// a restart the correlation is gone and the group is re-derived from the
    /// subtasks' delegated task id.
    pub(super) async fn finalize_batch(&self, child: &Task, exit_code: i32) -> DomainResult<()> {
        let (parent_id, subtask_ids) = match self.take_batch_of(child).await {
            Some(batch) => (Some(batch.parent_id), batch.subtask_ids),
            None => {
                let linked = self.subtasks.list_by_delegated_task(child.id).await?;
                let parent_id = child
                    .source_task_id
                    .or_else(|| linked.first().map(|s| s.task_id));
                (parent_id, linked.into_iter().map(|s| s.id).collect())
            }
        };

        let child_status = if exit_code == 0 {
            TaskStatus::Done
        } else {
            TaskStatus::Inbox
        };
        let child = self.set_task_status(child.id, child_status).await?;
        self.release_executor(child.id).await;

        let written = if exit_code == 0 {
            self.subtasks
                .set_status_many(&subtask_ids, SubtaskStatus::Done, None)
                .await?
        } else {
            let reason = format!("exit code {exit_code}");
            self.subtasks
                .set_status_many(&subtask_ids, SubtaskStatus::Blocked, Some(&reason))
                .await?
        };
        self.emit_subtasks(&written);
        tracing::info!(
            child_id = %child.id,
            exit_code,
            subtasks = subtask_ids.len(),
            "batch group finalized"
        );

        if exit_code != 0 {
            self.notify_task(
                &child,
                Notice::TaskFailed {
                    title: &child.title,
                    exit_code,
                },
            )
            .await;
        }

        let Some(parent_id) = parent_id else {
            return Ok(());
        };

        if exit_code == 0 && self.subtasks.count_remaining(parent_id).await? == 0 {
            let parent = self.load_task(parent_id).await?;
            if self.registry.mark_notice_sent(parent_id).await {
                self.notify_task(&parent, Notice::AllSubtasksComplete { title: &parent.title })
                    .await;
            }
            if parent.status == TaskStatus::Review {
                return self.finalize_review(parent_id).await;
            }
            return Ok(());
        }

        self.dispatch_next_batch(parent_id).await
    }
}
