//! Subtask state re-derived from delegated child tasks.

use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

use super::Orchestrator;
use crate::domain::errors::DomainResult;
use crate::domain::models::{SubtaskStatus, TaskStatus};
use crate::domain::ports::TaskFilter;

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Parents inspected.
    pub parents: usize,
    /// Subtasks re-linked to an existing child.
    pub linked: usize,
    /// Subtasks whose status changed.
    pub updated: usize,
}

impl ReconcileReport {
    fn absorb(&mut self, other: Self) {
        self.parents += other.parents;
        self.linked += other.linked;
        self.updated += other.updated;
    }
}

impl Orchestrator {
    /// Bring `parent_id`'s subtasks in line with its child tasks. Idempotent.
    pub async fn reconcile(&self, parent_id: Uuid) -> DomainResult<ReconcileReport> {
        let mut report = ReconcileReport {
            parents: 1,
            ..Default::default()
        };
        let children = self.tasks.children_of(parent_id).await?;
        if children.is_empty() {
            return Ok(report);
        }
        let mut subtasks = self.subtasks.list_for_task(parent_id).await?;

        for child in &children {
            let mut targets: Vec<usize> = subtasks
                .iter()
                .enumerate()
                .filter(|(_, s)| s.delegated_task_id == Some(child.id))
                .map(|(i, _)| i)
                .collect();

            if targets.is_empty() {
                let unlinked = subtasks.iter().position(|s| {
                    s.delegated_task_id.is_none()
                        && s.status != SubtaskStatus::Done
                        && s.target_department_id.is_some()
                        && s.target_department_id == child.department_id
                });
                let Some(i) = unlinked else {
                    continue;
                };
                subtasks[i].delegated_task_id = Some(child.id);
                self.subtasks.update(&subtasks[i]).await?;
                tracing::info!(subtask_id = %subtasks[i].id, child_id = %child.id, "subtask re-linked to child");
                report.linked += 1;
                targets.push(i);
            }

            let status = SubtaskStatus::from_child_status(child.status);
            for i in targets {
                let subtask = &mut subtasks[i];
                if subtask.status == status {
                    continue;
                }
                let reason =
                    (status == SubtaskStatus::Blocked).then(|| blocked_reason(child.status));
                if subtask.apply_status(status, reason) {
                    self.subtasks.update(subtask).await?;
                    self.emit_subtasks(std::slice::from_ref(subtask));
                    report.updated += 1;
                }
            }
        }

        if report.linked + report.updated > 0 {
            tracing::debug!(parent_id = %parent_id, linked = report.linked, updated = report.updated, "reconciled");
        }
        Ok(report)
    }

    /// Reconcile every task that has delegated children.
    pub async fn reconcile_all(&self) -> DomainResult<ReconcileReport> {
        let parents: BTreeSet<Uuid> = self
            .tasks
            .list(TaskFilter::default())
            .await?
            .into_iter()
            .filter_map(|t| t.source_task_id)
            .collect();

        let mut report = ReconcileReport::default();
        for parent_id in parents {
            match self.reconcile(parent_id).await {
                Ok(r) => report.absorb(r),
                Err(e) => tracing::warn!(parent_id = %parent_id, error = %e, "reconcile failed"),
            }
        }
        tracing::info!(
            parents = report.parents,
            linked = report.linked,
            updated = report.updated,
            "reconciliation complete"
        );
        Ok(report)
    }
}

fn blocked_reason(child_status: TaskStatus) -> String {
    match child_status {
        TaskStatus::Cancelled => "delegated task cancelled".to_string(),
        other => format!("delegated task returned to {other}"),
    }
}
