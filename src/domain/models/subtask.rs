//! Subtask domain model.
//!
//! Subtasks are checklist items scoped to one task. A subtask targeting a
//! department other than its parent's is "foreign" and can be delegated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::TaskStatus;

/// Status of a subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    #[default]
    Pending,
    InProgress,
    Blocked,
    Done,
}

impl SubtaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Done => "done",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" | "in-progress" => Some(Self::InProgress),
            "blocked" => Some(Self::Blocked),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    /// Derive a delegated subtask's status from its child task's status.
    ///
    /// `review` counts as checkpoint-complete: a later consolidation pass may
    /// still revisit the child even though the subtask reads `done`.
    pub fn from_child_status(child: TaskStatus) -> Self {
        match child {
            TaskStatus::Done | TaskStatus::Review => Self::Done,
            TaskStatus::InProgress
            | TaskStatus::Collaborating
            | TaskStatus::Planned
            | TaskStatus::Pending => Self::InProgress,
            TaskStatus::Inbox | TaskStatus::Cancelled => Self::Blocked,
        }
    }
}

impl std::fmt::Display for SubtaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A checklist item of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: Uuid,
    pub task_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: SubtaskStatus,
    pub target_department_id: Option<String>,
    /// Child task created to execute this subtask.
    pub delegated_task_id: Option<Uuid>,
    pub blocked_reason: Option<String>,
    /// Set on remediation subtasks; points at the done subtask being remediated.
    pub remediation_of: Option<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Subtask {
    pub fn new(task_id: Uuid, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            title: title.into(),
            description: None,
            status: SubtaskStatus::Pending,
            target_department_id: None,
            delegated_task_id: None,
            blocked_reason: None,
            remediation_of: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn targeting(mut self, department_id: impl Into<String>) -> Self {
        self.target_department_id = Some(department_id.into());
        self
    }

    /// Whether this subtask targets a department other than `parent_department`.
    pub fn is_foreign_to(&self, parent_department: Option<&str>) -> bool {
        match (self.target_department_id.as_deref(), parent_department) {
            (Some(target), Some(parent)) => target != parent,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Whether the batched delegator may pick this subtask up.
    pub fn is_delegable(&self, parent_department: Option<&str>) -> bool {
        self.status == SubtaskStatus::Pending
            && self.delegated_task_id.is_none()
            && self.is_foreign_to(parent_department)
    }

    /// Apply a status, maintaining completion bookkeeping.
    ///
    /// A done subtask is never re-opened; returns false when the write is refused.
    pub fn apply_status(&mut self, status: SubtaskStatus, blocked_reason: Option<String>) -> bool {
        if self.status == SubtaskStatus::Done && status != SubtaskStatus::Done {
            return false;
        }
        self.status = status;
        match status {
            SubtaskStatus::Done => {
                if self.completed_at.is_none() {
                    self.completed_at = Some(Utc::now());
                }
                self.blocked_reason = None;
            }
            SubtaskStatus::Blocked => self.blocked_reason = blocked_reason,
            SubtaskStatus::Pending | SubtaskStatus::InProgress => self.blocked_reason = None,
        }
        true
    }
}
