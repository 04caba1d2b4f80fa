//! Task domain model.
//!
//! Tasks are the declared units of work. A task is executed by at most one
//! worker process at a time; delegation spawns child tasks linked back
//! through `source_task_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::directive::Locale;

/// Status of a task in the work pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Received but not yet planned or assigned. Also the failure/reset state.
    #[default]
    Inbox,
    /// Planning phase before final assignment.
    Planned,
    /// Waiting on other departments.
    Collaborating,
    /// A worker is (or should be) running.
    InProgress,
    /// Paused by an operator; expected to resume.
    Pending,
    /// Worker finished; awaiting review finalization.
    Review,
    /// Completed.
    Done,
    /// Cancelled by an operator.
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Planned => "planned",
            Self::Collaborating => "collaborating",
            Self::InProgress => "in_progress",
            Self::Pending => "pending",
            Self::Review => "review",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "inbox" => Some(Self::Inbox),
            "planned" => Some(Self::Planned),
            "collaborating" => Some(Self::Collaborating),
            "in_progress" | "in-progress" => Some(Self::InProgress),
            "pending" => Some(Self::Pending),
            "review" => Some(Self::Review),
            "done" => Some(Self::Done),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<TaskStatus> {
        match self {
            Self::Inbox => vec![
                Self::Planned,
                Self::Collaborating,
                Self::InProgress,
                Self::Cancelled,
            ],
            Self::Planned => vec![
                Self::Collaborating,
                Self::InProgress,
                Self::Pending,
                Self::Inbox,
                Self::Cancelled,
            ],
            Self::Collaborating => vec![
                Self::Planned,
                Self::InProgress,
                Self::Pending,
                Self::Inbox,
                Self::Cancelled,
            ],
            Self::InProgress => vec![
                Self::Review,
                Self::Done,
                Self::Pending,
                Self::Inbox,
                Self::Cancelled,
            ],
            Self::Pending => vec![
                Self::Planned,
                Self::Collaborating,
                Self::InProgress,
                Self::Inbox,
                Self::Cancelled,
            ],
            Self::Review => vec![Self::Done, Self::InProgress, Self::Inbox, Self::Cancelled],
            Self::Done | Self::Cancelled => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of a delegated checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub subtask_id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Structured metadata attached to a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Project name the work belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Goal for the current round of work.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_goal: Option<String>,
    /// Operator who issued the originating directive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
    /// Ordered checklist for batched subtask runs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checklist: Vec<ChecklistItem>,
    /// Planning phase should skip the planned meeting.
    #[serde(default)]
    pub skip_planned_meeting: bool,
    /// Language of the originating operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<Locale>,
}

/// What a parent task does once every department in its queue has reported back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AfterCoordination {
    /// Dispatch the parent to its own executor.
    #[default]
    RunParent,
    /// Run review finalization on the parent.
    FinalizeReview,
}

/// Persisted progress of a cross-department coordination run.
///
/// Only the queue and the follow-up are persisted; the current index is
/// always re-derived from the children's statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinationState {
    pub department_queue: Vec<String>,
    #[serde(default)]
    pub after: AfterCoordination,
    pub started_at: DateTime<Utc>,
}

impl CoordinationState {
    pub fn new(department_queue: Vec<String>, after: AfterCoordination) -> Self {
        Self {
            department_queue,
            after,
            started_at: Utc::now(),
        }
    }
}

/// A declared unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub department_id: Option<String>,
    pub assigned_agent_id: Option<Uuid>,
    pub project_id: Option<String>,
    pub project_path: Option<String>,
    /// Task that spawned this one through delegation.
    pub source_task_id: Option<Uuid>,
    pub status: TaskStatus,
    pub metadata: TaskMetadata,
    /// Coordination progress when this task is the parent of a cross-department run.
    pub coordination: Option<CoordinationState>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new task from a directive. Title is auto-generated.
    pub fn new(directive: impl Into<String>) -> Self {
        let description = directive.into();
        let title = generate_title(&description);
        Self::with_title(title, description)
    }

    /// Create a new task with an explicit title and description.
    pub fn with_title(title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            department_id: None,
            assigned_agent_id: None,
            project_id: None,
            project_path: None,
            source_task_id: None,
            status: TaskStatus::default(),
            metadata: TaskMetadata::default(),
            coordination: None,
            created_at: now,
            started_at: None,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Set the owning department.
    pub fn with_department(mut self, department_id: impl Into<String>) -> Self {
        self.department_id = Some(department_id.into());
        self
    }

    /// Link this task to the task that delegated it.
    pub fn with_source(mut self, source_task_id: Uuid) -> Self {
        self.source_task_id = Some(source_task_id);
        self
    }

    /// Replace the metadata.
    pub fn with_metadata(mut self, metadata: TaskMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Most recent of created, started and updated timestamps.
    pub fn last_touched_at(&self) -> DateTime<Utc> {
        let mut latest = self.created_at.max(self.updated_at);
        if let Some(started) = self.started_at {
            latest = latest.max(started);
        }
        latest
    }

    /// Whether this task was spawned by delegation.
    pub fn is_delegated(&self) -> bool {
        self.source_task_id.is_some()
    }

    /// Check if can transition to given status.
    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to new status, maintaining timestamps.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }

        let now = Utc::now();
        self.status = new_status;
        self.updated_at = now;

        match new_status {
            TaskStatus::InProgress => {
                self.started_at = Some(now);
                self.completed_at = None;
            }
            TaskStatus::Done | TaskStatus::Cancelled => self.completed_at = Some(now),
            _ => {}
        }

        Ok(())
    }

    /// Check if task is terminal.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Validate task.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Task title cannot be empty".to_string());
        }
        if self.source_task_id == Some(self.id) {
            return Err("Task cannot be its own source".to_string());
        }
        Ok(())
    }
}

/// Generate a short title from a directive.
/// Takes the first line, truncates at ~80 chars on a char boundary.
fn generate_title(directive: &str) -> String {
    let first_line = directive.lines().next().unwrap_or(directive).trim();
    if first_line.is_empty() {
        return "Untitled task".to_string();
    }
    let max_chars = 80;
    if first_line.chars().count() <= max_chars {
        return first_line.to_string();
    }
    let truncated: String = first_line.chars().take(max_chars).collect();
    match truncated.rfind(' ') {
        Some(pos) if pos > 0 => format!("{}...", &truncated[..pos]),
        _ => format!("{truncated}..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_creation_from_directive() {
        let task = Task::new("Implement the login feature");
        assert_eq!(task.title, "Implement the login feature");
        assert_eq!(task.status, TaskStatus::Inbox);
        assert!(task.coordination.is_none());
    }

    #[test]
    fn test_generate_title() {
        assert_eq!(generate_title("Short prompt"), "Short prompt");
        assert_eq!(generate_title("First line\nSecond line"), "First line");
        assert_eq!(generate_title("   "), "Untitled task");

        let long = "This is a very long directive that exceeds eighty characters and should be truncated at a word boundary";
        let title = generate_title(long);
        assert!(title.ends_with("..."));
        assert!(title.chars().count() <= 83);

        // Multi-byte text must not split a character.
        let korean = "가".repeat(100);
        assert!(generate_title(&korean).ends_with("..."));
    }

    #[test]
    fn test_status_roundtrip_and_aliases() {
        for status in [
            TaskStatus::Inbox,
            TaskStatus::Planned,
            TaskStatus::Collaborating,
            TaskStatus::InProgress,
            TaskStatus::Pending,
            TaskStatus::Review,
            TaskStatus::Done,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::from_str("canceled"), Some(TaskStatus::Cancelled));
        assert_eq!(TaskStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut task = Task::new("Ship it");
        task.transition_to(TaskStatus::Planned).unwrap();
        task.transition_to(TaskStatus::InProgress).unwrap();
        assert!(task.started_at.is_some());
        task.transition_to(TaskStatus::Review).unwrap();
        task.transition_to(TaskStatus::Done).unwrap();
        assert!(task.completed_at.is_some());
        assert!(task.is_terminal());
    }

    #[test]
    fn test_cancel_reachable_from_every_non_terminal_state() {
        for status in [
            TaskStatus::Inbox,
            TaskStatus::Planned,
            TaskStatus::Collaborating,
            TaskStatus::InProgress,
            TaskStatus::Pending,
            TaskStatus::Review,
        ] {
            assert!(status.can_transition_to(TaskStatus::Cancelled), "{status}");
        }
        assert!(!TaskStatus::Done.can_transition_to(TaskStatus::Cancelled));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut task = Task::new("x");
        task.status = TaskStatus::Done;
        assert!(task.transition_to(TaskStatus::InProgress).is_err());
        assert!(TaskStatus::Cancelled.valid_transitions().is_empty());
    }

    #[test]
    fn test_last_touched_at_prefers_latest() {
        let mut task = Task::new("x");
        let later = task.created_at + chrono::Duration::minutes(5);
        task.started_at = Some(later);
        assert_eq!(task.last_touched_at(), later);
    }

    #[test]
    fn test_metadata_serializes_compactly() {
        let json = serde_json::to_string(&TaskMetadata::default()).unwrap();
        assert_eq!(json, r#"{"skip_planned_meeting":false}"#);
    }
}
