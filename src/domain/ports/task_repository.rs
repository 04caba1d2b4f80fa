//! Task repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Task, TaskStatus};

/// Filter criteria for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub department_id: Option<String>,
    pub source_task_id: Option<Uuid>,
    pub assigned_agent_id: Option<Uuid>,
    pub limit: Option<i64>,
}

/// Repository interface for Task persistence.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert a new task.
    async fn create(&self, task: &Task) -> DomainResult<()>;

    /// Get a task by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>>;

    /// Update every column of an existing task.
    async fn update(&self, task: &Task) -> DomainResult<()>;

    /// Delete a task; child rows go with it.
    async fn delete(&self, id: Uuid) -> DomainResult<()>;

    /// List tasks with optional filters, oldest first.
    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<Task>>;

    /// List tasks in a status.
    async fn list_by_status(&self, status: TaskStatus) -> DomainResult<Vec<Task>>;

    /// Tasks spawned by delegation from `source_task_id`.
    async fn children_of(&self, source_task_id: Uuid) -> DomainResult<Vec<Task>>;

    /// Tasks carrying a persisted coordination state.
    async fn list_coordinating(&self) -> DomainResult<Vec<Task>>;
}
