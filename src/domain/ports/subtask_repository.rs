//! Subtask repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Subtask, SubtaskStatus};

/// Repository interface for Subtask persistence.
#[async_trait]
pub trait SubtaskRepository: Send + Sync {
    async fn create(&self, subtask: &Subtask) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Subtask>>;

    async fn update(&self, subtask: &Subtask) -> DomainResult<()>;

    /// Subtasks of a task in creation order.
    async fn list_for_task(&self, task_id: Uuid) -> DomainResult<Vec<Subtask>>;

    /// Subtasks executed by a delegated child task.
    async fn list_by_delegated_task(&self, delegated_task_id: Uuid) -> DomainResult<Vec<Subtask>>;

    /// Link subtasks to their child task and mark them in progress, in one transaction.
    async fn link_delegated(&self, ids: &[Uuid], delegated_task_id: Uuid) -> DomainResult<()>;

    /// Write one status to many subtasks in one transaction.
    ///
    /// Done subtasks are never re-opened. Returns the rows as written.
    async fn set_status_many(
        &self,
        ids: &[Uuid],
        status: SubtaskStatus,
        blocked_reason: Option<&str>,
    ) -> DomainResult<Vec<Subtask>>;

    /// Number of subtasks of a task that are not done.
    async fn count_remaining(&self, task_id: Uuid) -> DomainResult<u64>;
}
