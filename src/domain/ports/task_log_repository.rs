//! Task log repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{LogKind, TaskLog};

#[async_trait]
pub trait TaskLogRepository: Send + Sync {
    /// Append a line to a task's log.
    async fn append(&self, task_id: Uuid, kind: LogKind, message: &str) -> DomainResult<()>;

    /// Most recent lines, newest first.
    async fn recent(&self, task_id: Uuid, limit: i64) -> DomainResult<Vec<TaskLog>>;

    /// Most recent run marker line (`RUN ...` or `Agent spawn failed: ...`).
    async fn latest_run_marker(&self, task_id: Uuid) -> DomainResult<Option<TaskLog>>;

    /// Timestamp of the newest line of any kind.
    async fn latest_activity_at(&self, task_id: Uuid) -> DomainResult<Option<DateTime<Utc>>>;
}
