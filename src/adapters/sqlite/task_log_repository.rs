//! SQLite implementation of the TaskLogRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_datetime, parse_optional_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{LogKind, TaskLog};
use crate::domain::ports::TaskLogRepository;

#[derive(Clone)]
pub struct SqliteTaskLogRepository {
    pool: SqlitePool,
}

impl SqliteTaskLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskLogRepository for SqliteTaskLogRepository {
    async fn append(&self, task_id: Uuid, kind: LogKind, message: &str) -> DomainResult<()> {
        sqlx::query("INSERT INTO task_logs (task_id, kind, message, created_at) VALUES (?, ?, ?, ?)")
            .bind(task_id.to_string())
            .bind(kind.as_str())
            .bind(message)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn recent(&self, task_id: Uuid, limit: i64) -> DomainResult<Vec<TaskLog>> {
        let rows: Vec<TaskLogRow> =
            sqlx::query_as("SELECT * FROM task_logs WHERE task_id = ? ORDER BY id DESC LIMIT ?")
                .bind(task_id.to_string())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TaskLog::try_from).collect()
    }

    async fn latest_run_marker(&self, task_id: Uuid) -> DomainResult<Option<TaskLog>> {
        let row: Option<TaskLogRow> = sqlx::query_as(
            r#"SELECT * FROM task_logs
               WHERE task_id = ? AND kind = 'system'
                 AND (message LIKE 'RUN %' OR message LIKE 'Agent spawn failed:%')
               ORDER BY id DESC LIMIT 1"#,
        )
        .bind(task_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TaskLog::try_from).transpose()
    }

    async fn latest_activity_at(&self, task_id: Uuid) -> DomainResult<Option<DateTime<Utc>>> {
        let (latest,): (Option<String>,) =
            sqlx::query_as("SELECT MAX(created_at) FROM task_logs WHERE task_id = ?")
                .bind(task_id.to_string())
                .fetch_one(&self.pool)
                .await?;
        parse_optional_datetime(latest)
    }
}

#[derive(sqlx::FromRow)]
struct TaskLogRow {
    id: i64,
    task_id: String,
    kind: String,
    message: String,
    created_at: String,
}

impl TryFrom<TaskLogRow> for TaskLog {
    type Error = DomainError;

    fn try_from(row: TaskLogRow) -> Result<Self, Self::Error> {
        let kind = LogKind::from_str(&row.kind).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid log kind: {}", row.kind))
        })?;

        Ok(TaskLog {
            id: row.id,
            task_id: parse_uuid(&row.task_id)?,
            kind,
            message: row.message,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}
