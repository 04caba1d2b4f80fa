//! SQLite implementation of the SubtaskRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_datetime, parse_optional_datetime, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Subtask, SubtaskStatus};
use crate::domain::ports::SubtaskRepository;

#[derive(Clone)]
pub struct SqliteSubtaskRepository {
    pool: SqlitePool,
}

impl SqliteSubtaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubtaskRepository for SqliteSubtaskRepository {
    async fn create(&self, subtask: &Subtask) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO subtasks (id, task_id, title, description, status,
               target_department_id, delegated_task_id, blocked_reason, remediation_of,
               completed_at, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(subtask.id.to_string())
        .bind(subtask.task_id.to_string())
        .bind(&subtask.title)
        .bind(&subtask.description)
        .bind(subtask.status.as_str())
        .bind(&subtask.target_department_id)
        .bind(subtask.delegated_task_id.map(|id| id.to_string()))
        .bind(&subtask.blocked_reason)
        .bind(subtask.remediation_of.map(|id| id.to_string()))
        .bind(subtask.completed_at.map(|t| t.to_rfc3339()))
        .bind(subtask.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Subtask>> {
        let row: Option<SubtaskRow> = sqlx::query_as("SELECT * FROM subtasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Subtask::try_from).transpose()
    }

    async fn update(&self, subtask: &Subtask) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE subtasks SET title = ?, description = ?, status = ?,
               target_department_id = ?, delegated_task_id = ?, blocked_reason = ?,
               remediation_of = ?, completed_at = ?
               WHERE id = ?"#,
        )
        .bind(&subtask.title)
        .bind(&subtask.description)
        .bind(subtask.status.as_str())
        .bind(&subtask.target_department_id)
        .bind(subtask.delegated_task_id.map(|id| id.to_string()))
        .bind(&subtask.blocked_reason)
        .bind(subtask.remediation_of.map(|id| id.to_string()))
        .bind(subtask.completed_at.map(|t| t.to_rfc3339()))
        .bind(subtask.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::SubtaskNotFound(subtask.id));
        }

        Ok(())
    }

    async fn list_for_task(&self, task_id: Uuid) -> DomainResult<Vec<Subtask>> {
        let rows: Vec<SubtaskRow> =
            sqlx::query_as("SELECT * FROM subtasks WHERE task_id = ? ORDER BY created_at, rowid")
                .bind(task_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Subtask::try_from).collect()
    }

    async fn list_by_delegated_task(&self, delegated_task_id: Uuid) -> DomainResult<Vec<Subtask>> {
        let rows: Vec<SubtaskRow> = sqlx::query_as(
            "SELECT * FROM subtasks WHERE delegated_task_id = ? ORDER BY created_at, rowid",
        )
        .bind(delegated_task_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Subtask::try_from).collect()
    }

    async fn link_delegated(&self, ids: &[Uuid], delegated_task_id: Uuid) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query(
                r#"UPDATE subtasks SET delegated_task_id = ?, status = 'in_progress',
                   blocked_reason = NULL
                   WHERE id = ? AND status != 'done'"#,
            )
            .bind(delegated_task_id.to_string())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn set_status_many(
        &self,
        ids: &[Uuid],
        status: SubtaskStatus,
        blocked_reason: Option<&str>,
    ) -> DomainResult<Vec<Subtask>> {
        let mut tx = self.pool.begin().await?;
        let mut written = Vec::with_capacity(ids.len());

        for id in ids {
            let row: Option<SubtaskRow> = sqlx::query_as("SELECT * FROM subtasks WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
            let Some(row) = row else {
                continue;
            };
            let mut subtask = Subtask::try_from(row)?;
            if !subtask.apply_status(status, blocked_reason.map(str::to_string)) {
                continue;
            }

            sqlx::query(
                "UPDATE subtasks SET status = ?, blocked_reason = ?, completed_at = ? WHERE id = ?",
            )
            .bind(subtask.status.as_str())
            .bind(&subtask.blocked_reason)
            .bind(subtask.completed_at.map(|t| t.to_rfc3339()))
            .bind(subtask.id.to_string())
            .execute(&mut *tx)
            .await?;
            written.push(subtask);
        }

        tx.commit().await?;
        tracing::debug!(
            count = written.len(),
            status = status.as_str(),
            "Subtask statuses written"
        );
        Ok(written)
    }

    async fn count_remaining(&self, task_id: Uuid) -> DomainResult<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM subtasks WHERE task_id = ? AND status != 'done'")
                .bind(task_id.to_string())
                .fetch_one(&self.pool)
                .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[derive(sqlx::FromRow)]
struct SubtaskRow {
    id: String,
    task_id: String,
    title: String,
    description: Option<String>,
    status: String,
    target_department_id: Option<String>,
    delegated_task_id: Option<String>,
    blocked_reason: Option<String>,
    remediation_of: Option<String>,
    completed_at: Option<String>,
    created_at: String,
}

impl TryFrom<SubtaskRow> for Subtask {
    type Error = DomainError;

    fn try_from(row: SubtaskRow) -> Result<Self, Self::Error> {
        let status = SubtaskStatus::from_str(&row.status).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid subtask status: {}", row.status))
        })?;

        Ok(Subtask {
            id: parse_uuid(&row.id)?,
            task_id: parse_uuid(&row.task_id)?,
            title: row.title,
            description: row.description,
            status,
            target_department_id: row.target_department_id,
            delegated_task_id: parse_optional_uuid(row.delegated_task_id)?,
            blocked_reason: row.blocked_reason,
            remediation_of: parse_optional_uuid(row.remediation_of)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteTaskRepository};
    use crate::domain::models::Task;
    use crate::domain::ports::TaskRepository;

    async fn setup() -> (SqliteSubtaskRepository, SqliteTaskRepository, Task) {
        let pool = create_migrated_test_pool().await.unwrap();
        let tasks = SqliteTaskRepository::new(pool.clone());
        let parent = Task::new("Parent").with_department("dev");
        tasks.create(&parent).await.unwrap();
        (SqliteSubtaskRepository::new(pool), tasks, parent)
    }

    #[tokio::test]
    async fn test_list_preserves_creation_order() {
        let (repo, _, parent) = setup().await;
        let first = Subtask::new(parent.id, "first");
        let second = Subtask::new(parent.id, "second");
        repo.create(&first).await.unwrap();
        repo.create(&second).await.unwrap();

        let listed = repo.list_for_task(parent.id).await.unwrap();
        let titles: Vec<_> = listed.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second"]);
        assert_eq!(repo.count_remaining(parent.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_link_and_finalize_batch() {
        let (repo, tasks, parent) = setup().await;
        let child = Task::new("Child").with_source(parent.id);
        tasks.create(&child).await.unwrap();

        let a = Subtask::new(parent.id, "a").targeting("design");
        let b = Subtask::new(parent.id, "b").targeting("design");
        repo.create(&a).await.unwrap();
        repo.create(&b).await.unwrap();

        repo.link_delegated(&[a.id, b.id], child.id).await.unwrap();
        let linked = repo.list_by_delegated_task(child.id).await.unwrap();
        assert_eq!(linked.len(), 2);
        assert!(linked.iter().all(|s| s.status == SubtaskStatus::InProgress));

        let written = repo
            .set_status_many(&[a.id, b.id], SubtaskStatus::Done, None)
            .await
            .unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(repo.count_remaining(parent.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_status_never_reopens_done() {
        let (repo, _, parent) = setup().await;
        let mut done = Subtask::new(parent.id, "finished");
        done.apply_status(SubtaskStatus::Done, None);
        let open = Subtask::new(parent.id, "open");
        repo.create(&done).await.unwrap();
        repo.create(&open).await.unwrap();

        let written = repo
            .set_status_many(&[done.id, open.id], SubtaskStatus::Blocked, Some("exit code 1"))
            .await
            .unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].id, open.id);

        let stored = repo.get(done.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubtaskStatus::Done);
        let blocked = repo.get(open.id).await.unwrap().unwrap();
        assert_eq!(blocked.blocked_reason.as_deref(), Some("exit code 1"));
    }
}
