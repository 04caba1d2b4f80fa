//! SQLite directive receipts, keyed by idempotency key.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::DirectiveReceiptRepository;

#[derive(Clone)]
pub struct SqliteDirectiveReceiptRepository {
    pool: SqlitePool,
}

impl SqliteDirectiveReceiptRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DirectiveReceiptRepository for SqliteDirectiveReceiptRepository {
    async fn record(&self, key: &str) -> DomainResult<()> {
        let result = sqlx::query(
            r#"INSERT INTO directive_receipts (idempotency_key, received_at) VALUES (?, ?)
               ON CONFLICT(idempotency_key) DO NOTHING"#,
        )
        .bind(key)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let task_id: Option<String> = sqlx::query_scalar(
                "SELECT task_id FROM directive_receipts WHERE idempotency_key = ?",
            )
            .bind(key)
            .fetch_one(&self.pool)
            .await?;
            return Err(DomainError::DuplicateDirective {
                key: key.to_string(),
                task_id: task_id.and_then(|id| Uuid::parse_str(&id).ok()),
            });
        }
        Ok(())
    }

    async fn attach_task(&self, key: &str, task_id: Uuid) -> DomainResult<()> {
        sqlx::query("UPDATE directive_receipts SET task_id = ? WHERE idempotency_key = ?")
            .bind(task_id.to_string())
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn release(&self, key: &str) -> DomainResult<()> {
        sqlx::query(
            r#"DELETE FROM directive_receipts
               WHERE idempotency_key = ?
                 AND (task_id IS NULL OR task_id NOT IN (SELECT id FROM tasks))"#,
        )
        .bind(key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
