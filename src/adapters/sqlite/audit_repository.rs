//! SQLite audit sink for task creations.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::parse_optional_uuid;
use crate::domain::errors::DomainResult;
use crate::domain::ports::{AuditSink, CreationAudit};

#[derive(Clone)]
pub struct SqliteAuditRepository {
    pool: SqlitePool,
}

impl SqliteAuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creation records for a task, oldest first.
    pub async fn for_task(&self, task_id: Uuid) -> DomainResult<Vec<CreationAudit>> {
        let rows: Vec<(String, Option<String>, Option<String>, String)> = sqlx::query_as(
            r#"SELECT trigger, trigger_detail, actor_id, body FROM task_creation_audits
               WHERE task_id = ? ORDER BY id"#,
        )
        .bind(task_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(trigger, trigger_detail, actor_id, body)| {
                Ok(CreationAudit {
                    task_id,
                    trigger,
                    trigger_detail,
                    actor_id: parse_optional_uuid(actor_id)?,
                    body,
                })
            })
            .collect()
    }
}

#[async_trait]
impl AuditSink for SqliteAuditRepository {
    async fn record_creation(&self, audit: &CreationAudit) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO task_creation_audits (task_id, trigger, trigger_detail, actor_id, body,
               created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(audit.task_id.to_string())
        .bind(&audit.trigger)
        .bind(&audit.trigger_detail)
        .bind(audit.actor_id.map(|id| id.to_string()))
        .bind(&audit.body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    #[tokio::test]
    async fn test_record_and_read_back() {
        let repo = SqliteAuditRepository::new(create_migrated_test_pool().await.unwrap());
        let task_id = Uuid::new_v4();
        let audit = CreationAudit {
            task_id,
            trigger: "directive".to_string(),
            trigger_detail: Some("dev".to_string()),
            actor_id: None,
            body: "Fix the login page".to_string(),
        };

        repo.record_creation(&audit).await.unwrap();
        assert_eq!(repo.for_task(task_id).await.unwrap(), vec![audit]);
    }
}
