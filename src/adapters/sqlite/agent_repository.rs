//! SQLite implementation of the AgentRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::str::FromStr;
use uuid::Uuid;

use super::{parse_datetime, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Agent, AgentRole, AgentStatus};
use crate::domain::ports::{AgentFilter, AgentRepository};

#[derive(Clone)]
pub struct SqliteAgentRepository {
    pool: SqlitePool,
}

impl SqliteAgentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentRepository for SqliteAgentRepository {
    async fn create(&self, agent: &Agent) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO agents (id, name, role, department_id, status, current_task_id,
               provider, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(agent.id.to_string())
        .bind(&agent.name)
        .bind(agent.role.as_str())
        .bind(&agent.department_id)
        .bind(agent.status.as_str())
        .bind(agent.current_task_id.map(|id| id.to_string()))
        .bind(&agent.provider)
        .bind(agent.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Agent>> {
        let row: Option<AgentRow> = sqlx::query_as("SELECT * FROM agents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Agent::try_from).transpose()
    }

    async fn update(&self, agent: &Agent) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE agents SET name = ?, role = ?, department_id = ?, status = ?,
               current_task_id = ?, provider = ?
               WHERE id = ?"#,
        )
        .bind(&agent.name)
        .bind(agent.role.as_str())
        .bind(&agent.department_id)
        .bind(agent.status.as_str())
        .bind(agent.current_task_id.map(|id| id.to_string()))
        .bind(&agent.provider)
        .bind(agent.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::AgentNotFound(agent.id));
        }

        Ok(())
    }

    async fn list(&self, filter: AgentFilter) -> DomainResult<Vec<Agent>> {
        let mut query = String::from("SELECT * FROM agents WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(department_id) = &filter.department_id {
            query.push_str(" AND department_id = ?");
            bindings.push(department_id.clone());
        }
        if let Some(role) = &filter.role {
            query.push_str(" AND role = ?");
            bindings.push(role.as_str().to_string());
        }
        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }

        query.push_str(" ORDER BY department_id, name");

        let mut q = sqlx::query_as::<_, AgentRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<AgentRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(Agent::try_from).collect()
    }

    async fn holding_task(&self, task_id: Uuid) -> DomainResult<Vec<Agent>> {
        let rows: Vec<AgentRow> =
            sqlx::query_as("SELECT * FROM agents WHERE current_task_id = ? ORDER BY name")
                .bind(task_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Agent::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: String,
    name: String,
    role: String,
    department_id: String,
    status: String,
    current_task_id: Option<String>,
    provider: String,
    created_at: String,
}

impl TryFrom<AgentRow> for Agent {
    type Error = DomainError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        let role = AgentRole::from_str(&row.role)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let status = AgentStatus::from_str(&row.status)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;

        Ok(Agent {
            id: parse_uuid(&row.id)?,
            name: row.name,
            role,
            department_id: row.department_id,
            status,
            current_task_id: parse_optional_uuid(row.current_task_id)?,
            provider: row.provider,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteDepartmentRepository};
    use crate::domain::models::Department;
    use crate::domain::ports::DepartmentRepository;

    async fn setup_test_repo() -> SqliteAgentRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        let departments = SqliteDepartmentRepository::new(pool.clone());
        departments.upsert(&Department::new("dev", "Development", 1)).await.unwrap();
        departments.upsert(&Department::new("qa", "QA", 2)).await.unwrap();
        SqliteAgentRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_filter() {
        let repo = setup_test_repo().await;
        let lead = Agent::new("Aria", AgentRole::TeamLeader, "dev", "claude");
        let junior = Agent::new("Bo", AgentRole::Junior, "dev", "codex");
        let tester = Agent::new("Cy", AgentRole::Senior, "qa", "claude");
        for agent in [&lead, &junior, &tester] {
            repo.create(agent).await.unwrap();
        }

        let dev = repo
            .list(AgentFilter {
                department_id: Some("dev".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(dev.len(), 2);

        let leaders = repo
            .list(AgentFilter {
                role: Some(AgentRole::TeamLeader),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(leaders.len(), 1);
        assert_eq!(leaders[0].id, lead.id);
    }

    #[tokio::test]
    async fn test_holding_task() {
        let repo = setup_test_repo().await;
        let mut agent = Agent::new("Aria", AgentRole::Senior, "dev", "claude");
        repo.create(&agent).await.unwrap();

        let task_id = Uuid::new_v4();
        agent.occupy(task_id);
        repo.update(&agent).await.unwrap();

        let holders = repo.holding_task(task_id).await.unwrap();
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].status, AgentStatus::Working);

        agent.release(task_id);
        repo.update(&agent).await.unwrap();
        assert!(repo.holding_task(task_id).await.unwrap().is_empty());
    }
}
