//! SQLite implementation of the TaskRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{
    parse_datetime, parse_json_or_default, parse_optional_datetime, parse_optional_json,
    parse_optional_uuid, parse_uuid,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CoordinationState, Task, TaskMetadata, TaskStatus};
use crate::domain::ports::{TaskFilter, TaskRepository};

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &Task) -> DomainResult<()> {
        task.validate().map_err(DomainError::ValidationFailed)?;
        let metadata_json = serde_json::to_string(&task.metadata)?;
        let coordination_json = task
            .coordination
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"INSERT INTO tasks (id, title, description, department_id, assigned_agent_id,
               project_id, project_path, source_task_id, status, metadata, coordination,
               created_at, started_at, updated_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.department_id)
        .bind(task.assigned_agent_id.map(|id| id.to_string()))
        .bind(&task.project_id)
        .bind(&task.project_path)
        .bind(task.source_task_id.map(|id| id.to_string()))
        .bind(task.status.as_str())
        .bind(&metadata_json)
        .bind(&coordination_json)
        .bind(task.created_at.to_rfc3339())
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.updated_at.to_rfc3339())
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Task::try_from).transpose()
    }

    async fn update(&self, task: &Task) -> DomainResult<()> {
        let metadata_json = serde_json::to_string(&task.metadata)?;
        let coordination_json = task
            .coordination
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"UPDATE tasks SET title = ?, description = ?, department_id = ?,
               assigned_agent_id = ?, project_id = ?, project_path = ?, source_task_id = ?,
               status = ?, metadata = ?, coordination = ?, started_at = ?, updated_at = ?,
               completed_at = ?
               WHERE id = ?"#,
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.department_id)
        .bind(task.assigned_agent_id.map(|id| id.to_string()))
        .bind(&task.project_id)
        .bind(&task.project_path)
        .bind(task.source_task_id.map(|id| id.to_string()))
        .bind(task.status.as_str())
        .bind(&metadata_json)
        .bind(&coordination_json)
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.updated_at.to_rfc3339())
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(task.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(task.id));
        }

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(id));
        }

        Ok(())
    }

    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<Task>> {
        let mut query = String::from("SELECT * FROM tasks WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(department_id) = &filter.department_id {
            query.push_str(" AND department_id = ?");
            bindings.push(department_id.clone());
        }
        if let Some(source_task_id) = &filter.source_task_id {
            query.push_str(" AND source_task_id = ?");
            bindings.push(source_task_id.to_string());
        }
        if let Some(agent_id) = &filter.assigned_agent_id {
            query.push_str(" AND assigned_agent_id = ?");
            bindings.push(agent_id.to_string());
        }

        query.push_str(" ORDER BY created_at, rowid");
        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {}", limit.max(0)));
        }

        let mut q = sqlx::query_as::<_, TaskRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<TaskRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn list_by_status(&self, status: TaskStatus) -> DomainResult<Vec<Task>> {
        self.list(TaskFilter {
            status: Some(status),
            ..Default::default()
        })
        .await
    }

    async fn children_of(&self, source_task_id: Uuid) -> DomainResult<Vec<Task>> {
        self.list(TaskFilter {
            source_task_id: Some(source_task_id),
            ..Default::default()
        })
        .await
    }

    async fn list_coordinating(&self) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE coordination IS NOT NULL ORDER BY created_at, rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Task::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    title: String,
    description: String,
    department_id: Option<String>,
    assigned_agent_id: Option<String>,
    project_id: Option<String>,
    project_path: Option<String>,
    source_task_id: Option<String>,
    status: String,
    metadata: Option<String>,
    coordination: Option<String>,
    created_at: String,
    started_at: Option<String>,
    updated_at: String,
    completed_at: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::from_str(&row.status).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid status: {}", row.status))
        })?;
        let metadata: TaskMetadata = parse_json_or_default(row.metadata)?;
        let coordination: Option<CoordinationState> = parse_optional_json(row.coordination)?;

        Ok(Task {
            id: parse_uuid(&row.id)?,
            title: row.title,
            description: row.description,
            department_id: row.department_id,
            assigned_agent_id: parse_optional_uuid(row.assigned_agent_id)?,
            project_id: row.project_id,
            project_path: row.project_path,
            source_task_id: parse_optional_uuid(row.source_task_id)?,
            status,
            metadata,
            coordination,
            created_at: parse_datetime(&row.created_at)?,
            started_at: parse_optional_datetime(row.started_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::{AfterCoordination, ChecklistItem};

    async fn setup_test_repo() -> SqliteTaskRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteTaskRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_get_task() {
        let repo = setup_test_repo().await;
        let task = Task::with_title("Test Task", "Description").with_department("dev");

        repo.create(&task).await.unwrap();

        let retrieved = repo.get(task.id).await.unwrap().unwrap();
        assert_eq!(retrieved.title, "Test Task");
        assert_eq!(retrieved.department_id.as_deref(), Some("dev"));
        assert_eq!(retrieved.status, TaskStatus::Inbox);
    }

    #[tokio::test]
    async fn test_metadata_and_coordination_persist() {
        let repo = setup_test_repo().await;
        let mut task = Task::new("Cross-team launch");
        task.metadata.round_goal = Some("ship v2".to_string());
        task.metadata.checklist.push(ChecklistItem {
            subtask_id: Uuid::new_v4(),
            title: "mockups".to_string(),
            description: None,
        });
        task.coordination = Some(CoordinationState::new(
            vec!["dev".to_string(), "qa".to_string()],
            AfterCoordination::RunParent,
        ));
        repo.create(&task).await.unwrap();

        let retrieved = repo.get(task.id).await.unwrap().unwrap();
        assert_eq!(retrieved.metadata, task.metadata);
        assert_eq!(retrieved.coordination, task.coordination);

        let coordinating = repo.list_coordinating().await.unwrap();
        assert_eq!(coordinating.len(), 1);

        task.coordination = None;
        repo.update(&task).await.unwrap();
        assert!(repo.list_coordinating().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_children_of_and_cascade_delete() {
        let repo = setup_test_repo().await;
        let parent = Task::new("Parent");
        let child = Task::new("Child").with_source(parent.id);
        repo.create(&parent).await.unwrap();
        repo.create(&child).await.unwrap();

        let children = repo.children_of(parent.id).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, child.id);

        repo.delete(parent.id).await.unwrap();
        assert!(repo.get(child.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_task_fails() {
        let repo = setup_test_repo().await;
        let task = Task::new("Never stored");
        let err = repo.update(&task).await.unwrap_err();
        assert!(matches!(err, DomainError::TaskNotFound(id) if id == task.id));
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let repo = setup_test_repo().await;
        let mut running = Task::new("Running");
        running.status = TaskStatus::InProgress;
        repo.create(&running).await.unwrap();
        repo.create(&Task::new("Waiting")).await.unwrap();

        let in_progress = repo.list_by_status(TaskStatus::InProgress).await.unwrap();
        assert_eq!(in_progress.len(), 1);
        assert_eq!(in_progress[0].id, running.id);
    }
}
