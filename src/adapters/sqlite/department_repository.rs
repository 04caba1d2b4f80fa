//! SQLite implementation of the DepartmentRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::parse_json_or_default;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Department;
use crate::domain::ports::DepartmentRepository;

#[derive(Clone)]
pub struct SqliteDepartmentRepository {
    pool: SqlitePool,
}

impl SqliteDepartmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DepartmentRepository for SqliteDepartmentRepository {
    async fn upsert(&self, department: &Department) -> DomainResult<()> {
        let aliases_json = serde_json::to_string(&department.aliases)?;

        sqlx::query(
            r#"INSERT INTO departments (id, name, aliases, sort_order) VALUES (?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   name = excluded.name,
                   aliases = excluded.aliases,
                   sort_order = excluded.sort_order"#,
        )
        .bind(&department.id)
        .bind(&department.name)
        .bind(&aliases_json)
        .bind(department.sort_order)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> DomainResult<Option<Department>> {
        let row: Option<DepartmentRow> = sqlx::query_as("SELECT * FROM departments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Department::try_from).transpose()
    }

    async fn list(&self) -> DomainResult<Vec<Department>> {
        let rows: Vec<DepartmentRow> =
            sqlx::query_as("SELECT * FROM departments ORDER BY sort_order, id")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Department::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct DepartmentRow {
    id: String,
    name: String,
    aliases: Option<String>,
    sort_order: i64,
}

impl TryFrom<DepartmentRow> for Department {
    type Error = DomainError;

    fn try_from(row: DepartmentRow) -> Result<Self, Self::Error> {
        Ok(Department {
            id: row.id,
            name: row.name,
            aliases: parse_json_or_default(row.aliases)?,
            sort_order: row.sort_order,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    #[tokio::test]
    async fn test_upsert_replaces_and_lists_in_order() {
        let repo = SqliteDepartmentRepository::new(create_migrated_test_pool().await.unwrap());
        repo.upsert(&Department::new("qa", "QA", 3)).await.unwrap();
        repo.upsert(&Department::new("dev", "Dev", 1)).await.unwrap();
        repo.upsert(&Department::new("dev", "Development", 1).with_aliases(["개발"]))
            .await
            .unwrap();

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "dev");
        assert_eq!(all[0].name, "Development");
        assert_eq!(all[0].aliases, vec!["개발".to_string()]);
        assert!(repo.get("ops").await.unwrap().is_none());
    }
}
