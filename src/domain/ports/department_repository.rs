//! Department repository port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::Department;

#[async_trait]
pub trait DepartmentRepository: Send + Sync {
    /// Insert or replace a department.
    async fn upsert(&self, department: &Department) -> DomainResult<()>;

    async fn get(&self, id: &str) -> DomainResult<Option<Department>>;

    /// All departments by sort order.
    async fn list(&self) -> DomainResult<Vec<Department>>;
}
