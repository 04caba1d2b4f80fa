//! Agent repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Agent, AgentRole, AgentStatus};

/// Filter criteria for listing agents.
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub department_id: Option<String>,
    pub role: Option<AgentRole>,
    pub status: Option<AgentStatus>,
}

/// Repository interface for Agent persistence.
#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn create(&self, agent: &Agent) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Agent>>;

    async fn update(&self, agent: &Agent) -> DomainResult<()>;

    async fn list(&self, filter: AgentFilter) -> DomainResult<Vec<Agent>>;

    /// Agents whose current task is `task_id`.
    async fn holding_task(&self, task_id: Uuid) -> DomainResult<Vec<Agent>>;
}
