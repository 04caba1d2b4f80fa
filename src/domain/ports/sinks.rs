//! Outbound sinks: operator notices, state-change events, and creation audits.
//!
//! None of these may block or fail orchestrator logic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Agent, Subtask, Task};

/// Delivers operator-facing messages. Fire-and-forget.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str, related_task_id: Option<Uuid>);
}

/// Every state mutation the orchestrator publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    TaskUpdate(Box<Task>),
    AgentStatus(Box<Agent>),
    SubtaskUpdate(Box<Subtask>),
}

impl OrchestratorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TaskUpdate(_) => "task_update",
            Self::AgentStatus(_) => "agent_status",
            Self::SubtaskUpdate(_) => "subtask_update",
        }
    }
}

/// Publishes state-change events to whoever listens.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: OrchestratorEvent);
}

/// Provenance of a task creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationAudit {
    pub task_id: Uuid,
    /// What caused the creation, e.g. `directive`, `cross_department`, `subtask_batch`
    pub trigger: String,
    pub trigger_detail: Option<String>,
    pub actor_id: Option<Uuid>,
    pub body: String,
}

/// Records task creations for traceability.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_creation(&self, audit: &CreationAudit) -> DomainResult<()>;
}
