//! Delegation and recovery orchestrator.
//!
//! The orchestrator is a thin coordinator over a few concerns:
//!
//! - **dispatch**: directive intake, delegation, worker runs and their exits
//! - **coordination**: sequential cross-department queues
//! - **batch**: grouped delegation of foreign subtasks and its finalization
//! - **reconcile**: re-deriving subtask state from child tasks
//! - **recovery**: startup recovery and the stale-run sweep
//! - **control**: operator pause, cancel and resume
//!
//! Task and subtask rows are the source of truth. The [`DelegationRegistry`]
//! only short-circuits lookups and is empty after a restart.

mod batch;
mod control;
mod coordination;
mod dispatch;
mod prompt;
mod reconcile;
mod recovery;

pub use dispatch::{DelegateOptions, DirectiveOutcome};
pub use reconcile::ReconcileReport;
pub use recovery::{StartupReport, SweepReport};

use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::adapters::sinks::{BroadcastEventSink, TracingNotifier};
use crate::adapters::sqlite::{
    SqliteAgentRepository, SqliteAuditRepository, SqliteDepartmentRepository,
    SqliteDirectiveReceiptRepository, SqliteSubtaskRepository, SqliteTaskLogRepository,
    SqliteTaskRepository,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Agent, Config, Locale, LogKind, OrchestratorConfig, Subtask, Task, TaskStatus, WorkersConfig,
};
use crate::domain::ports::{
    AgentRepository, AuditSink, CreationAudit, DepartmentRepository, DirectiveReceiptRepository,
    EventSink, LivenessCheck, Notifier, OrchestratorEvent, SubtaskRepository, TaskLogRepository,
    TaskRepository, WorkerSpawner,
};
use crate::services::directory::Directory;
use crate::services::notices::Notice;
use crate::services::registry::{DelegationRegistry, StopMode};

/// The store-of-record ports the orchestrator works against.
#[derive(Clone)]
pub struct Stores {
    pub tasks: Arc<dyn TaskRepository>,
    pub subtasks: Arc<dyn SubtaskRepository>,
    pub agents: Arc<dyn AgentRepository>,
    pub departments: Arc<dyn DepartmentRepository>,
    pub logs: Arc<dyn TaskLogRepository>,
    pub receipts: Arc<dyn DirectiveReceiptRepository>,
    pub audit: Arc<dyn AuditSink>,
}

impl Stores {
    /// All ports backed by one SQLite pool.
    pub fn sqlite(pool: SqlitePool) -> Self {
        Self {
            tasks: Arc::new(SqliteTaskRepository::new(pool.clone())),
            subtasks: Arc::new(SqliteSubtaskRepository::new(pool.clone())),
            agents: Arc::new(SqliteAgentRepository::new(pool.clone())),
            departments: Arc::new(SqliteDepartmentRepository::new(pool.clone())),
            logs: Arc::new(SqliteTaskLogRepository::new(pool.clone())),
            receipts: Arc::new(SqliteDirectiveReceiptRepository::new(pool.clone())),
            audit: Arc::new(SqliteAuditRepository::new(pool)),
        }
    }
}

/// Runtime settings, split out of the loaded [`Config`].
#[derive(Debug, Clone, Default)]
pub struct OrchestratorSettings {
    pub orchestrator: OrchestratorConfig,
    pub workers: WorkersConfig,
    /// Fallback language for notices when a task carries none.
    pub locale: Locale,
}

impl From<&Config> for OrchestratorSettings {
    fn from(config: &Config) -> Self {
        Self {
            orchestrator: config.orchestrator.clone(),
            workers: config.workers.clone(),
            locale: config.operator.locale,
        }
    }
}

/// Delegates work to department agents and recovers it after failures.
///
/// Cheap to clone; every clone shares the same registry and ports. Exit
/// watchers hold a clone for the length of a worker run.
#[derive(Clone)]
pub struct Orchestrator {
    pub(super) tasks: Arc<dyn TaskRepository>,
    pub(super) subtasks: Arc<dyn SubtaskRepository>,
    pub(super) agents: Arc<dyn AgentRepository>,
    pub(super) logs: Arc<dyn TaskLogRepository>,
    pub(super) receipts: Arc<dyn DirectiveReceiptRepository>,
    pub(super) audit: Arc<dyn AuditSink>,
    pub(super) directory: Directory,

    pub(super) spawner: Arc<dyn WorkerSpawner>,
    pub(super) liveness: Arc<dyn LivenessCheck>,
    pub(super) notifier: Arc<dyn Notifier>,
    pub(super) events: Arc<dyn EventSink>,

    pub(super) registry: Arc<DelegationRegistry>,
    pub(super) settings: Arc<OrchestratorSettings>,
}

// ============================================================================
// Constructor & Builder Pattern
// ============================================================================

impl Orchestrator {
    pub fn new(
        stores: Stores,
        spawner: Arc<dyn WorkerSpawner>,
        liveness: Arc<dyn LivenessCheck>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            directory: Directory::new(stores.departments.clone(), stores.agents.clone()),
            tasks: stores.tasks,
            subtasks: stores.subtasks,
            agents: stores.agents,
            logs: stores.logs,
            receipts: stores.receipts,
            audit: stores.audit,
            spawner,
            liveness,
            notifier: Arc::new(TracingNotifier),
            events: Arc::new(BroadcastEventSink::default()),
            registry: Arc::new(DelegationRegistry::new()),
            settings: Arc::new(settings),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn registry(&self) -> &DelegationRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Number of worker runs the orchestrator is waiting on.
    pub async fn live_runs(&self) -> usize {
        self.registry.live_count().await
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

impl Orchestrator {
    pub(super) async fn load_task(&self, task_id: Uuid) -> DomainResult<Task> {
        self.tasks
            .get(task_id)
            .await?
            .ok_or(DomainError::TaskNotFound(task_id))
    }

    pub(super) async fn load_agent(&self, agent_id: Uuid) -> DomainResult<Agent> {
        self.agents
            .get(agent_id)
            .await?
            .ok_or(DomainError::AgentNotFound(agent_id))
    }

    /// Move a task to `status` in memory, mapping refusals to a domain error.
    pub(super) fn transition(task: &mut Task, status: TaskStatus) -> DomainResult<()> {
        if task.status == status {
            return Ok(());
        }
        task.transition_to(status)
            .map_err(|_| DomainError::InvalidStateTransition {
                from: task.status.to_string(),
                to: status.to_string(),
            })
    }

    /// Persist a task and publish it.
    pub(super) async fn save_task(&self, task: &Task) -> DomainResult<()> {
        self.tasks.update(task).await?;
        self.emit_task(task);
        Ok(())
    }

    /// Load, transition and persist in one step.
    pub(super) async fn set_task_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
    ) -> DomainResult<Task> {
        let mut task = self.load_task(task_id).await?;
        if task.status != status {
            Self::transition(&mut task, status)?;
            self.save_task(&task).await?;
        }
        Ok(task)
    }

    pub(super) fn emit_task(&self, task: &Task) {
        self.events
            .emit(OrchestratorEvent::TaskUpdate(Box::new(task.clone())));
    }

    pub(super) fn emit_agent(&self, agent: &Agent) {
        self.events
            .emit(OrchestratorEvent::AgentStatus(Box::new(agent.clone())));
    }

    pub(super) fn emit_subtasks(&self, subtasks: &[Subtask]) {
        for subtask in subtasks {
            self.events
                .emit(OrchestratorEvent::SubtaskUpdate(Box::new(subtask.clone())));
        }
    }

    /// Language for notices about `task`.
    pub(super) fn locale_for(&self, task: &Task) -> Locale {
        task.metadata.locale.unwrap_or(self.settings.locale)
    }

    pub(super) async fn notify_task(&self, task: &Task, notice: Notice<'_>) {
        let text = notice.render(self.locale_for(task));
        self.notifier.notify(&text, Some(task.id)).await;
    }

    /// Append an orchestrator line to a task log. Failures are logged only.
    pub(super) async fn log_system(&self, task_id: Uuid, message: &str) {
        if let Err(e) = self.logs.append(task_id, LogKind::System, message).await {
            tracing::warn!(task_id = %task_id, error = %e, "failed to append task log");
        }
    }

    /// Record a task creation. Audit failures never fail the caller.
    pub(super) async fn audit_creation(
        &self,
        task: &Task,
        trigger: &str,
        trigger_detail: Option<String>,
        actor_id: Option<Uuid>,
    ) {
        let audit = CreationAudit {
            task_id: task.id,
            trigger: trigger.to_string(),
            trigger_detail,
            actor_id,
            body: task.description.clone(),
        };
        if let Err(e) = self.audit.record_creation(&audit).await {
            tracing::warn!(task_id = %task.id, trigger, error = %e, "failed to record creation audit");
        }
    }

    /// Free every agent still holding `task_id`.
    pub(super) async fn release_executor(&self, task_id: Uuid) {
        let holders = match self.agents.holding_task(task_id).await {
            Ok(holders) => holders,
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "failed to look up executor");
                return;
            }
        };
        for mut agent in holders {
            if agent.release(task_id) {
                match self.agents.update(&agent).await {
                    Ok(()) => self.emit_agent(&agent),
                    Err(e) => {
                        tracing::warn!(agent_id = %agent.id, error = %e, "failed to free executor");
                    }
                }
            }
        }
    }

    /// Display name of a department, or the id when unknown.
    pub(super) async fn department_name(&self, department_id: &str) -> String {
        match self.directory.department(department_id).await {
            Ok(Some(department)) => department.name,
            _ => department_id.to_string(),
        }
    }

    /// Stop request on the task itself, or inherited from the task that delegated it.
    pub(super) async fn stop_requested(&self, task: &Task) -> Option<StopMode> {
        if let Some(mode) = self.registry.stop_mode(task.id).await {
            return Some(mode);
        }
        match task.source_task_id {
            Some(parent_id) => self.registry.stop_mode(parent_id).await,
            None => None,
        }
    }

    /// Agent that should run `task`: its assignee, else the department lead's pick.
    pub(super) async fn executor_for(&self, task: &Task) -> DomainResult<Uuid> {
        if let Some(agent_id) = task.assigned_agent_id {
            return Ok(agent_id);
        }
        let department_id = task.department_id.clone().ok_or_else(|| {
            DomainError::ValidationFailed(format!("task {} has no department", task.id))
        })?;
        let lead = self
            .directory
            .leader_of(&department_id)
            .await?
            .ok_or(DomainError::DepartmentNotFound(department_id))?;
        Ok(self.directory.pick_executor(&lead).await?.id)
    }

    pub(super) fn log_path(&self, task_id: Uuid) -> PathBuf {
        PathBuf::from(&self.settings.workers.logs_dir).join(format!("{task_id}.log"))
    }

    pub(super) fn working_dir(&self, task: &Task) -> PathBuf {
        task.project_path
            .as_deref()
            .map_or_else(|| PathBuf::from(&self.settings.workers.working_dir), PathBuf::from)
    }

    /// Pacing delay; skipped entirely when configured to zero.
    pub(super) async fn pace(millis: u64) {
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }
}
