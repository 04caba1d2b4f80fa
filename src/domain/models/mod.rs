pub mod agent;
pub mod config;
pub mod department;
pub mod directive;
pub mod subtask;
pub mod task;
pub mod task_log;

pub use agent::{delegation_order, Agent, AgentRole, AgentStatus};
pub use config::{
    Config, DatabaseConfig, LoggingConfig, OperatorConfig, OrchestratorConfig, ProviderCommand,
    WorkersConfig,
};
pub use department::{
    execution_order, execution_priority, Department, DEPARTMENT_EXECUTION_PRIORITY,
};
pub use directive::{Directive, DirectivePolicy, Locale, PlanItem, SkipReason};
pub use subtask::{Subtask, SubtaskStatus};
pub use task::{
    AfterCoordination, ChecklistItem, CoordinationState, Task, TaskMetadata, TaskStatus,
};
pub use task_log::{LogKind, RunMarker, TaskLog};
