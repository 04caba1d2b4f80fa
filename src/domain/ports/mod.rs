//! Port trait definitions (Hexagonal Architecture)
//!
//! Repositories for the store of record, the worker spawn contract, and the
//! outbound sinks. Adapters under `crate::adapters` implement them.

pub mod agent_repository;
pub mod department_repository;
pub mod directive_receipts;
pub mod sinks;
pub mod subtask_repository;
pub mod task_log_repository;
pub mod task_repository;
pub mod worker;

pub use agent_repository::{AgentFilter, AgentRepository};
pub use department_repository::DepartmentRepository;
pub use directive_receipts::DirectiveReceiptRepository;
pub use sinks::{AuditSink, CreationAudit, EventSink, Notifier, OrchestratorEvent};
pub use subtask_repository::SubtaskRepository;
pub use task_log_repository::TaskLogRepository;
pub use task_repository::{TaskFilter, TaskRepository};
pub use worker::{LivenessCheck, WorkerHandle, WorkerRequest, WorkerSpawner};
