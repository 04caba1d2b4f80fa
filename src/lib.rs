//! Taskforce - department-shaped agent orchestrator
//!
//! Taskforce turns operator directives into tasks, hands them to department
//! leads and their subordinates, runs each assignment as an external worker
//! process, and keeps task, subtask and agent state consistent across worker
//! failures and restarts.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, state machines and port traits
//! - **Service Layer** (`services`): delegation, coordination, batching and recovery
//! - **Adapters** (`adapters`): SQLite store, worker processes, notice and event sinks
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use taskforce::adapters::workers::MockWorkerSpawner;
//! use taskforce::{Directive, Orchestrator, OrchestratorSettings, Stores};
//!
//! let spawner = Arc::new(MockWorkerSpawner::with_auto_exit(0));
//! let orchestrator = Orchestrator::new(
//!     Stores::sqlite(pool),
//!     spawner.clone(),
//!     spawner,
//!     OrchestratorSettings::default(),
//! );
//! orchestrator.submit_directive(Directive::new("Build the signup API")).await?;
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Agent, AgentRole, AgentStatus, Config, Department, Directive, PlanItem, Subtask,
    SubtaskStatus, Task, TaskStatus,
};
pub use domain::ports::{
    AgentRepository, EventSink, LivenessCheck, Notifier, SubtaskRepository, TaskRepository,
    WorkerSpawner,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    DirectiveOutcome, Orchestrator, OrchestratorSettings, RecoveryDaemon, StopMode, Stores,
};
