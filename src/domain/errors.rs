//! Domain errors for the taskforce orchestrator.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur in the orchestrator.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Subtask not found: {0}")]
    SubtaskNotFound(Uuid),

    #[error("Agent not found: {0}")]
    AgentNotFound(Uuid),

    #[error("Department not found: {0}")]
    DepartmentNotFound(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// The task already has a live worker, or the executor holds another task.
    #[error("Dispatch refused for task {task_id}: {reason}")]
    DispatchRefused { task_id: Uuid, reason: String },

    /// A directive with this idempotency key was already processed.
    /// `task_id` is the task it created, if any.
    #[error("Directive already processed: {key}")]
    DuplicateDirective { key: String, task_id: Option<Uuid> },

    /// The store was busy or locked. Safe to retry.
    #[error("Write contention: {0}")]
    WriteContention(String),

    #[error("Worker spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Whether the caller may retry the same operation unchanged.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::WriteContention(_))
    }
}

/// SQLite primary result codes for SQLITE_BUSY and SQLITE_LOCKED.
const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let code = db_err.code();
            let code = code.as_deref().unwrap_or_default();
            // Extended codes share the primary code in their low byte.
            let primary = code
                .parse::<i64>()
                .map(|c| (c & 0xff).to_string())
                .unwrap_or_default();
            if primary == SQLITE_BUSY || primary == SQLITE_LOCKED {
                return Self::WriteContention(db_err.message().to_string());
            }
        }
        if matches!(err, sqlx::Error::PoolTimedOut) {
            return Self::WriteContention(err.to_string());
        }
        Self::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_contention_is_retryable() {
        assert!(DomainError::WriteContention("busy".into()).is_retryable());
        let duplicate = DomainError::DuplicateDirective {
            key: "k".into(),
            task_id: None,
        };
        assert!(!duplicate.is_retryable());
        assert!(!DomainError::TaskNotFound(Uuid::new_v4()).is_retryable());
    }

    #[test]
    fn test_pool_timeout_maps_to_contention() {
        let err: DomainError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DomainError::WriteContention(_)));
    }
}
