//! Directive receipt port, used to reject replayed directives.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;

#[async_trait]
pub trait DirectiveReceiptRepository: Send + Sync {
    /// Record that a directive key was received.
    ///
    /// Fails with `DomainError::DuplicateDirective` when the key was seen
    /// before, carrying the task the earlier submission created.
    async fn record(&self, key: &str) -> DomainResult<()>;

    /// Attach the task a directive is about to create.
    async fn attach_task(&self, key: &str, task_id: Uuid) -> DomainResult<()>;

    /// Drop a receipt whose task was never stored, so the directive can be
    /// submitted again. A receipt pointing at an existing task is kept.
    async fn release(&self, key: &str) -> DomainResult<()>;
}
