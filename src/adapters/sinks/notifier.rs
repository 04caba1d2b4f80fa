//! Operator notifiers.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::ports::Notifier;

/// Writes notices to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, text: &str, related_task_id: Option<Uuid>) {
        match related_task_id {
            Some(task_id) => tracing::info!(%task_id, notice = %text, "Operator notice"),
            None => tracing::info!(notice = %text, "Operator notice"),
        }
    }
}

/// Prints notices to stdout, one per line.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier {
    json: bool,
}

impl ConsoleNotifier {
    pub fn new(json: bool) -> Self {
        Self { json }
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, text: &str, related_task_id: Option<Uuid>) {
        if self.json {
            let line = serde_json::json!({
                "notice": text,
                "task_id": related_task_id,
            });
            println!("{line}");
        } else {
            match related_task_id {
                Some(task_id) => println!("[notice] {text} ({})", &task_id.to_string()[..8]),
                None => println!("[notice] {text}"),
            }
        }
    }
}
