//! Worker port - the contract for launching external worker processes.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::domain::errors::DomainResult;

/// Everything a spawner needs to launch one worker run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRequest {
    pub task_id: Uuid,
    /// Provider kind, e.g. `claude`
    pub provider: String,
    pub prompt: String,
    pub working_dir: PathBuf,
    /// Side-channel log file the worker writes to
    pub log_path: PathBuf,
}

/// A launched worker.
///
/// `exit` resolves once with the process exit code. A dropped sender means the
/// exit could not be observed and is reported as exit code -1.
#[derive(Debug)]
pub struct WorkerHandle {
    pub pid: Option<u32>,
    pub exit: oneshot::Receiver<i32>,
    /// Worker output lines, when the spawner captures them.
    pub output: Option<mpsc::Receiver<String>>,
}

impl WorkerHandle {
    pub fn new(pid: Option<u32>, exit: oneshot::Receiver<i32>) -> Self {
        Self {
            pid,
            exit,
            output: None,
        }
    }

    pub fn with_output(mut self, output: mpsc::Receiver<String>) -> Self {
        self.output = Some(output);
        self
    }

    /// Wait for the exit code.
    pub async fn wait(self) -> i32 {
        self.exit.await.unwrap_or(-1)
    }
}

/// Launches worker processes.
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    /// Start a worker for the request.
    async fn spawn(&self, request: WorkerRequest) -> DomainResult<WorkerHandle>;

    /// Ask a running worker to stop. Best effort.
    async fn terminate(&self, pid: u32) -> DomainResult<()>;
}

/// Answers whether an OS process is still alive.
pub trait LivenessCheck: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}
