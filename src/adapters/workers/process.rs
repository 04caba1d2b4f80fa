//! Generic CLI worker adapter built on `tokio::process`.
//!
//! Each run executes `<command> <args...> <prompt>` in the task's working
//! directory. Output lines are appended to the side-channel log file and
//! streamed back to the orchestrator.

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ProviderCommand, WorkersConfig};
use crate::domain::ports::{LivenessCheck, WorkerHandle, WorkerRequest, WorkerSpawner};

/// Exit code reported when the process was killed by a signal or could not be awaited.
const UNKNOWN_EXIT: i32 = -1;

pub struct ProcessWorkerSpawner {
    providers: HashMap<String, ProviderCommand>,
    default_provider: String,
}

impl ProcessWorkerSpawner {
    pub fn new(
        providers: HashMap<String, ProviderCommand>,
        default_provider: impl Into<String>,
    ) -> Self {
        Self {
            providers,
            default_provider: default_provider.into(),
        }
    }

    pub fn from_config(config: &WorkersConfig) -> Self {
        Self::new(config.providers.clone(), config.default_provider.clone())
    }

    fn command_for(&self, provider: &str) -> DomainResult<&ProviderCommand> {
        self.providers
            .get(provider)
            .or_else(|| self.providers.get(&self.default_provider))
            .ok_or_else(|| DomainError::SpawnFailed(format!("no command configured for provider '{provider}'")))
    }
}

#[async_trait]
impl WorkerSpawner for ProcessWorkerSpawner {
    async fn spawn(&self, request: WorkerRequest) -> DomainResult<WorkerHandle> {
        let provider = self.command_for(&request.provider)?;

        if let Some(parent) = request.log_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DomainError::SpawnFailed(format!("cannot create log directory: {e}"))
            })?;
        }
        let mut log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&request.log_path)
            .await
            .map_err(|e| DomainError::SpawnFailed(format!("cannot open worker log: {e}")))?;

        let mut cmd = Command::new(&provider.command);
        cmd.args(&provider.args)
            .arg(&request.prompt)
            .current_dir(&request.working_dir)
            .env("TASKFORCE_TASK_ID", request.task_id.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            DomainError::SpawnFailed(format!("failed to start {}: {e}", provider.command))
        })?;
        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DomainError::SpawnFailed("failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DomainError::SpawnFailed("failed to capture stderr".to_string()))?;

        let (exit_tx, exit_rx) = oneshot::channel();
        let (line_tx, line_rx) = mpsc::channel(256);
        let task_id = request.task_id;

        tokio::spawn(async move {
            let mut stdout_lines = BufReader::new(stdout).lines();
            let mut stderr_lines = BufReader::new(stderr).lines();
            let mut stdout_open = true;
            let mut stderr_open = true;

            while stdout_open || stderr_open {
                let (line, from_stdout) = tokio::select! {
                    line = stdout_lines.next_line(), if stdout_open => (line, true),
                    line = stderr_lines.next_line(), if stderr_open => (line, false),
                };
                let Ok(Some(line)) = line else {
                    if from_stdout {
                        stdout_open = false;
                    } else {
                        stderr_open = false;
                    }
                    continue;
                };

                if let Err(e) = log_file.write_all(format!("{line}\n").as_bytes()).await {
                    tracing::warn!(%task_id, error = %e, "Failed to write worker log");
                }
                // Receiver may be gone; the log file still has the line.
                let _ = line_tx.try_send(line);
            }
            let _ = log_file.flush().await;

            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(UNKNOWN_EXIT),
                Err(e) => {
                    tracing::warn!(%task_id, error = %e, "Failed to wait for worker");
                    UNKNOWN_EXIT
                }
            };
            tracing::debug!(%task_id, exit_code = code, "Worker process exited");
            let _ = exit_tx.send(code);
        });

        tracing::info!(
            task_id = %request.task_id,
            provider = %request.provider,
            pid = ?pid,
            "Worker process started"
        );

        Ok(WorkerHandle::new(pid, exit_rx).with_output(line_rx))
    }

    async fn terminate(&self, pid: u32) -> DomainResult<()> {
        let raw = i32::try_from(pid)
            .map_err(|_| DomainError::ValidationFailed(format!("invalid pid {pid}")))?;
        match kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(DomainError::SpawnFailed(format!("failed to signal pid {pid}: {e}"))),
        }
    }
}

/// Liveness check using signal 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalLivenessCheck;

impl LivenessCheck for SignalLivenessCheck {
    fn is_alive(&self, pid: u32) -> bool {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            // Exists but owned by someone else.
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }
}
