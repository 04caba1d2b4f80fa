//! Mock worker spawner for testing and dry runs.
//!
//! Workers never run. Each spawn is recorded and stays "live" until the test
//! drives its exit with [`MockWorkerSpawner::complete`], or immediately when an
//! auto-exit code is configured. The spawner doubles as a [`LivenessCheck`]:
//! a pid is alive while its run is outstanding.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{LivenessCheck, WorkerHandle, WorkerRequest, WorkerSpawner};

/// Exit code reported for terminated mock workers (128 + SIGTERM).
pub const TERMINATED_EXIT: i32 = 143;

struct LiveRun {
    pid: u32,
    exit: oneshot::Sender<i32>,
}

#[derive(Default)]
struct MockState {
    requests: Vec<WorkerRequest>,
    live: HashMap<Uuid, LiveRun>,
    fail_next: Option<String>,
}

#[derive(Clone)]
pub struct MockWorkerSpawner {
    state: Arc<Mutex<MockState>>,
    next_pid: Arc<AtomicU32>,
    auto_exit: Option<i32>,
}

impl MockWorkerSpawner {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            next_pid: Arc::new(AtomicU32::new(40_000)),
            auto_exit: None,
        }
    }

    /// Every spawned worker exits with `code` as soon as it starts.
    pub fn with_auto_exit(code: i32) -> Self {
        Self {
            auto_exit: Some(code),
            ..Self::new()
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> Option<T> {
        self.state.lock().ok().map(|mut state| f(&mut state))
    }

    /// Make the next spawn fail with `reason`.
    pub fn fail_next_spawn(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.with_state(|s| s.fail_next = Some(reason));
    }

    /// Finish the live run of `task_id`. Returns false when none is live.
    pub fn complete(&self, task_id: Uuid, exit_code: i32) -> bool {
        let run = self.with_state(|s| s.live.remove(&task_id)).flatten();
        match run {
            Some(run) => run.exit.send(exit_code).is_ok(),
            None => false,
        }
    }

    /// Drop the live run without reporting an exit.
    pub fn lose(&self, task_id: Uuid) -> bool {
        self.with_state(|s| s.live.remove(&task_id).is_some())
            .unwrap_or(false)
    }

    pub fn is_running(&self, task_id: Uuid) -> bool {
        self.with_state(|s| s.live.contains_key(&task_id))
            .unwrap_or(false)
    }

    pub fn live_count(&self) -> usize {
        self.with_state(|s| s.live.len()).unwrap_or(0)
    }

    /// All spawn requests in order, failed ones excluded.
    pub fn requests(&self) -> Vec<WorkerRequest> {
        self.with_state(|s| s.requests.clone()).unwrap_or_default()
    }

    pub fn spawn_count(&self, task_id: Uuid) -> usize {
        self.with_state(|s| s.requests.iter().filter(|r| r.task_id == task_id).count())
            .unwrap_or(0)
    }
}

impl Default for MockWorkerSpawner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerSpawner for MockWorkerSpawner {
    async fn spawn(&self, request: WorkerRequest) -> DomainResult<WorkerHandle> {
        let task_id = request.task_id;
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        let auto_exit = self.auto_exit;

        let outcome = self.with_state(move |s| {
            if let Some(reason) = s.fail_next.take() {
                return Err(DomainError::SpawnFailed(reason));
            }
            s.requests.push(request);
            match auto_exit {
                Some(code) => {
                    let _ = tx.send(code);
                }
                None => {
                    s.live.insert(task_id, LiveRun { pid, exit: tx });
                }
            }
            Ok(())
        });

        match outcome {
            Some(Ok(())) => Ok(WorkerHandle::new(Some(pid), rx)),
            Some(Err(e)) => Err(e),
            None => Err(DomainError::SpawnFailed("mock spawner state poisoned".to_string())),
        }
    }

    async fn terminate(&self, pid: u32) -> DomainResult<()> {
        let run = self
            .with_state(|s| {
                let task_id = s
                    .live
                    .iter()
                    .find(|(_, run)| run.pid == pid)
                    .map(|(task_id, _)| *task_id)?;
                s.live.remove(&task_id)
            })
            .flatten();
        if let Some(run) = run {
            let _ = run.exit.send(TERMINATED_EXIT);
        }
        Ok(())
    }
}

impl LivenessCheck for MockWorkerSpawner {
    fn is_alive(&self, pid: u32) -> bool {
        self.with_state(|s| s.live.values().any(|run| run.pid == pid))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request(task_id: Uuid) -> WorkerRequest {
        WorkerRequest {
            task_id,
            provider: "claude".to_string(),
            prompt: "do it".to_string(),
            working_dir: PathBuf::from("."),
            log_path: PathBuf::from("worker.log"),
        }
    }

    #[tokio::test]
    async fn test_manual_exit() {
        let spawner = MockWorkerSpawner::new();
        let task_id = Uuid::new_v4();
        let handle = spawner.spawn(request(task_id)).await.unwrap();
        let pid = handle.pid.unwrap();

        assert!(spawner.is_running(task_id));
        assert!(spawner.is_alive(pid));
        assert!(spawner.complete(task_id, 0));
        assert_eq!(handle.wait().await, 0);
        assert!(!spawner.is_alive(pid));
        assert!(!spawner.complete(task_id, 0));
    }

    #[test]
    fn test_exit_pending_until_driven() {
        let spawner = MockWorkerSpawner::new();
        let task_id = Uuid::new_v4();
        let handle = tokio_test::block_on(spawner.spawn(request(task_id))).unwrap();

        let mut exit = tokio_test::task::spawn(handle.wait());
        tokio_test::assert_pending!(exit.poll());

        assert!(spawner.complete(task_id, 3));
        assert!(exit.is_woken());
        assert_eq!(tokio_test::assert_ready!(exit.poll()), 3);
    }

    #[test]
    fn test_lost_run_reports_minus_one() {
        let spawner = MockWorkerSpawner::new();
        let task_id = Uuid::new_v4();
        let handle = tokio_test::block_on(spawner.spawn(request(task_id))).unwrap();

        assert!(spawner.lose(task_id));
        assert_eq!(tokio_test::block_on(handle.wait()), -1);
    }

    #[tokio::test]
    async fn test_terminate_reports_signal_exit() {
        let spawner = MockWorkerSpawner::new();
        let handle = spawner.spawn(request(Uuid::new_v4())).await.unwrap();
        spawner.terminate(handle.pid.unwrap()).await.unwrap();
        assert_eq!(handle.wait().await, TERMINATED_EXIT);
    }

    #[tokio::test]
    async fn test_lost_run_reports_unknown_exit() {
        let spawner = MockWorkerSpawner::new();
        let task_id = Uuid::new_v4();
        let handle = spawner.spawn(request(task_id)).await.unwrap();
        assert!(spawner.lose(task_id));
        assert_eq!(handle.wait().await, -1);
    }

    #[tokio::test]
    async fn test_fail_next_spawn() {
        let spawner = MockWorkerSpawner::with_auto_exit(0);
        spawner.fail_next_spawn("binary not found");
        let err = spawner.spawn(request(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, DomainError::SpawnFailed(r) if r == "binary not found"));

        let handle = spawner.spawn(request(Uuid::new_v4())).await.unwrap();
        assert_eq!(handle.wait().await, 0);
        assert_eq!(spawner.requests().len(), 1);
    }
}
