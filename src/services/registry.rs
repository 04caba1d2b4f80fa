//! In-memory delegation bookkeeping.
//!
//! Nothing here is persisted. After a restart every map starts empty and the
//! orchestrator re-derives what it needs from task and subtask rows.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

/// How an operator asked a task to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopMode {
    /// Stop now, resume later.
    Pause,
    /// Stop for good.
    Cancel,
}

impl StopMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Cancel => "cancel",
        }
    }
}

/// Continuation registered for a cross-department child task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinationHook {
    pub parent_id: Uuid,
    /// Queue position of the child's department.
    pub index: usize,
}

/// Subtasks executed together by one delegated child task.
///
/// Keyed in the registry by `first_subtask_id`, which the child also carries
/// as the first item of its checklist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCorrelation {
    pub parent_id: Uuid,
    pub child_id: Uuid,
    pub first_subtask_id: Uuid,
    pub subtask_ids: Vec<Uuid>,
}

/// A worker run the orchestrator is waiting on.
///
/// The claim is taken before the worker spawns, so `pid` stays `None` until
/// the spawn returns. `exiting` is set while the exit is being finalized, and
/// the claim is released once that is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveRun {
    pub pid: Option<u32>,
    pub agent_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub exiting: bool,
}

#[derive(Default)]
struct RegistryState {
    hooks: HashMap<Uuid, CoordinationHook>,
    dispatching: HashSet<Uuid>,
    notices_sent: HashSet<Uuid>,
    batches: HashMap<Uuid, BatchCorrelation>,
    live: HashMap<Uuid, LiveRun>,
    stops: HashMap<Uuid, StopMode>,
}

#[derive(Default)]
pub struct DelegationRegistry {
    state: Mutex<RegistryState>,
}

impl DelegationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // -- live runs --

    /// Claim the single run slot of a task. False when a run is already live.
    ///
    /// A run that is only finishing its exit does not block a new claim.
    pub async fn claim_run(&self, task_id: Uuid, agent_id: Uuid) -> bool {
        let mut state = self.state.lock().await;
        if state.live.get(&task_id).is_some_and(|run| !run.exiting) {
            return false;
        }
        state.live.insert(
            task_id,
            LiveRun {
                pid: None,
                agent_id,
                started_at: Utc::now(),
                exiting: false,
            },
        );
        true
    }

    pub async fn set_pid(&self, task_id: Uuid, pid: Option<u32>) {
        if let Some(run) = self.state.lock().await.live.get_mut(&task_id) {
            run.pid = pid;
        }
    }

    /// Flag a run whose exit is being finalized.
    pub async fn mark_exiting(&self, task_id: Uuid) {
        if let Some(run) = self.state.lock().await.live.get_mut(&task_id) {
            run.exiting = true;
        }
    }

    pub async fn release_run(&self, task_id: Uuid) -> Option<LiveRun> {
        self.state.lock().await.live.remove(&task_id)
    }

    /// Release a run flagged by [`Self::mark_exiting`], leaving any newer claim alone.
    pub async fn release_exiting(&self, task_id: Uuid) -> Option<LiveRun> {
        let mut state = self.state.lock().await;
        if !state.live.get(&task_id)?.exiting {
            return None;
        }
        state.live.remove(&task_id)
    }

    pub async fn live_run(&self, task_id: Uuid) -> Option<LiveRun> {
        self.state.lock().await.live.get(&task_id).copied()
    }

    pub async fn live_count(&self) -> usize {
        self.state.lock().await.live.len()
    }

    // -- coordination hooks --

    pub async fn set_hook(&self, child_id: Uuid, hook: CoordinationHook) {
        self.state.lock().await.hooks.insert(child_id, hook);
    }

    pub async fn take_hook(&self, child_id: Uuid) -> Option<CoordinationHook> {
        self.state.lock().await.hooks.remove(&child_id)
    }

    pub async fn has_hook(&self, child_id: Uuid) -> bool {
        self.state.lock().await.hooks.contains_key(&child_id)
    }

    // -- batch dispatch --

    /// Mark a parent as dispatching a batch group. False when one is in flight.
    pub async fn begin_dispatch(&self, parent_id: Uuid) -> bool {
        self.state.lock().await.dispatching.insert(parent_id)
    }

    pub async fn end_dispatch(&self, parent_id: Uuid) {
        self.state.lock().await.dispatching.remove(&parent_id);
    }

    pub async fn is_dispatching(&self, parent_id: Uuid) -> bool {
        self.state.lock().await.dispatching.contains(&parent_id)
    }

    pub async fn insert_batch(&self, batch: BatchCorrelation) {
        self.state
            .lock()
            .await
            .batches
            .insert(batch.first_subtask_id, batch);
    }

    /// Correlation of the group starting at `first_subtask_id`, if `child_id` runs it.
    pub async fn batch(&self, first_subtask_id: Uuid, child_id: Uuid) -> Option<BatchCorrelation> {
        self.state
            .lock()
            .await
            .batches
            .get(&first_subtask_id)
            .filter(|batch| batch.child_id == child_id)
            .cloned()
    }

    /// Remove and return the correlation, only when `child_id` runs the group.
    pub async fn take_batch(
        &self,
        first_subtask_id: Uuid,
        child_id: Uuid,
    ) -> Option<BatchCorrelation> {
        let mut state = self.state.lock().await;
        if state.batches.get(&first_subtask_id)?.child_id != child_id {
            return None;
        }
        state.batches.remove(&first_subtask_id)
    }

    // -- notices --

    /// Record the all-subtasks-complete notice. True only the first time.
    pub async fn mark_notice_sent(&self, parent_id: Uuid) -> bool {
        self.state.lock().await.notices_sent.insert(parent_id)
    }

    // -- stop requests --

    pub async fn request_stop(&self, task_id: Uuid, mode: StopMode) {
        self.state.lock().await.stops.insert(task_id, mode);
    }

    pub async fn stop_mode(&self, task_id: Uuid) -> Option<StopMode> {
        self.state.lock().await.stops.get(&task_id).copied()
    }

    pub async fn clear_stop(&self, task_id: Uuid) -> Option<StopMode> {
        self.state.lock().await.stops.remove(&task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_single_run_slot() {
        let registry = DelegationRegistry::new();
        let task_id = Uuid::new_v4();
        let agent_id = Uuid::new_v4();

        assert!(registry.claim_run(task_id, agent_id).await);
        assert!(!registry.claim_run(task_id, agent_id).await);
        registry.set_pid(task_id, Some(42)).await;
        assert_eq!(registry.live_run(task_id).await.unwrap().pid, Some(42));
        assert!(!registry.live_run(task_id).await.unwrap().exiting);

        assert!(registry.release_run(task_id).await.is_some());
        assert!(registry.claim_run(task_id, agent_id).await);
    }

    #[tokio::test]
    async fn test_exiting_run_yields_to_a_new_claim() {
        let registry = DelegationRegistry::new();
        let task_id = Uuid::new_v4();
        let agent_id = Uuid::new_v4();

        assert!(registry.claim_run(task_id, agent_id).await);
        registry.mark_exiting(task_id).await;
        assert!(registry.live_run(task_id).await.unwrap().exiting);

        assert!(registry.claim_run(task_id, agent_id).await);
        assert!(registry.release_exiting(task_id).await.is_none());
        assert!(!registry.live_run(task_id).await.unwrap().exiting);

        registry.mark_exiting(task_id).await;
        assert!(registry.release_exiting(task_id).await.is_some());
        assert!(registry.live_run(task_id).await.is_none());
    }

    #[tokio::test]
    async fn test_notice_sent_once() {
        let registry = DelegationRegistry::new();
        let parent = Uuid::new_v4();
        assert!(registry.mark_notice_sent(parent).await);
        assert!(!registry.mark_notice_sent(parent).await);
    }

    #[tokio::test]
    async fn test_dispatch_flag_is_exclusive() {
        let registry = DelegationRegistry::new();
        let parent = Uuid::new_v4();
        assert!(registry.begin_dispatch(parent).await);
        assert!(!registry.begin_dispatch(parent).await);
        registry.end_dispatch(parent).await;
        assert!(!registry.is_dispatching(parent).await);
    }

    #[tokio::test]
    async fn test_batch_and_hook_are_taken_once() {
        let registry = DelegationRegistry::new();
        let child = Uuid::new_v4();
        let parent = Uuid::new_v4();
        let first = Uuid::new_v4();
        registry
            .insert_batch(BatchCorrelation {
                parent_id: parent,
                child_id: child,
                first_subtask_id: first,
                subtask_ids: vec![first],
            })
            .await;
        registry.set_hook(child, CoordinationHook { parent_id: parent, index: 0 }).await;

        assert!(registry.take_batch(first, child).await.is_some());
        assert!(registry.take_batch(first, child).await.is_none());
        assert!(registry.has_hook(child).await);
        assert_eq!(registry.take_hook(child).await.unwrap().index, 0);
        assert!(registry.take_hook(child).await.is_none());
    }

    #[tokio::test]
    async fn test_batch_is_keyed_by_first_subtask() {
        let registry = DelegationRegistry::new();
        let first = Uuid::new_v4();
        let (old_child, new_child) = (Uuid::new_v4(), Uuid::new_v4());
        for child_id in [old_child, new_child] {
            registry
                .insert_batch(BatchCorrelation {
                    parent_id: Uuid::new_v4(),
                    child_id,
                    first_subtask_id: first,
                    subtask_ids: vec![first],
                })
                .await;
        }

        // A rerun of the group replaces the earlier child's correlation.
        assert!(registry.batch(first, old_child).await.is_none());
        assert!(registry.take_batch(first, old_child).await.is_none());
        assert_eq!(
            registry.take_batch(first, new_child).await.map(|b| b.child_id),
            Some(new_child)
        );
    }
}
