//! Common test utilities for integration tests
//!
//! A [`Harness`] wires an orchestrator to a migrated in-memory database seeded
//! with the baseline roster, a mock worker spawner whose exits the test
//! drives by hand, and recording sinks.

#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use uuid::Uuid;

use taskforce::adapters::sqlite::create_migrated_test_pool;
use taskforce::adapters::workers::MockWorkerSpawner;
use taskforce::domain::errors::{DomainError, DomainResult};
use taskforce::domain::models::{Agent, OrchestratorConfig, Subtask, Task, TaskStatus};
use taskforce::domain::ports::{
    AgentFilter, AgentRepository, EventSink, Notifier, OrchestratorEvent, TaskFilter,
    TaskRepository,
};
use taskforce::services::{seed_roster, Orchestrator, OrchestratorSettings, Stores};

/// Notifier that keeps every notice.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<(String, Option<Uuid>)>>,
}

impl RecordingNotifier {
    pub fn texts(&self) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .map(|(text, _)| text.clone())
            .collect()
    }

    pub fn count(&self, text: &str) -> usize {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == text)
            .count()
    }

    pub fn for_task(&self, task_id: Uuid) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, id)| *id == Some(task_id))
            .map(|(text, _)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, text: &str, related_task_id: Option<Uuid>) {
        self.notices
            .lock()
            .unwrap()
            .push((text.to_string(), related_task_id));
    }
}

/// Event sink that keeps every event.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<OrchestratorEvent>>,
}

impl RecordingEventSink {
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(OrchestratorEvent::name).collect()
    }

    pub fn task_statuses(&self, task_id: Uuid) -> Vec<TaskStatus> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                OrchestratorEvent::TaskUpdate(task) if task.id == task_id => Some(task.status),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: OrchestratorEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Number of calls left that fail with write contention.
#[derive(Default)]
pub struct Contention(AtomicUsize);

impl Contention {
    fn hit(&self) -> DomainResult<()> {
        let contended = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if contended {
            return Err(DomainError::WriteContention("database is locked".to_string()));
        }
        Ok(())
    }
}

/// Task store whose first writes fail with write contention.
pub struct ContendedTasks {
    inner: Arc<dyn TaskRepository>,
    creates: Contention,
    updates: Contention,
}

impl ContendedTasks {
    pub fn new(inner: Arc<dyn TaskRepository>) -> Self {
        Self {
            inner,
            creates: Contention::default(),
            updates: Contention::default(),
        }
    }

    pub fn failing_creates(self, count: usize) -> Self {
        self.creates.0.store(count, Ordering::SeqCst);
        self
    }

    pub fn failing_updates(self, count: usize) -> Self {
        self.updates.0.store(count, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl TaskRepository for ContendedTasks {
    async fn create(&self, task: &Task) -> DomainResult<()> {
        self.creates.hit()?;
        self.inner.create(task).await
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>> {
        self.inner.get(id).await
    }

    async fn update(&self, task: &Task) -> DomainResult<()> {
        self.updates.hit()?;
        self.inner.update(task).await
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        self.inner.delete(id).await
    }

    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<Task>> {
        self.inner.list(filter).await
    }

    async fn list_by_status(&self, status: TaskStatus) -> DomainResult<Vec<Task>> {
        self.inner.list_by_status(status).await
    }

    async fn children_of(&self, source_task_id: Uuid) -> DomainResult<Vec<Task>> {
        self.inner.children_of(source_task_id).await
    }

    async fn list_coordinating(&self) -> DomainResult<Vec<Task>> {
        self.inner.list_coordinating().await
    }
}

/// Agent store whose first updates fail with write contention.
pub struct ContendedAgents {
    inner: Arc<dyn AgentRepository>,
    updates: Contention,
}

impl ContendedAgents {
    pub fn new(inner: Arc<dyn AgentRepository>, failing_updates: usize) -> Self {
        Self {
            inner,
            updates: Contention(AtomicUsize::new(failing_updates)),
        }
    }
}

#[async_trait]
impl AgentRepository for ContendedAgents {
    async fn create(&self, agent: &Agent) -> DomainResult<()> {
        self.inner.create(agent).await
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Agent>> {
        self.inner.get(id).await
    }

    async fn update(&self, agent: &Agent) -> DomainResult<()> {
        self.updates.hit()?;
        self.inner.update(agent).await
    }

    async fn list(&self, filter: AgentFilter) -> DomainResult<Vec<Agent>> {
        self.inner.list(filter).await
    }

    async fn holding_task(&self, task_id: Uuid) -> DomainResult<Vec<Agent>> {
        self.inner.holding_task(task_id).await
    }
}

pub struct Harness {
    pub pool: SqlitePool,
    pub stores: Stores,
    pub spawner: MockWorkerSpawner,
    pub notifier: Arc<RecordingNotifier>,
    pub events: Arc<RecordingEventSink>,
    pub orchestrator: Orchestrator,
    pub logs_dir: PathBuf,
    _logs: Arc<TempDir>,
}

/// Settings with pacing off and recovery thresholds at zero.
pub fn test_settings(logs_dir: &std::path::Path) -> OrchestratorSettings {
    let mut settings = OrchestratorSettings::default();
    settings.orchestrator = OrchestratorConfig {
        stale_grace_secs: 0,
        activity_window_secs: 0,
        ..OrchestratorConfig::default().without_pacing()
    };
    settings.workers.logs_dir = logs_dir.to_string_lossy().into_owned();
    settings
}

impl Harness {
    /// Fresh database with the baseline roster.
    pub async fn new() -> Self {
        let pool = create_migrated_test_pool().await.expect("test pool");
        let stores = Stores::sqlite(pool.clone());
        seed_roster(stores.departments.as_ref(), stores.agents.as_ref(), "claude")
            .await
            .expect("seed roster");
        let logs = Arc::new(tempfile::tempdir().expect("temp dir"));
        Self::assemble(pool.clone(), Stores::sqlite(pool), logs, test_settings)
    }

    /// Same as [`Harness::new`] with the orchestrator's stores swapped.
    ///
    /// `h.stores` keeps the plain SQLite stores for assertions.
    pub async fn with_stores(adjust: impl FnOnce(Stores) -> Stores) -> Self {
        let harness = Self::new().await;
        let settings = harness.orchestrator.settings().clone();
        let stores = adjust(Stores::sqlite(harness.pool.clone()));
        Self::assemble(harness.pool, stores, harness._logs, move |_| settings)
    }

    /// Same as [`Harness::new`] with adjusted settings.
    pub async fn with_settings(adjust: impl FnOnce(&mut OrchestratorSettings)) -> Self {
        let harness = Self::new().await;
        let mut settings = harness.orchestrator.settings().clone();
        adjust(&mut settings);
        harness.rebuild(settings)
    }

    fn assemble(
        pool: SqlitePool,
        wired: Stores,
        logs: Arc<TempDir>,
        settings: impl FnOnce(&std::path::Path) -> OrchestratorSettings,
    ) -> Self {
        let settings = settings(logs.path());
        let stores = Stores::sqlite(pool.clone());
        let spawner = MockWorkerSpawner::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let events = Arc::new(RecordingEventSink::default());
        let orchestrator = Orchestrator::new(
            wired,
            Arc::new(spawner.clone()),
            Arc::new(spawner.clone()),
            settings,
        )
        .with_notifier(notifier.clone())
        .with_events(events.clone());

        Self {
            pool,
            stores,
            spawner,
            notifier,
            events,
            orchestrator,
            logs_dir: logs.path().to_path_buf(),
            _logs: logs,
        }
    }

    fn rebuild(self, settings: OrchestratorSettings) -> Self {
        let stores = Stores::sqlite(self.pool.clone());
        Self::assemble(self.pool, stores, self._logs, move |_| settings)
    }

    /// A new process over the same database: empty registry, no live workers.
    pub fn restart(&self) -> Self {
        let settings = self.orchestrator.settings().clone();
        let stores = Stores::sqlite(self.pool.clone());
        Self::assemble(self.pool.clone(), stores, self._logs.clone(), move |_| settings)
    }

    pub async fn task(&self, id: Uuid) -> Task {
        self.stores.tasks.get(id).await.unwrap().expect("task exists")
    }

    pub async fn subtasks(&self, task_id: Uuid) -> Vec<Subtask> {
        self.stores.subtasks.list_for_task(task_id).await.unwrap()
    }

    pub async fn children(&self, task_id: Uuid) -> Vec<Task> {
        self.stores.tasks.children_of(task_id).await.unwrap()
    }

    pub async fn agent(&self, id: Uuid) -> Agent {
        self.stores.agents.get(id).await.unwrap().expect("agent exists")
    }

    pub async fn leader(&self, department_id: &str) -> Agent {
        self.orchestrator
            .directory()
            .leader_of(department_id)
            .await
            .unwrap()
            .expect("department has a leader")
    }

    /// Mark every agent of a department as holding some other task.
    pub async fn occupy_department(&self, department_id: &str) -> Uuid {
        let elsewhere = Uuid::new_v4();
        for mut agent in self.department_agents(department_id).await {
            agent.occupy(elsewhere);
            self.stores.agents.update(&agent).await.unwrap();
        }
        elsewhere
    }

    /// Undo [`Harness::occupy_department`].
    pub async fn free_department(&self, department_id: &str, elsewhere: Uuid) {
        for mut agent in self.department_agents(department_id).await {
            if agent.release(elsewhere) {
                self.stores.agents.update(&agent).await.unwrap();
            }
        }
    }

    async fn department_agents(&self, department_id: &str) -> Vec<Agent> {
        self.stores
            .agents
            .list(AgentFilter {
                department_id: Some(department_id.to_string()),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    pub async fn log_messages(&self, task_id: Uuid) -> Vec<String> {
        self.stores
            .logs
            .recent(task_id, 200)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.message)
            .collect()
    }

    /// Wait until `task_id` reaches `status`.
    pub async fn wait_for_status(&self, task_id: Uuid, status: TaskStatus) -> bool {
        let tasks = self.stores.tasks.clone();
        wait_until(
            || {
                let tasks = tasks.clone();
                async move {
                    matches!(tasks.get(task_id).await, Ok(Some(t)) if t.status == status)
                }
            },
            3_000,
        )
        .await
    }

    /// Wait for a child of `parent_id` in `department_id` with a running worker.
    pub async fn wait_for_child(&self, parent_id: Uuid, department_id: &str) -> Task {
        let tasks = self.stores.tasks.clone();
        let spawner = self.spawner.clone();
        let department = department_id.to_string();
        let found = Arc::new(Mutex::new(None));
        let slot = found.clone();
        let ready = wait_until(
            move || {
                let tasks = tasks.clone();
                let spawner = spawner.clone();
                let department = department.clone();
                let slot = slot.clone();
                async move {
                    let children = tasks.children_of(parent_id).await.unwrap_or_default();
                    let child = children.into_iter().find(|c| {
                        c.department_id.as_deref() == Some(department.as_str())
                            && spawner.is_running(c.id)
                    });
                    let hit = child.is_some();
                    *slot.lock().unwrap() = child;
                    hit
                }
            },
            3_000,
        )
        .await;
        assert!(ready, "no running {department_id} child of {parent_id}");
        let child = found.lock().unwrap().take();
        child.expect("child recorded")
    }

    /// Wait until a worker for `task_id` is running.
    pub async fn wait_for_worker(&self, task_id: Uuid) -> bool {
        let spawner = self.spawner.clone();
        wait_until(move || std::future::ready(spawner.is_running(task_id)), 3_000).await
    }

    /// Finish the running worker of `task_id` and wait for its exit to be handled.
    pub async fn finish_worker(&self, task_id: Uuid, exit_code: i32) {
        assert!(
            self.spawner.complete(task_id, exit_code),
            "no worker running for {task_id}"
        );
        let orchestrator = self.orchestrator.clone();
        let tasks = self.stores.tasks.clone();
        let handled = wait_until(
            move || {
                let orchestrator = orchestrator.clone();
                let tasks = tasks.clone();
                async move {
                    orchestrator.registry().live_run(task_id).await.is_none()
                        && matches!(
                            tasks.get(task_id).await,
                            Ok(Some(t)) if t.status != TaskStatus::InProgress
                        )
                }
            },
            3_000,
        )
        .await;
        assert!(handled, "exit of {task_id} was not handled");
    }
}

/// Initialize tracing output for tests that need it.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Poll an async predicate every 20ms until it holds or the timeout passes.
pub async fn wait_until<F, Fut>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let timeout = Duration::from_millis(timeout_ms);
    while start.elapsed() < timeout {
        if predicate().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
