//! Directive intake, delegation, worker runs and exit handling.

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use uuid::Uuid;

use super::prompt::build_prompt;
use super::Orchestrator;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    delegation_order, AfterCoordination, Agent, Department, Directive, DirectivePolicy, Locale,
    LogKind, RunMarker, SkipReason, Subtask, SubtaskStatus, Task, TaskMetadata, TaskStatus,
};
use crate::domain::ports::{AgentFilter, WorkerHandle, WorkerRequest};
use crate::services::directive_policy::{classify, detect_locale};
use crate::services::notices::Notice;
use crate::services::registry::StopMode;

/// What became of a submitted directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DirectiveOutcome {
    /// Noted without creating work.
    Skipped { reason: SkipReason },
    /// A task was created and handed to a department.
    Delegated {
        task_id: Uuid,
        department_id: String,
        executor_id: Uuid,
    },
}

/// How a delegation proceeds after the task is created.
#[derive(Debug, Clone, Default)]
pub struct DelegateOptions {
    pub policy: DirectivePolicy,
    /// Departments consulted, in order, before the owning department runs.
    pub cross_departments: Vec<String>,
}

impl Orchestrator {
    // ------------------------------------------------------------------
    // Intake
    // ------------------------------------------------------------------

    /// Classify a directive and, when it implies work, delegate it.
    ///
    /// A keyed directive is processed at most once. When processing fails
    /// before its task is stored the receipt is dropped again, so a retry
    /// after write contention goes through. Once the task exists a replay
    /// reports [`DomainError::DuplicateDirective`] with its id.
    pub async fn submit_directive(&self, directive: Directive) -> DomainResult<DirectiveOutcome> {
        let Some(key) = directive.idempotency_key.clone() else {
            return self.process_directive(directive).await;
        };
        self.receipts.record(&key).await?;

        let outcome = self.process_directive(directive).await;
        if outcome.is_err() {
            if let Err(e) = self.receipts.release(&key).await {
                tracing::warn!(key = %key, error = %e, "failed to release directive receipt");
            }
        }
        outcome
    }

    async fn process_directive(&self, directive: Directive) -> DomainResult<DirectiveOutcome> {
        let policy = classify(&directive.text);
        if policy.skip_delegation {
            let reason = policy.reason.unwrap_or(SkipReason::Lightweight);
            tracing::info!(reason = ?reason, "directive noted without delegation");
            let text =
                Notice::DirectiveSkipped { reason }.render(self.directive_locale(&directive));
            self.notifier.notify(&text, None).await;
            return Ok(DirectiveOutcome::Skipped { reason });
        }

        let department = match directive.department_id.as_deref() {
            Some(key) => self
                .directory
                .department(key)
                .await?
                .ok_or_else(|| DomainError::DepartmentNotFound(key.to_string()))?,
            None => match self.directory.detect_department(&directive.text).await? {
                Some(department) => department,
                None => self.fallback_department().await?,
            },
        };

        let lead = match self.directory.leader_of(&department.id).await? {
            Some(lead) => lead,
            None => self.best_member(&department.id).await?,
        };

        let cross_departments: Vec<String> = self
            .directory
            .mentioned_departments(&directive.text)
            .await?
            .into_iter()
            .map(|d| d.id)
            .filter(|id| *id != department.id)
            .collect();

        let task = self
            .delegate(
                &lead,
                &directive,
                DelegateOptions {
                    policy,
                    cross_departments,
                },
            )
            .await?;

        Ok(DirectiveOutcome::Delegated {
            task_id: task.id,
            department_id: department.id,
            executor_id: task.assigned_agent_id.unwrap_or(lead.id),
        })
    }

    /// Detected language of a directive; English text falls back to the operator locale.
    fn directive_locale(&self, directive: &Directive) -> Locale {
        match detect_locale(&directive.text) {
            Locale::En => self.settings.locale,
            detected => detected,
        }
    }

    async fn fallback_department(&self) -> DomainResult<Department> {
        let departments = self.directory.departments().await?;
        departments
            .iter()
            .find(|d| d.id == "planning")
            .or_else(|| departments.first())
            .cloned()
            .ok_or_else(|| DomainError::DepartmentNotFound("any".to_string()))
    }

    async fn best_member(&self, department_id: &str) -> DomainResult<Agent> {
        let mut members = self
            .agents
            .list(AgentFilter {
                department_id: Some(department_id.to_string()),
                ..Default::default()
            })
            .await?;
        members.sort_by(delegation_order);
        members.into_iter().next().ok_or_else(|| {
            DomainError::ValidationFailed(format!("department {department_id} has no agents"))
        })
    }

    // ------------------------------------------------------------------
    // Delegation
    // ------------------------------------------------------------------

    /// Create a task for `lead`'s department and start it.
    ///
    /// Worker failures never surface here; they arrive through the exit path.
    pub async fn delegate(
        &self,
        lead: &Agent,
        directive: &Directive,
        options: DelegateOptions,
    ) -> DomainResult<Task> {
        let executor = self.directory.pick_executor(lead).await?;
        let locale = self.directive_locale(directive);

        let mut task = Task::new(directive.text.clone())
            .with_department(lead.department_id.clone())
            .with_metadata(TaskMetadata {
                project: directive.project.clone(),
                round_goal: directive.round_goal.clone(),
                requested_by: directive.requested_by.clone(),
                checklist: Vec::new(),
                skip_planned_meeting: options.policy.skip_planned_meeting,
                locale: Some(locale),
            });
        task.project_id = directive.project.clone();
        task.project_path = directive.project_path.clone();
        task.assigned_agent_id = Some(executor.id);

        if let Some(key) = directive.idempotency_key.as_deref() {
            self.receipts.attach_task(key, task.id).await?;
        }
        self.tasks.create(&task).await?;
        self.audit_creation(&task, "directive", Some(lead.name.clone()), Some(lead.id))
            .await;
        self.emit_task(&task);
        tracing::info!(
            task_id = %task.id,
            department = %lead.department_id,
            lead = %lead.name,
            executor = %executor.name,
            "task delegated"
        );

        let department_name = self.department_name(&lead.department_id).await;
        self.notify_task(
            &task,
            Notice::Accepted {
                department: &department_name,
                title: &task.title,
            },
        )
        .await;

        if !options.policy.skip_plan_subtasks {
            task = self.plan(task, directive).await?;
        }

        if let Some(mode) = self.stop_requested(&task).await {
            tracing::info!(task_id = %task.id, mode = mode.as_str(), "delegation abandoned by stop request");
            return self.apply_stop(task, mode).await;
        }

        if !options.cross_departments.is_empty() {
            self.start_coordination(
                task.id,
                options.cross_departments,
                AfterCoordination::RunParent,
            )
            .await?;
        } else if let Err(e) = self.run_task(task.id, executor.id).await {
            self.defer_refused(task.id, e).await?;
        }

        self.load_task(task.id).await
    }

    /// Planning phase: planned status, the planned meeting, plan subtasks.
    async fn plan(&self, task: Task, directive: &Directive) -> DomainResult<Task> {
        let task = self.set_task_status(task.id, TaskStatus::Planned).await?;

        if !task.metadata.skip_planned_meeting {
            Self::pace(self.settings.orchestrator.meeting_delay_ms).await;
        }

        let mut created = Vec::with_capacity(directive.plan.len());
        for item in &directive.plan {
            let mut subtask = Subtask::new(task.id, item.title.clone());
            subtask.description = item.description.clone();
            subtask.target_department_id = item
                .target_department_id
                .clone()
                .or_else(|| task.department_id.clone());
            self.subtasks.create(&subtask).await?;
            created.push(subtask);
        }
        if !created.is_empty() {
            self.emit_subtasks(&created);
            self.log_system(task.id, &format!("Planned {} subtasks", created.len()))
                .await;
        }

        self.load_task(task.id).await
    }

    /// A refused dispatch leaves the task where it is, marked deferred for the
    /// sweep to pick up again. Anything else propagates.
    pub(super) async fn defer_refused(
        &self,
        task_id: Uuid,
        error: DomainError,
    ) -> DomainResult<()> {
        match error {
            DomainError::DispatchRefused { reason, .. } => {
                let live = self.registry.live_run(task_id).await;
                if live.is_some_and(|run| !run.exiting) {
                    tracing::debug!(task_id = %task_id, "dispatch skipped; worker already live");
                    return Ok(());
                }
                tracing::warn!(task_id = %task_id, reason = %reason, "dispatch deferred");
                self.log_system(task_id, &RunMarker::deferred_line(&reason))
                    .await;
                Ok(())
            }
            other => Err(other),
        }
    }

    // ------------------------------------------------------------------
    // Worker runs
    // ------------------------------------------------------------------

    /// Start one worker run of `task_id` executed by `agent_id`.
    ///
    /// Refused with [`DomainError::DispatchRefused`] when the task already has a
    /// live worker or the agent holds a different task. A spawn failure is not
    /// an error: it is logged as run evidence and finalized as a failed run.
    pub async fn run_task(&self, task_id: Uuid, agent_id: Uuid) -> DomainResult<()> {
        let task = self.load_task(task_id).await?;
        let agent = self.load_agent(agent_id).await?;

        if agent.is_busy_elsewhere(task.id) {
            return Err(DomainError::DispatchRefused {
                task_id,
                reason: format!("agent {} is busy with another task", agent.name),
            });
        }
        if !self.registry.claim_run(task.id, agent.id).await {
            return Err(DomainError::DispatchRefused {
                task_id,
                reason: "a worker is already running".to_string(),
            });
        }

        let request = match self.prepare_run(task.clone(), agent.clone()).await {
            Ok(request) => request,
            Err(e) => {
                self.abandon_claim(&task).await;
                return Err(e);
            }
        };

        self.log_system(task.id, &RunMarker::start_line(&agent.name, &agent.provider))
            .await;

        match self.spawner.spawn(request).await {
            Ok(handle) => {
                tracing::info!(task_id = %task.id, agent = %agent.name, pid = ?handle.pid, "worker started");
                self.registry.set_pid(task.id, handle.pid).await;
                self.watch(task.id, handle);
                Ok(())
            }
            Err(e) => {
                let reason = match e {
                    DomainError::SpawnFailed(reason) => reason,
                    other => other.to_string(),
                };
                tracing::error!(task_id = %task.id, reason = %reason, "worker spawn failed");
                self.log_system(task.id, &RunMarker::spawn_failed_line(&reason))
                    .await;
                self.registry.mark_exiting(task.id).await;
                let finished = self.finish_run(task.id, -1).await;
                self.registry.release_exiting(task.id).await;
                finished
            }
        }
    }

    /// Move a claimed task to `in_progress`, occupy its executor and build the
    /// worker request.
    async fn prepare_run(&self, mut task: Task, mut agent: Agent) -> DomainResult<WorkerRequest> {
        Self::transition(&mut task, TaskStatus::InProgress)?;
        task.assigned_agent_id = Some(agent.id);
        self.save_task(&task).await?;

        agent.occupy(task.id);
        self.agents.update(&agent).await?;
        self.emit_agent(&agent);

        let department_name = self.department_name(&agent.department_id).await;
        let subtasks = self.subtasks.list_for_task(task.id).await?;
        Ok(WorkerRequest {
            task_id: task.id,
            provider: agent.provider.clone(),
            prompt: build_prompt(&task, &agent, &department_name, &subtasks),
            working_dir: self.working_dir(&task),
            log_path: self.log_path(task.id),
        })
    }

    /// Undo a claim whose worker never started. The task row goes back to
    /// `original` and its executor is freed. Failures here are logged only.
    async fn abandon_claim(&self, original: &Task) {
        self.registry.release_run(original.id).await;
        match self.tasks.get(original.id).await {
            Ok(Some(current)) if current.status != original.status => {
                if let Err(e) = self.save_task(original).await {
                    tracing::warn!(task_id = %original.id, error = %e, "failed to restore task after aborted run");
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(task_id = %original.id, error = %e, "failed to reload task after aborted run");
            }
        }
        self.release_executor(original.id).await;
    }

    /// Drain worker output into the task log, then handle the exit.
    fn watch(&self, task_id: Uuid, mut handle: WorkerHandle) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Some(mut output) = handle.output.take() {
                while let Some(line) = output.recv().await {
                    if let Err(e) = this.logs.append(task_id, LogKind::Output, &line).await {
                        tracing::debug!(task_id = %task_id, error = %e, "dropped worker output line");
                    }
                }
            }
            let exit_code = handle.wait().await;
            if let Err(e) = this.on_worker_exit(task_id, exit_code).await {
                tracing::error!(task_id = %task_id, exit_code, error = %e, "exit handling failed");
            }
        });
    }

    /// Exit callback of a worker run.
    ///
    /// The exit marker is written and the run finalized while the claim is
    /// still held, so the sweep never sees the task without both. A rerun
    /// started meanwhile takes over the claim.
    pub(super) fn on_worker_exit(
        &self,
        task_id: Uuid,
        exit_code: i32,
    ) -> BoxFuture<'_, DomainResult<()>> {
        async move {
            self.registry.mark_exiting(task_id).await;
            tracing::info!(task_id = %task_id, exit_code, "worker exited");
            self.log_system(task_id, &RunMarker::exit_line(exit_code)).await;
            let finished = self.finish_run(task_id, exit_code).await;
            self.registry.release_exiting(task_id).await;
            finished
        }
        .boxed()
    }

    /// Finalize a run from its exit code. Also used by recovery to replay exits.
    pub(super) fn finish_run(
        &self,
        task_id: Uuid,
        exit_code: i32,
    ) -> BoxFuture<'_, DomainResult<()>> {
        async move {
            let Some(task) = self.tasks.get(task_id).await? else {
                return Ok(());
            };
            if task.status != TaskStatus::InProgress {
                tracing::debug!(task_id = %task_id, status = %task.status, "exit for task not in progress");
                self.release_executor(task_id).await;
                return Ok(());
            }

            match self.stop_requested(&task).await {
                Some(StopMode::Cancel) => {
                    self.cancel_after_exit(task).await?;
                    return Ok(());
                }
                Some(StopMode::Pause) if exit_code != 0 => {
                    self.pause_after_exit(task).await?;
                    return Ok(());
                }
                _ => {}
            }

            let batched = self.has_batch(&task).await
                || !self.subtasks.list_by_delegated_task(task.id).await?.is_empty();
            if batched {
                self.finalize_batch(&task, exit_code).await?;
            } else {
                self.finalize_direct(&task, exit_code).await?;
            }

            if let Some(parent_id) = task.source_task_id {
                self.reconcile(parent_id).await?;
            }

            if let Some(hook) = self.registry.take_hook(task.id).await {
                let child = self.load_task(task.id).await?;
                if matches!(child.status, TaskStatus::Done | TaskStatus::Review) {
                    self.coordination_step(hook.parent_id, hook.index + 1, false)
                        .await?;
                } else {
                    tracing::warn!(
                        parent_id = %hook.parent_id,
                        child_id = %task.id,
                        "coordination halted on failed department"
                    );
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// Direct finalization of a task without linked subtasks.
    async fn finalize_direct(&self, task: &Task, exit_code: i32) -> DomainResult<()> {
        if exit_code == 0 {
            if task.is_delegated() {
                self.set_task_status(task.id, TaskStatus::Done).await?;
                self.release_executor(task.id).await;
                return Ok(());
            }

            self.set_task_status(task.id, TaskStatus::Review).await?;
            self.release_executor(task.id).await;

            let department = task.department_id.as_deref();
            let local: Vec<Uuid> = self
                .subtasks
                .list_for_task(task.id)
                .await?
                .into_iter()
                .filter(|s| {
                    s.status != SubtaskStatus::Done
                        && s.delegated_task_id.is_none()
                        && !s.is_foreign_to(department)
                })
                .map(|s| s.id)
                .collect();
            if !local.is_empty() {
                let written = self
                    .subtasks
                    .set_status_many(&local, SubtaskStatus::Done, None)
                    .await?;
                self.emit_subtasks(&written);
            }
            return self.finalize_review(task.id).await;
        }

        let failed = self.set_task_status(task.id, TaskStatus::Inbox).await?;
        self.release_executor(task.id).await;

        let open: Vec<Uuid> = self
            .subtasks
            .list_for_task(task.id)
            .await?
            .into_iter()
            .filter(|s| s.status != SubtaskStatus::Done && s.delegated_task_id.is_none())
            .map(|s| s.id)
            .collect();
        if !open.is_empty() {
            let reason = format!("exit code {exit_code}");
            let written = self
                .subtasks
                .set_status_many(&open, SubtaskStatus::Blocked, Some(&reason))
                .await?;
            self.emit_subtasks(&written);
        }

        tracing::warn!(task_id = %task.id, exit_code, "task failed");
        self.notify_task(
            &failed,
            Notice::TaskFailed {
                title: &failed.title,
                exit_code,
            },
        )
        .await;
        Ok(())
    }

    /// Close out a task whose worker succeeded: done once nothing remains.
    ///
    /// Foreign pending subtasks are handed to the batched delegator first.
    pub async fn finalize_review(&self, task_id: Uuid) -> DomainResult<()> {
        let task = self.load_task(task_id).await?;
        if task.status != TaskStatus::Review {
            return Ok(());
        }
        if self.stop_requested(&task).await.is_some() {
            tracing::debug!(task_id = %task_id, "review finalization held by stop request");
            return Ok(());
        }

        let department = task.department_id.as_deref();
        let subtasks = self.subtasks.list_for_task(task.id).await?;
        if subtasks.iter().any(|s| s.is_delegable(department)) {
            return self.dispatch_next_batch(task.id).await;
        }

        if self.subtasks.count_remaining(task.id).await? > 0 {
            tracing::debug!(task_id = %task_id, "review waiting on open subtasks");
            return Ok(());
        }

        let mut task = task;
        Self::transition(&mut task, TaskStatus::Done)?;
        task.coordination = None;
        self.save_task(&task).await?;
        tracing::info!(task_id = %task.id, "task completed");
        self.notify_task(&task, Notice::TaskCompleted { title: &task.title })
            .await;
        Ok(())
    }
}
