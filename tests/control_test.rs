//! Operator pause, cancel and resume.

mod common;

use common::Harness;
use taskforce::domain::errors::DomainError;
use taskforce::domain::models::{AgentStatus, Directive, PlanItem, SubtaskStatus, TaskStatus};
use taskforce::services::{DirectiveOutcome, StopMode};
use uuid::Uuid;

async fn submit(h: &Harness, directive: Directive) -> Uuid {
    match h.orchestrator.submit_directive(directive).await.unwrap() {
        DirectiveOutcome::Delegated { task_id, .. } => task_id,
        other => panic!("expected delegation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_pause_stops_worker_and_resume_reruns() {
    let h = Harness::new().await;
    let task_id = submit(
        &h,
        Directive::new("Build the metrics exporter").for_department("dev"),
    )
    .await;
    let executor_id = h.task(task_id).await.assigned_agent_id.unwrap();

    h.orchestrator
        .request_stop(task_id, StopMode::Pause)
        .await
        .unwrap();
    assert!(h.wait_for_status(task_id, TaskStatus::Pending).await);
    assert!(!h.spawner.is_running(task_id));
    assert_eq!(h.agent(executor_id).await.status, AgentStatus::Idle);
    assert_eq!(h.notifier.count("Task paused: Build the metrics exporter"), 1);

    let resumed = h.orchestrator.resume(task_id).await.unwrap();
    assert_eq!(resumed.status, TaskStatus::InProgress);
    assert!(h.spawner.is_running(task_id));
    assert_eq!(h.spawner.spawn_count(task_id), 2);

    h.finish_worker(task_id, 0).await;
    assert!(h.wait_for_status(task_id, TaskStatus::Done).await);
}

#[tokio::test]
async fn test_cancel_running_task() {
    let h = Harness::new().await;
    let task_id = submit(
        &h,
        Directive::new("Deploy the preview environment").for_department("operations"),
    )
    .await;

    h.orchestrator
        .request_stop(task_id, StopMode::Cancel)
        .await
        .unwrap();

    assert!(h.wait_for_status(task_id, TaskStatus::Cancelled).await);
    assert!(h.task(task_id).await.completed_at.is_some());
    assert_eq!(
        h.notifier.count("Task cancelled: Deploy the preview environment"),
        1
    );
    assert_eq!(
        h.notifier
            .count("Task failed (exit code 143): Deploy the preview environment"),
        0
    );
}

#[tokio::test]
async fn test_cancel_reaches_delegated_children() {
    let h = Harness::new().await;
    let directive = Directive::new("Build the referral program")
        .for_department("dev")
        .with_plan(vec![
            PlanItem::new("Referral badge artwork").targeting("design"),
            PlanItem::new("Invite email layout").targeting("design"),
        ]);
    let parent_id = submit(&h, directive).await;
    h.finish_worker(parent_id, 0).await;
    let child = h.wait_for_child(parent_id, "design").await;

    let parent = h
        .orchestrator
        .request_stop(parent_id, StopMode::Cancel)
        .await
        .unwrap();
    assert_eq!(parent.status, TaskStatus::Cancelled);

    assert!(h.wait_for_status(child.id, TaskStatus::Cancelled).await);
    let harness = &h;
    let subtasks_blocked = common::wait_until(
        move || async move {
            harness
                .subtasks(parent_id)
                .await
                .iter()
                .all(|s| s.status == SubtaskStatus::Blocked)
        },
        3_000,
    )
    .await;
    assert!(subtasks_blocked);
    for subtask in h.subtasks(parent_id).await {
        assert_eq!(subtask.blocked_reason.as_deref(), Some("cancelled"));
    }
    assert_eq!(h.orchestrator.live_runs().await, 0);
}

#[tokio::test]
async fn test_paused_batch_keeps_its_group_until_resume() {
    let h = Harness::new().await;
    let directive = Directive::new("Build the loyalty dashboard")
        .for_department("dev")
        .with_plan(vec![
            PlanItem::new("Tier badge artwork").targeting("design"),
            PlanItem::new("Dashboard empty states").targeting("design"),
        ]);
    let parent_id = submit(&h, directive).await;
    h.finish_worker(parent_id, 0).await;
    let child = h.wait_for_child(parent_id, "design").await;
    let first_subtask_id = child.metadata.checklist[0].subtask_id;

    let parent = h
        .orchestrator
        .request_stop(parent_id, StopMode::Pause)
        .await
        .unwrap();
    assert_eq!(parent.status, TaskStatus::Review);

    // The terminated child exits non-zero under a pause.
    assert!(h.wait_for_status(child.id, TaskStatus::Pending).await);
    let orchestrator = h.orchestrator.clone();
    let child_id = child.id;
    let released = common::wait_until(
        move || {
            let orchestrator = orchestrator.clone();
            async move { orchestrator.registry().live_run(child_id).await.is_none() }
        },
        3_000,
    )
    .await;
    assert!(released);
    for subtask in h.subtasks(parent_id).await {
        assert_eq!(subtask.status, SubtaskStatus::InProgress);
        assert_eq!(subtask.delegated_task_id, Some(child.id));
    }
    assert!(h
        .orchestrator
        .registry()
        .batch(first_subtask_id, child.id)
        .await
        .is_some());
    assert_eq!(
        h.notifier
            .count("Task failed (exit code 143): [Design] Build the loyalty dashboard"),
        0
    );

    let resumed = h.orchestrator.resume(parent_id).await.unwrap();
    assert_eq!(resumed.status, TaskStatus::Review);
    assert!(h.wait_for_worker(child.id).await);
    assert_eq!(h.spawner.spawn_count(child.id), 2);
    assert_eq!(h.children(parent_id).await.len(), 1);

    h.finish_worker(child.id, 0).await;
    assert!(h.wait_for_status(parent_id, TaskStatus::Done).await);
    assert!(h
        .subtasks(parent_id)
        .await
        .iter()
        .all(|s| s.status == SubtaskStatus::Done));
    assert!(h
        .orchestrator
        .registry()
        .batch(first_subtask_id, child.id)
        .await
        .is_none());
    assert_eq!(
        h.notifier.count("All subtasks are complete: Build the loyalty dashboard"),
        1
    );
    assert_eq!(h.notifier.count("Task completed: Build the loyalty dashboard"), 1);
}

#[tokio::test]
async fn test_resume_reopens_blocked_subtasks() {
    let h = Harness::new().await;
    let directive = Directive::new("Refactor the billing module")
        .for_department("dev")
        .with_plan(vec![PlanItem::new("Split the invoice service")]);
    let task_id = submit(&h, directive).await;
    h.finish_worker(task_id, 1).await;
    assert_eq!(h.subtasks(task_id).await[0].status, SubtaskStatus::Blocked);

    let resumed = h.orchestrator.resume(task_id).await.unwrap();

    assert_eq!(resumed.status, TaskStatus::InProgress);
    let subtask = &h.subtasks(task_id).await[0];
    assert_eq!(subtask.status, SubtaskStatus::Pending);
    assert_eq!(subtask.blocked_reason, None);

    h.finish_worker(task_id, 0).await;
    assert!(h.wait_for_status(task_id, TaskStatus::Done).await);
    assert_eq!(h.subtasks(task_id).await[0].status, SubtaskStatus::Done);
}

#[tokio::test]
async fn test_finished_tasks_reject_controls() {
    let h = Harness::new().await;
    let task_id = submit(
        &h,
        Directive::new("Write the incident summary").for_department("planning"),
    )
    .await;
    h.finish_worker(task_id, 0).await;
    assert!(h.wait_for_status(task_id, TaskStatus::Done).await);

    let err = h
        .orchestrator
        .request_stop(task_id, StopMode::Pause)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidStateTransition { .. }));

    let err = h.orchestrator.resume(task_id).await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidStateTransition { .. }));

    let err = h
        .orchestrator
        .request_stop(Uuid::new_v4(), StopMode::Cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::TaskNotFound(_)));
}
