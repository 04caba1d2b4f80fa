//! Task CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use comfy_table::Cell;
use std::sync::Arc;
use uuid::Uuid;

use super::{build_orchestrator, drain_live_runs, open_pool};
use crate::adapters::sinks::ConsoleNotifier;
use crate::adapters::sqlite::{
    SqliteSubtaskRepository, SqliteTaskLogRepository, SqliteTaskRepository,
};
use crate::cli::display::{list_table, output, render_list, short_id, truncate, CommandOutput};
use crate::domain::models::{Config, Subtask, Task, TaskLog, TaskStatus};
use crate::domain::ports::{SubtaskRepository, TaskFilter, TaskLogRepository, TaskRepository};
use crate::services::StopMode;

#[derive(Args, Debug)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommands,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// List tasks
    List {
        /// Filter by status (inbox, planned, collaborating, in_progress, pending, review, done, cancelled)
        #[arg(short, long)]
        status: Option<String>,
        /// Filter by department id
        #[arg(short, long)]
        department: Option<String>,
        /// Maximum number of tasks to display
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },
    /// Show a task with its subtasks and recent log lines
    Show {
        /// Task ID
        task_id: Uuid,
        /// Number of log lines to show
        #[arg(long, default_value = "20")]
        logs: i64,
    },
    /// Pause a task; its worker is stopped and the task waits in pending
    Pause { task_id: Uuid },
    /// Cancel a task and everything it delegated
    Cancel { task_id: Uuid },
    /// Resume a paused or failed task
    Resume { task_id: Uuid },
}

#[derive(Debug, serde::Serialize)]
pub struct TaskListOutput {
    pub tasks: Vec<Task>,
    pub total: usize,
}

impl CommandOutput for TaskListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "status", "dept", "title", "source", "updated"]);
        for task in &self.tasks {
            let id = task.id.to_string();
            let source = task
                .source_task_id
                .map(|s| short_id(&s.to_string()).to_string())
                .unwrap_or_else(|| "-".to_string());
            table.add_row(vec![
                Cell::new(short_id(&id)),
                Cell::new(task.status.as_str()),
                Cell::new(task.department_id.as_deref().unwrap_or("-")),
                Cell::new(truncate(&task.title, 48)),
                Cell::new(source),
                Cell::new(task.updated_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            ]);
        }
        render_list("task", &table, self.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TaskDetailOutput {
    pub task: Task,
    pub subtasks: Vec<Subtask>,
    pub logs: Vec<TaskLog>,
}

impl CommandOutput for TaskDetailOutput {
    fn to_human(&self) -> String {
        let task = &self.task;
        let mut lines = vec![
            format!("Task: {}", task.title),
            format!("ID: {}", task.id),
            format!("Status: {}", task.status),
            format!("Department: {}", task.department_id.as_deref().unwrap_or("-")),
        ];
        if let Some(agent) = task.assigned_agent_id {
            lines.push(format!("Assigned: {agent}"));
        }
        if let Some(source) = task.source_task_id {
            lines.push(format!("Source task: {source}"));
        }
        if let Some(project) = &task.metadata.project {
            lines.push(format!("Project: {project}"));
        }
        if let Some(coordination) = &task.coordination {
            lines.push(format!(
                "Coordinating: {}",
                coordination.department_queue.join(" -> ")
            ));
        }
        lines.push(format!(
            "Created: {}",
            task.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        if let Some(completed) = task.completed_at {
            lines.push(format!(
                "Completed: {}",
                completed.format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }
        lines.push(format!("\n{}", task.description));

        if !task.metadata.checklist.is_empty() {
            lines.push(format!("\nChecklist ({}):", task.metadata.checklist.len()));
            for (i, item) in task.metadata.checklist.iter().enumerate() {
                lines.push(format!("  {}. {}", i + 1, item.title));
            }
        }

        if !self.subtasks.is_empty() {
            let mut table = list_table(&["id", "status", "target", "title", "delegated"]);
            for subtask in &self.subtasks {
                let id = subtask.id.to_string();
                let delegated = subtask
                    .delegated_task_id
                    .map(|d| short_id(&d.to_string()).to_string())
                    .unwrap_or_else(|| "-".to_string());
                let title = match &subtask.blocked_reason {
                    Some(reason) => format!("{} ({reason})", truncate(&subtask.title, 40)),
                    None => truncate(&subtask.title, 48),
                };
                table.add_row(vec![
                    Cell::new(short_id(&id)),
                    Cell::new(subtask.status.to_string()),
                    Cell::new(subtask.target_department_id.as_deref().unwrap_or("-")),
                    Cell::new(title),
                    Cell::new(delegated),
                ]);
            }
            lines.push(format!("\n{}", render_list("subtask", &table, self.subtasks.len())));
        }

        if !self.logs.is_empty() {
            lines.push("\nRecent log:".to_string());
            for log in &self.logs {
                lines.push(format!(
                    "  {} [{}] {}",
                    log.created_at.format("%H:%M:%S"),
                    log.kind.as_str(),
                    truncate(&log.message, 120)
                ));
            }
        }

        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TaskActionOutput {
    pub action: &'static str,
    pub task_id: Uuid,
    pub status: TaskStatus,
}

impl CommandOutput for TaskActionOutput {
    fn to_human(&self) -> String {
        format!(
            "{} {}: now {}",
            self.action,
            short_id(&self.task_id.to_string()),
            self.status
        )
    }
}

pub async fn execute(args: TaskArgs, config: &Config, json_mode: bool) -> Result<()> {
    let pool = open_pool(config).await?;

    match args.command {
        TaskCommands::List {
            status,
            department,
            limit,
        } => {
            let status = status
                .map(|s| {
                    TaskStatus::from_str(&s).ok_or_else(|| anyhow::anyhow!("Invalid status: {s}"))
                })
                .transpose()?;
            let tasks = SqliteTaskRepository::new(pool)
                .list(TaskFilter {
                    status,
                    department_id: department,
                    limit: Some(limit),
                    ..Default::default()
                })
                .await
                .context("Failed to list tasks")?;
            let total = tasks.len();
            output(&TaskListOutput { tasks, total }, json_mode);
        }
        TaskCommands::Show { task_id, logs } => {
            let task = SqliteTaskRepository::new(pool.clone())
                .get(task_id)
                .await
                .context("Failed to load task")?
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "Task {task_id} not found. Use 'taskforce task list' to see available tasks."
                    )
                })?;
            let subtasks = SqliteSubtaskRepository::new(pool.clone())
                .list_for_task(task_id)
                .await
                .context("Failed to load subtasks")?;
            let logs = SqliteTaskLogRepository::new(pool)
                .recent(task_id, logs)
                .await
                .context("Failed to load task logs")?;
            output(&TaskDetailOutput { task, subtasks, logs }, json_mode);
        }
        TaskCommands::Pause { task_id } => {
            control(config, pool, task_id, Some(StopMode::Pause), json_mode).await?;
        }
        TaskCommands::Cancel { task_id } => {
            control(config, pool, task_id, Some(StopMode::Cancel), json_mode).await?;
        }
        TaskCommands::Resume { task_id } => {
            control(config, pool, task_id, None, json_mode).await?;
        }
    }

    Ok(())
}

async fn control(
    config: &Config,
    pool: sqlx::SqlitePool,
    task_id: Uuid,
    stop: Option<StopMode>,
    json_mode: bool,
) -> Result<()> {
    let orchestrator = build_orchestrator(config, pool, Arc::new(ConsoleNotifier::new(json_mode)));
    let (action, task) = match stop {
        Some(mode) => {
            let task = orchestrator
                .request_stop(task_id, mode)
                .await
                .with_context(|| format!("Failed to {} task {task_id}", mode.as_str()))?;
            (
                if mode == StopMode::Pause {
                    "Paused"
                } else {
                    "Cancelled"
                },
                task,
            )
        }
        None => {
            let task = orchestrator
                .resume(task_id)
                .await
                .with_context(|| format!("Failed to resume task {task_id}"))?;
            drain_live_runs(&orchestrator).await;
            ("Resumed", task)
        }
    };

    output(
        &TaskActionOutput {
            action,
            task_id,
            status: task.status,
        },
        json_mode,
    );
    Ok(())
}
