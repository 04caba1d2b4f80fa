//! Implementation of the `taskforce serve` command.
//!
//! Runs startup recovery, starts the periodic sweeper, and then reads one
//! input per stdin line:
//!
//! - `text` or `@department text`: a directive
//! - `{...}`: a directive as JSON, including plan items
//! - `/pause <id>`, `/cancel <id>`, `/resume <id>`: operator controls
//! - `/sweep`: an immediate recovery sweep

use anyhow::{Context, Result};
use backoff::ExponentialBackoffBuilder;
use clap::Args;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use super::{build_orchestrator, drain_live_runs, open_pool};
use crate::adapters::sinks::{BroadcastEventSink, ConsoleNotifier};
use crate::cli::display::{output, short_id, CommandOutput};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Config, Directive};
use crate::services::{
    DirectiveOutcome, Orchestrator, RecoveryDaemon, RecoveryDaemonConfig, RecoveryDaemonEvent,
    StopMode,
};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Skip reconciliation and the recovery sweep at startup
    #[arg(long)]
    pub skip_startup_recovery: bool,

    /// Print task, agent and subtask events as JSON lines
    #[arg(long)]
    pub events: bool,
}

/// One parsed stdin line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeInput {
    Directive(Directive),
    Stop(Uuid, StopMode),
    Resume(Uuid),
    Sweep,
}

/// Parse a stdin line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ServeInput>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    if let Some(command) = line.strip_prefix('/') {
        let mut parts = command.split_whitespace();
        let verb = parts.next().unwrap_or_default().to_lowercase();
        let argument = parts.next();
        let task_id = || -> Result<Uuid> {
            let raw = argument.ok_or_else(|| anyhow::anyhow!("/{verb} needs a task id"))?;
            Uuid::parse_str(raw).with_context(|| format!("Invalid task id: {raw}"))
        };
        return match verb.as_str() {
            "pause" => Ok(Some(ServeInput::Stop(task_id()?, StopMode::Pause))),
            "cancel" => Ok(Some(ServeInput::Stop(task_id()?, StopMode::Cancel))),
            "resume" => Ok(Some(ServeInput::Resume(task_id()?))),
            "sweep" => Ok(Some(ServeInput::Sweep)),
            other => anyhow::bail!("Unknown command: /{other}"),
        };
    }

    if line.starts_with('{') {
        let directive: Directive =
            serde_json::from_str(line).context("Invalid directive JSON")?;
        return Ok(Some(ServeInput::Directive(directive)));
    }

    if let Some(rest) = line.strip_prefix('@') {
        let (department, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let text = text.trim();
        if !department.is_empty() && !text.is_empty() {
            return Ok(Some(ServeInput::Directive(
                Directive::new(text).for_department(department),
            )));
        }
    }

    Ok(Some(ServeInput::Directive(Directive::new(line))))
}

#[derive(Debug, serde::Serialize)]
pub struct DirectiveOutput {
    #[serde(flatten)]
    pub outcome: DirectiveOutcome,
}

impl CommandOutput for DirectiveOutput {
    fn to_human(&self) -> String {
        match &self.outcome {
            DirectiveOutcome::Skipped { reason } => format!("Noted ({reason:?}); no task created"),
            DirectiveOutcome::Delegated {
                task_id,
                department_id,
                executor_id,
            } => format!(
                "Delegated task {} to {department_id} (executor {})",
                short_id(&task_id.to_string()),
                short_id(&executor_id.to_string())
            ),
        }
    }
}

pub async fn execute(args: ServeArgs, config: &Config, json_mode: bool) -> Result<()> {
    let pool = open_pool(config).await?;
    let events = Arc::new(BroadcastEventSink::default());
    if args.events {
        spawn_event_printer(&events);
    }
    let orchestrator = build_orchestrator(config, pool, Arc::new(ConsoleNotifier::new(json_mode)))
        .with_events(events);

    if args.skip_startup_recovery {
        tracing::info!("startup recovery skipped");
    } else {
        let report = orchestrator
            .recover_on_startup()
            .await
            .context("Startup recovery failed")?;
        tracing::info!(
            reconciled = report.reconcile.updated,
            coordinations_resumed = report.coordinations_resumed,
            reviews_finalized = report.reviews_finalized,
            recovered = report.sweep.acted(),
            "startup recovery complete"
        );
    }

    let daemon = RecoveryDaemon::new(
        orchestrator.clone(),
        RecoveryDaemonConfig::from(&config.orchestrator),
    );
    let daemon_handle = daemon.handle();
    let mut daemon_events = daemon.run();
    tokio::spawn(async move {
        while let Some(event) = daemon_events.recv().await {
            if let RecoveryDaemonEvent::SweepCompleted { report, .. } = &event {
                if report.acted() > 0 {
                    tracing::info!(?report, "recovery sweep acted");
                }
            } else {
                tracing::debug!(?event, "recovery daemon event");
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tracing::info!("reading directives from stdin");
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!(live = orchestrator.live_runs().await, "interrupted; live workers are left to the sweeper");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&orchestrator, &line, json_mode).await,
                Ok(None) => {
                    tokio::select! {
                        () = drain_live_runs(&orchestrator) => {}
                        _ = &mut shutdown => {}
                    }
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    }

    daemon_handle.stop();
    Ok(())
}

async fn handle_line(orchestrator: &Orchestrator, line: &str, json_mode: bool) {
    let input = match parse_line(line) {
        Ok(Some(input)) => input,
        Ok(None) => return,
        Err(e) => {
            eprintln!("{e:#}");
            return;
        }
    };

    let result = match input {
        ServeInput::Directive(directive) => {
            let directive = keyed_for_retry(directive);
            match retry_contention(|| orchestrator.submit_directive(directive.clone())).await {
                Err(DomainError::DuplicateDirective { key, task_id }) => {
                    tracing::info!(key = %key, task_id = ?task_id, "directive already processed");
                    Ok(())
                }
                result => result.map(|outcome| output(&DirectiveOutput { outcome }, json_mode)),
            }
        }
        ServeInput::Stop(task_id, mode) => {
            retry_contention(|| orchestrator.request_stop(task_id, mode))
                .await
                .map(|task| {
                    tracing::info!(task_id = %task.id, status = %task.status, "stop applied");
                })
        }
        ServeInput::Resume(task_id) => retry_contention(|| orchestrator.resume(task_id))
            .await
            .map(|task| {
                tracing::info!(task_id = %task.id, status = %task.status, "resumed");
            }),
        ServeInput::Sweep => orchestrator.sweep().await.map(|report| {
            tracing::info!(?report, "manual sweep complete");
        }),
    };

    if let Err(e) = result {
        tracing::warn!(error = %e, "input failed");
        eprintln!("Error: {e}");
    }
}

/// Give a keyless directive a key of its own so a retried submission cannot
/// create a second task.
fn keyed_for_retry(mut directive: Directive) -> Directive {
    directive
        .idempotency_key
        .get_or_insert_with(|| format!("serve-{}", Uuid::new_v4()));
    directive
}

/// Retry an operation while the store reports write contention.
async fn retry_contention<T, F, Fut>(mut op: F) -> DomainResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DomainResult<T>>,
{
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(100))
        .with_max_interval(Duration::from_secs(2))
        .with_max_elapsed_time(Some(Duration::from_secs(15)))
        .build();

    backoff::future::retry(policy, || {
        let attempt = op();
        async move {
            attempt.await.map_err(|e| {
                if e.is_retryable() {
                    tracing::debug!(error = %e, "write contention, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        }
    })
    .await
}

fn spawn_event_printer(events: &BroadcastEventSink) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Ok(line) = serde_json::to_string(&event) {
                        println!("{line}");
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event printer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_line_is_a_directive() {
        let input = parse_line("  build the login page  ").unwrap();
        assert_eq!(
            input,
            Some(ServeInput::Directive(Directive::new("build the login page")))
        );
    }

    #[test]
    fn test_leading_mention_selects_department() {
        let Some(ServeInput::Directive(directive)) =
            parse_line("@design refresh the onboarding screens").unwrap()
        else {
            panic!("expected a directive");
        };
        assert_eq!(directive.department_id.as_deref(), Some("design"));
        assert_eq!(directive.text, "refresh the onboarding screens");
    }

    #[test]
    fn test_retried_directives_carry_a_key() {
        let keyed = keyed_for_retry(Directive::new("ship it"));
        assert!(keyed.idempotency_key.as_deref().is_some_and(|k| k.starts_with("serve-")));

        let own = keyed_for_retry(Directive::new("ship it").with_idempotency_key("msg-7"));
        assert_eq!(own.idempotency_key.as_deref(), Some("msg-7"));
    }

    #[test]
    fn test_bare_mention_stays_text() {
        let input = parse_line("@design").unwrap();
        assert_eq!(input, Some(ServeInput::Directive(Directive::new("@design"))));
    }

    #[test]
    fn test_blank_and_comment_lines_are_ignored() {
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("# note to self").unwrap(), None);
    }

    #[test]
    fn test_control_commands() {
        let id = Uuid::new_v4();
        assert_eq!(
            parse_line(&format!("/pause {id}")).unwrap(),
            Some(ServeInput::Stop(id, StopMode::Pause))
        );
        assert_eq!(
            parse_line(&format!("/CANCEL {id}")).unwrap(),
            Some(ServeInput::Stop(id, StopMode::Cancel))
        );
        assert_eq!(
            parse_line(&format!("/resume {id}")).unwrap(),
            Some(ServeInput::Resume(id))
        );
        assert_eq!(parse_line("/sweep").unwrap(), Some(ServeInput::Sweep));
        assert!(parse_line("/pause").is_err());
        assert!(parse_line("/pause not-a-uuid").is_err());
        assert!(parse_line("/reboot").is_err());
    }

    #[test]
    fn test_json_directive_with_plan() {
        let line = r#"{"text":"ship v2","department_id":"dev","plan":[{"title":"mockups","target_department_id":"design"}]}"#;
        let Some(ServeInput::Directive(directive)) = parse_line(line).unwrap() else {
            panic!("expected a directive");
        };
        assert_eq!(directive.department_id.as_deref(), Some("dev"));
        assert_eq!(directive.plan.len(), 1);
        assert_eq!(directive.plan[0].target_department_id.as_deref(), Some("design"));
    }
}
