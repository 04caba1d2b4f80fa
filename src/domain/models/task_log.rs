//! Task log lines and the run markers recovery reads back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    /// Written by the orchestrator.
    System,
    /// Captured from the worker.
    Output,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Output => "output",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "output" => Some(Self::Output),
            _ => None,
        }
    }
}

/// One persisted log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLog {
    pub id: i64,
    pub task_id: Uuid,
    pub kind: LogKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

const RUN_START: &str = "RUN start";
const RUN_COMPLETED: &str = "RUN completed";
const RUN_FAILED: &str = "RUN failed";
const RUN_DEFERRED: &str = "RUN deferred:";
const SPAWN_FAILED: &str = "Agent spawn failed:";

/// Evidence about the last worker run of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMarker {
    /// A worker was started; no exit was recorded after it.
    Started,
    /// The worker exited with the given code.
    Exited(i32),
    /// The worker could not be spawned.
    SpawnFailed(String),
    /// Dispatch was refused; no worker started.
    Deferred(String),
}

impl RunMarker {
    pub fn start_line(agent_name: &str, provider: &str) -> String {
        format!("{RUN_START} (agent: {agent_name}, provider: {provider})")
    }

    pub fn exit_line(exit_code: i32) -> String {
        if exit_code == 0 {
            format!("{RUN_COMPLETED} (exit code: {exit_code})")
        } else {
            format!("{RUN_FAILED} (exit code: {exit_code})")
        }
    }

    pub fn spawn_failed_line(reason: &str) -> String {
        format!("{SPAWN_FAILED} {reason}")
    }

    pub fn deferred_line(reason: &str) -> String {
        format!("{RUN_DEFERRED} {reason}")
    }

    /// Whether a line is any kind of run marker.
    pub fn is_marker(line: &str) -> bool {
        line.starts_with("RUN ") || line.starts_with(SPAWN_FAILED)
    }

    /// Parse a marker line. Unknown `RUN` lines are treated as a start.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if let Some(reason) = line.strip_prefix(SPAWN_FAILED) {
            return Some(Self::SpawnFailed(reason.trim().to_string()));
        }
        if let Some(reason) = line.strip_prefix(RUN_DEFERRED) {
            return Some(Self::Deferred(reason.trim().to_string()));
        }
        if line.starts_with(RUN_COMPLETED) || line.starts_with(RUN_FAILED) {
            let fallback = if line.starts_with(RUN_FAILED) { 1 } else { 0 };
            let code = parse_exit_code(line).unwrap_or(fallback);
            return Some(Self::Exited(code));
        }
        if line.starts_with("RUN ") {
            return Some(Self::Started);
        }
        None
    }
}

fn parse_exit_code(line: &str) -> Option<i32> {
    let start = line.find("exit code:")? + "exit code:".len();
    let rest = &line[start..];
    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(|c| *c == '-' || c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_markers() {
        assert_eq!(
            RunMarker::parse("RUN completed (exit code: 0)"),
            Some(RunMarker::Exited(0))
        );
        assert_eq!(
            RunMarker::parse("RUN failed (exit code: 137)"),
            Some(RunMarker::Exited(137))
        );
        assert_eq!(
            RunMarker::parse("RUN completed (exit code: 2)"),
            Some(RunMarker::Exited(2))
        );
        assert_eq!(
            RunMarker::parse("Agent spawn failed: binary not found"),
            Some(RunMarker::SpawnFailed("binary not found".to_string()))
        );
        assert_eq!(
            RunMarker::parse("RUN start (agent: Mina, provider: claude)"),
            Some(RunMarker::Started)
        );
        assert_eq!(RunMarker::parse("compiling..."), None);
    }

    #[test]
    fn test_lines_parse_back() {
        assert_eq!(RunMarker::parse(&RunMarker::exit_line(0)), Some(RunMarker::Exited(0)));
        assert_eq!(RunMarker::parse(&RunMarker::exit_line(-1)), Some(RunMarker::Exited(-1)));
        assert_eq!(RunMarker::parse(&RunMarker::start_line("a", "b")), Some(RunMarker::Started));
        assert!(RunMarker::is_marker(&RunMarker::spawn_failed_line("x")));
        assert_eq!(
            RunMarker::parse(&RunMarker::deferred_line("agent Mina is busy with another task")),
            Some(RunMarker::Deferred("agent Mina is busy with another task".to_string()))
        );
    }

    #[test]
    fn test_failed_without_code_is_nonzero() {
        assert_eq!(RunMarker::parse("RUN failed"), Some(RunMarker::Exited(1)));
    }
}
