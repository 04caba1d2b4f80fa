use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::directive::Locale;

/// Main configuration structure for taskforce
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Delegation, pacing and recovery settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Worker process settings
    #[serde(default)]
    pub workers: WorkersConfig,

    /// Operator preferences
    #[serde(default)]
    pub operator: OperatorConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".taskforce/taskforce.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// sqlx connection URL for the configured path.
    pub fn url(&self) -> String {
        if self.path.starts_with("sqlite:") {
            self.path.clone()
        } else {
            format!("sqlite:{}", self.path)
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// Rotation policy for file logs: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Delegation, pacing and recovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OrchestratorConfig {
    /// Interval between periodic recovery sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// In-progress tasks younger than this are never touched by recovery
    #[serde(default = "default_stale_grace_secs")]
    pub stale_grace_secs: u64,

    /// Log or log-file activity inside this window means the worker is alive
    #[serde(default = "default_activity_window_secs")]
    pub activity_window_secs: u64,

    /// Delay between review finalizations at startup
    #[serde(default = "default_review_stagger_ms")]
    pub review_stagger_ms: u64,

    /// Delay before a department acknowledges a cross-department request
    #[serde(default = "default_ack_delay_ms")]
    pub ack_delay_ms: u64,

    /// Length of the planned meeting before assignment
    #[serde(default = "default_meeting_delay_ms")]
    pub meeting_delay_ms: u64,
}

const fn default_sweep_interval_secs() -> u64 {
    60
}

const fn default_stale_grace_secs() -> u64 {
    180
}

const fn default_activity_window_secs() -> u64 {
    300
}

const fn default_review_stagger_ms() -> u64 {
    1500
}

const fn default_ack_delay_ms() -> u64 {
    800
}

const fn default_meeting_delay_ms() -> u64 {
    1200
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            stale_grace_secs: default_stale_grace_secs(),
            activity_window_secs: default_activity_window_secs(),
            review_stagger_ms: default_review_stagger_ms(),
            ack_delay_ms: default_ack_delay_ms(),
            meeting_delay_ms: default_meeting_delay_ms(),
        }
    }
}

impl OrchestratorConfig {
    /// No pacing delays; recovery thresholds unchanged.
    pub fn without_pacing(mut self) -> Self {
        self.review_stagger_ms = 0;
        self.ack_delay_ms = 0;
        self.meeting_delay_ms = 0;
        self
    }
}

/// Command line used to launch one kind of worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProviderCommand {
    /// Executable to run
    pub command: String,

    /// Arguments placed before the prompt
    #[serde(default)]
    pub args: Vec<String>,
}

/// Worker process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkersConfig {
    /// Provider used by agents without a known provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Provider kind to command line
    #[serde(default = "default_providers")]
    pub providers: HashMap<String, ProviderCommand>,

    /// Directory for per-task worker log files
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,

    /// Working directory for tasks without a project path
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
}

fn default_provider() -> String {
    "claude".to_string()
}

fn default_providers() -> HashMap<String, ProviderCommand> {
    HashMap::from([
        (
            "claude".to_string(),
            ProviderCommand {
                command: "claude".to_string(),
                args: vec!["--print".to_string()],
            },
        ),
        (
            "codex".to_string(),
            ProviderCommand {
                command: "codex".to_string(),
                args: vec!["exec".to_string()],
            },
        ),
    ])
}

fn default_logs_dir() -> String {
    ".taskforce/logs".to_string()
}

fn default_working_dir() -> String {
    ".".to_string()
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            providers: default_providers(),
            logs_dir: default_logs_dir(),
            working_dir: default_working_dir(),
        }
    }
}

/// Operator preferences
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct OperatorConfig {
    /// Language for operator-facing notices
    #[serde(default)]
    pub locale: Locale,
}
