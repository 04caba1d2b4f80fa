use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project-local configuration directory.
pub const CONFIG_DIR: &str = ".taskforce";

/// Why a loaded configuration was refused
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid sweep_interval_secs: {0}. Must be at least 1")]
    InvalidSweepInterval(u64),

    #[error("Default provider '{0}' has no command configured")]
    UnknownDefaultProvider(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Layered YAML and environment loading for [`Config`]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Layers, lowest precedence first:
    /// 1. Programmatic defaults
    /// 2. `.taskforce/config.yaml` (created by init)
    /// 3. `.taskforce/local.yaml` (optional local overrides)
    /// 4. `TASKFORCE_*` environment variables, `__` between sections
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(format!("{CONFIG_DIR}/config.yaml")))
            .merge(Yaml::file(format!("{CONFIG_DIR}/local.yaml")))
            .merge(Env::prefixed("TASKFORCE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("TASKFORCE_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// `--config` wins when given, otherwise the project-local hierarchy.
    pub fn load_with(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load(),
        }
    }

    /// Reject settings the orchestrator cannot run with.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        Self::check_database(config)?;
        Self::check_logging(config)?;
        if config.orchestrator.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidSweepInterval(0));
        }
        Self::check_workers(config)
    }

    fn check_database(config: &Config) -> Result<(), ConfigError> {
        let db = &config.database;
        if db.path.trim().is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        match db.max_connections {
            0 => Err(ConfigError::InvalidMaxConnections(0)),
            _ => Ok(()),
        }
    }

    fn check_logging(config: &Config) -> Result<(), ConfigError> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        const FORMATS: [&str; 2] = ["json", "pretty"];
        const ROTATIONS: [&str; 3] = ["daily", "hourly", "never"];

        let logging = &config.logging;
        if !LEVELS.contains(&logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(logging.level.clone()));
        }
        if !FORMATS.contains(&logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(logging.format.clone()));
        }
        if !ROTATIONS.contains(&logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(logging.rotation.clone()));
        }
        Ok(())
    }

    fn check_workers(config: &Config) -> Result<(), ConfigError> {
        let workers = &config.workers;
        if !workers.providers.contains_key(&workers.default_provider) {
            return Err(ConfigError::UnknownDefaultProvider(
                workers.default_provider.clone(),
            ));
        }
        if let Some((name, _)) = workers
            .providers
            .iter()
            .find(|(_, provider)| provider.command.trim().is_empty())
        {
            return Err(ConfigError::ValidationFailed(format!(
                "provider '{name}' has an empty command"
            )));
        }
        if workers.logs_dir.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "workers.logs_dir is required".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Locale;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_pass_validation() {
        let config = Config::default();
        assert_eq!(config.database.url(), "sqlite:.taskforce/taskforce.db");
        assert_eq!(config.orchestrator.stale_grace_secs, 180);
        assert_eq!(config.workers.default_provider, "claude");
        assert_eq!(config.operator.locale, Locale::default());
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
database:
  path: /custom/path.db
  max_connections: 3
orchestrator:
  sweep_interval_secs: 30
  ack_delay_ms: 0
workers:
  default_provider: codex
  providers:
    codex:
      command: codex
      args: [exec, --quiet]
operator:
  locale: ko
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.database.path, "/custom/path.db");
        assert_eq!(config.orchestrator.sweep_interval_secs, 30);
        assert_eq!(config.orchestrator.ack_delay_ms, 0);
        assert_eq!(config.orchestrator.meeting_delay_ms, 1200);
        assert_eq!(config.workers.providers["codex"].args, vec!["exec", "--quiet"]);
        assert_eq!(config.operator.locale, Locale::Ko);
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    fn rejected(edit: impl FnOnce(&mut Config)) -> ConfigError {
        let mut config = Config::default();
        edit(&mut config);
        ConfigLoader::validate(&config).unwrap_err()
    }

    #[test]
    fn test_invalid_sections_are_rejected() {
        assert!(matches!(
            rejected(|c| c.logging.level = "loud".into()),
            ConfigError::InvalidLogLevel(level) if level == "loud"
        ));
        assert!(matches!(
            rejected(|c| c.logging.format = "logfmt".into()),
            ConfigError::InvalidLogFormat(_)
        ));
        assert!(matches!(
            rejected(|c| c.logging.rotation = "weekly".into()),
            ConfigError::InvalidRotation(_)
        ));
        assert!(matches!(
            rejected(|c| c.database.path = "  ".into()),
            ConfigError::EmptyDatabasePath
        ));
        assert!(matches!(
            rejected(|c| c.database.max_connections = 0),
            ConfigError::InvalidMaxConnections(0)
        ));
        assert!(matches!(
            rejected(|c| c.orchestrator.sweep_interval_secs = 0),
            ConfigError::InvalidSweepInterval(0)
        ));
    }

    #[test]
    fn test_blank_provider_command_is_rejected() {
        let err = rejected(|c| {
            if let Some(codex) = c.workers.providers.get_mut("codex") {
                codex.command = String::new();
            }
        });
        assert!(err.to_string().contains("'codex'"));
    }

    #[test]
    fn test_validate_unknown_default_provider() {
        let mut config = Config::default();
        config.workers.default_provider = "gemini".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::UnknownDefaultProvider(p) if p == "gemini"
        ));
    }

    #[test]
    fn test_env_override() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "logging:\n  level: info\norchestrator:\n  stale_grace_secs: 60").unwrap();
        file.flush().unwrap();

        temp_env::with_vars(
            [
                ("TASKFORCE_LOGGING__LEVEL", Some("debug")),
                ("TASKFORCE_ORCHESTRATOR__ACTIVITY_WINDOW_SECS", Some("42")),
            ],
            || {
                let config = ConfigLoader::load_from_file(file.path()).unwrap();
                assert_eq!(config.logging.level, "debug");
                assert_eq!(config.orchestrator.activity_window_secs, 42);
                assert_eq!(config.orchestrator.stale_grace_secs, 60);
            },
        );
    }

    #[test]
    fn test_local_overrides_layer_on_project_config() {
        let mut project = NamedTempFile::new().unwrap();
        writeln!(
            project,
            "orchestrator:\n  stale_grace_secs: 90\n  sweep_interval_secs: 20\nworkers:\n  default_provider: codex"
        )
        .unwrap();
        let mut local = NamedTempFile::new().unwrap();
        writeln!(local, "orchestrator:\n  sweep_interval_secs: 5").unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(project.path()))
            .merge(Yaml::file(local.path()))
            .extract()
            .unwrap();

        assert_eq!(config.orchestrator.sweep_interval_secs, 5);
        assert_eq!(config.orchestrator.stale_grace_secs, 90);
        assert_eq!(config.orchestrator.activity_window_secs, 300);
        assert_eq!(config.workers.default_provider, "codex");
        assert!(config.workers.providers.contains_key("claude"));
    }

    #[test]
    fn test_invalid_file_values_are_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "logging:\n  format: xml").unwrap();
        file.flush().unwrap();

        temp_env::with_vars_unset(["TASKFORCE_LOGGING__FORMAT"], || {
            assert!(ConfigLoader::load_from_file(file.path()).is_err());
        });
    }
}
