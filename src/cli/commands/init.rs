//! Implementation of the `taskforce init` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::open_pool;
use crate::adapters::sqlite::{SqliteAgentRepository, SqliteDepartmentRepository};
use crate::cli::display::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::CONFIG_DIR;
use crate::services::{seed_roster, RosterSeed};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Drop the existing database and start over
    #[arg(long, short)]
    pub force: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub message: String,
    pub database_path: String,
    pub config_written: Option<PathBuf>,
    pub roster: Option<RosterSeed>,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if let Some(path) = &self.config_written {
            lines.push(format!("\nWrote default config to {}", path.display()));
        }
        if let Some(roster) = &self.roster {
            lines.push(format!("Database initialized at {}", self.database_path));
            lines.push(format!(
                "Seeded {} departments, {} new agent(s)",
                roster.departments, roster.agents_created
            ));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: InitArgs, config: &Config, json_mode: bool) -> Result<()> {
    let db_path = Path::new(&config.database.path);

    if db_path.exists() && !args.force {
        let result = InitOutput {
            success: false,
            message: "Already initialized. Use --force to reinitialize.".to_string(),
            database_path: config.database.path.clone(),
            config_written: None,
            roster: None,
        };
        output(&result, json_mode);
        return Ok(());
    }

    if args.force {
        remove_database(db_path).await?;
    }

    fs::create_dir_all(&config.workers.logs_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.workers.logs_dir))?;
    let config_written = write_default_config(config).await?;

    let pool = open_pool(config).await?;
    let departments = SqliteDepartmentRepository::new(pool.clone());
    let agents = SqliteAgentRepository::new(pool);
    let roster = seed_roster(&departments, &agents, &config.workers.default_provider)
        .await
        .context("Failed to seed the default roster")?;

    let result = InitOutput {
        success: true,
        message: if args.force {
            "Reinitialized successfully.".to_string()
        } else {
            "Initialized successfully.".to_string()
        },
        database_path: config.database.path.clone(),
        config_written,
        roster: Some(roster),
    };
    output(&result, json_mode);
    Ok(())
}

/// Remove the database file along with its WAL side files.
async fn remove_database(db_path: &Path) -> Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut path = db_path.as_os_str().to_owned();
        path.push(suffix);
        let path = PathBuf::from(path);
        if path.exists() {
            fs::remove_file(&path)
                .await
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
    }
    Ok(())
}

/// Write `.taskforce/config.yaml` from the effective config unless one exists.
async fn write_default_config(config: &Config) -> Result<Option<PathBuf>> {
    let path = Path::new(CONFIG_DIR).join("config.yaml");
    if path.exists() {
        return Ok(None);
    }
    fs::create_dir_all(CONFIG_DIR)
        .await
        .with_context(|| format!("Failed to create {CONFIG_DIR}"))?;
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    fs::write(&path, yaml)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(Some(path))
}
