//! Command-line interface.

pub mod commands;
pub mod display;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::agent::AgentArgs;
use commands::init::InitArgs;
use commands::reconcile::ReconcileArgs;
use commands::serve::ServeArgs;
use commands::task::TaskArgs;

#[derive(Parser, Debug)]
#[command(name = "taskforce")]
#[command(about = "Delegates operator directives to department agents and recovers stalled work")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Config file to load instead of .taskforce/config.yaml
    #[arg(short, long, global = true, env = "TASKFORCE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database and seed the default roster
    Init(InitArgs),
    /// Run the orchestrator, reading one directive per stdin line
    Serve(ServeArgs),
    /// Run one recovery sweep over in-progress tasks
    Sweep,
    /// Sync subtasks with their delegated child tasks
    Reconcile(ReconcileArgs),
    /// Inspect and control tasks
    Task(TaskArgs),
    /// Inspect agents
    Agent(AgentArgs),
}

/// Print an error and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let causes: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": causes,
        });
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&body).unwrap_or_else(|_| err.to_string())
        );
    } else {
        eprintln!("Error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
    }
    std::process::exit(1);
}
