//! Agent CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use comfy_table::Cell;
use std::str::FromStr;

use super::open_pool;
use crate::adapters::sqlite::SqliteAgentRepository;
use crate::cli::display::{list_table, output, render_list, short_id, CommandOutput};
use crate::domain::models::{delegation_order, Agent, AgentRole, AgentStatus, Config};
use crate::domain::ports::{AgentFilter, AgentRepository};

#[derive(Args, Debug)]
pub struct AgentArgs {
    #[command(subcommand)]
    pub command: AgentCommands,
}

#[derive(Subcommand, Debug)]
pub enum AgentCommands {
    /// List agents, grouped by department in delegation order
    List {
        /// Filter by department id
        #[arg(short, long)]
        department: Option<String>,
        /// Filter by role (team_leader, senior, junior, intern)
        #[arg(short, long)]
        role: Option<String>,
        /// Filter by status (idle, break, working, offline)
        #[arg(short, long)]
        status: Option<String>,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct AgentListOutput {
    pub agents: Vec<Agent>,
    pub total: usize,
}

impl CommandOutput for AgentListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "name", "dept", "role", "status", "provider", "task"]);
        for agent in &self.agents {
            let id = agent.id.to_string();
            let task = agent
                .current_task_id
                .map(|t| short_id(&t.to_string()).to_string())
                .unwrap_or_else(|| "-".to_string());
            table.add_row(vec![
                Cell::new(short_id(&id)),
                Cell::new(&agent.name),
                Cell::new(&agent.department_id),
                Cell::new(agent.role.as_str()),
                Cell::new(agent.status.as_str()),
                Cell::new(&agent.provider),
                Cell::new(task),
            ]);
        }
        render_list("agent", &table, self.total)
    }
}

pub async fn execute(args: AgentArgs, config: &Config, json_mode: bool) -> Result<()> {
    let pool = open_pool(config).await?;
    let repo = SqliteAgentRepository::new(pool);

    match args.command {
        AgentCommands::List {
            department,
            role,
            status,
        } => {
            let role = role.as_deref().map(AgentRole::from_str).transpose()?;
            let status = status.as_deref().map(AgentStatus::from_str).transpose()?;
            let mut agents = repo
                .list(AgentFilter {
                    department_id: department,
                    role,
                    status,
                })
                .await
                .context("Failed to list agents")?;
            agents.sort_by(|a, b| {
                a.department_id
                    .cmp(&b.department_id)
                    .then_with(|| b.role.is_leader().cmp(&a.role.is_leader()))
                    .then_with(|| delegation_order(a, b))
            });
            let total = agents.len();
            output(&AgentListOutput { agents, total }, json_mode);
        }
    }

    Ok(())
}
