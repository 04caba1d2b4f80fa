use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Agent availability, ordered from most to least eligible for new work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Break,
    Working,
    Offline,
}

impl AgentStatus {
    /// Delegation rank; lower is preferred.
    pub const fn rank(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Break => 1,
            Self::Working => 2,
            Self::Offline => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Break => "break",
            Self::Working => "working",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(Self::Idle),
            "break" => Ok(Self::Break),
            "working" => Ok(Self::Working),
            "offline" => Ok(Self::Offline),
            _ => Err(anyhow::anyhow!("Invalid agent status: {s}")),
        }
    }
}

/// Position in the department hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    TeamLeader,
    Senior,
    Junior,
    Intern,
}

impl AgentRole {
    /// Delegation rank among subordinates; lower is preferred.
    pub const fn rank(self) -> u8 {
        match self {
            Self::TeamLeader => 0,
            Self::Senior => 1,
            Self::Junior => 2,
            Self::Intern => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TeamLeader => "team_leader",
            Self::Senior => "senior",
            Self::Junior => "junior",
            Self::Intern => "intern",
        }
    }

    pub const fn is_leader(self) -> bool {
        matches!(self, Self::TeamLeader)
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "team_leader" | "leader" => Ok(Self::TeamLeader),
            "senior" => Ok(Self::Senior),
            "junior" => Ok(Self::Junior),
            "intern" => Ok(Self::Intern),
            _ => Err(anyhow::anyhow!("Invalid agent role: {s}")),
        }
    }
}

/// A department member capable of running work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub role: AgentRole,
    pub department_id: String,
    pub status: AgentStatus,
    /// Task the agent is currently executing (if any)
    pub current_task_id: Option<Uuid>,
    /// Worker provider kind (key into the configured providers)
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        role: AgentRole,
        department_id: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            role,
            department_id: department_id.into(),
            status: AgentStatus::Idle,
            current_task_id: None,
            provider: provider.into(),
            created_at: Utc::now(),
        }
    }

    /// Whether the agent holds a task other than `task_id`.
    pub fn is_busy_elsewhere(&self, task_id: Uuid) -> bool {
        self.current_task_id.is_some_and(|current| current != task_id)
    }

    /// Mark the agent as running `task_id`.
    pub fn occupy(&mut self, task_id: Uuid) {
        self.status = AgentStatus::Working;
        self.current_task_id = Some(task_id);
    }

    /// Release the agent if it is holding `task_id`. Returns whether anything changed.
    pub fn release(&mut self, task_id: Uuid) -> bool {
        if self.current_task_id != Some(task_id) {
            return false;
        }
        self.current_task_id = None;
        if self.status == AgentStatus::Working {
            self.status = AgentStatus::Idle;
        }
        true
    }
}

/// Deterministic delegation ordering: status rank, then role rank, then name.
pub fn delegation_order(a: &Agent, b: &Agent) -> Ordering {
    a.status
        .rank()
        .cmp(&b.status.rank())
        .then_with(|| a.role.rank().cmp(&b.role.rank()))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}
