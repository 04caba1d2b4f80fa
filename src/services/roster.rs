//! Baseline organization roster.
//!
//! Six departments, each staffed with a team leader, a senior, a junior and
//! an intern. Seeding never overwrites agents that already exist.

use serde::Serialize;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Agent, AgentRole, Department, DEPARTMENT_EXECUTION_PRIORITY};
use crate::domain::ports::{AgentFilter, AgentRepository, DepartmentRepository};

struct BaselineDepartment {
    id: &'static str,
    name: &'static str,
    aliases: &'static [&'static str],
    staff: [&'static str; 4],
}

static BASELINE: [BaselineDepartment; 6] = [
    BaselineDepartment {
        id: "dev",
        name: "Development",
        aliases: &["engineering", "개발팀", "開発", "开发"],
        staff: ["Aria", "Bolt", "Cody", "Dot"],
    },
    BaselineDepartment {
        id: "design",
        name: "Design",
        aliases: &["디자인팀", "デザイン", "设计"],
        staff: ["Pixel", "Luna", "Sketch", "Tint"],
    },
    BaselineDepartment {
        id: "qa",
        name: "Quality Assurance",
        aliases: &["quality", "품질관리팀", "品質保証", "质量"],
        staff: ["Hawk", "Lint", "Trace", "Bug"],
    },
    BaselineDepartment {
        id: "operations",
        name: "Operations",
        aliases: &["ops", "운영팀", "運用", "运营"],
        staff: ["Atlas", "Turbo", "Relay", "Cue"],
    },
    BaselineDepartment {
        id: "devsecops",
        name: "DevSecOps",
        aliases: &["security", "보안팀", "セキュリティ", "安全"],
        staff: ["Vault", "Shield", "Cipher", "Key"],
    },
    BaselineDepartment {
        id: "planning",
        name: "Planning",
        aliases: &["기획팀", "企画", "策划"],
        staff: ["Sage", "Clio", "Memo", "Note"],
    },
];

const ROLES: [AgentRole; 4] = [
    AgentRole::TeamLeader,
    AgentRole::Senior,
    AgentRole::Junior,
    AgentRole::Intern,
];

/// The baseline departments in execution priority order.
pub fn baseline_departments() -> Vec<Department> {
    BASELINE
        .iter()
        .map(|b| {
            let sort_order = DEPARTMENT_EXECUTION_PRIORITY
                .iter()
                .position(|id| *id == b.id)
                .unwrap_or(BASELINE.len());
            Department::new(b.id, b.name, i64::try_from(sort_order).unwrap_or(i64::MAX))
                .with_aliases(b.aliases.iter().copied())
        })
        .collect()
}

/// The baseline staff of every department, all using `provider`.
pub fn baseline_agents(provider: &str) -> Vec<Agent> {
    BASELINE
        .iter()
        .flat_map(|b| {
            b.staff
                .iter()
                .zip(ROLES)
                .map(move |(name, role)| Agent::new(*name, role, b.id, provider))
        })
        .collect()
}

/// What a seeding pass wrote.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RosterSeed {
    pub departments: usize,
    pub agents_created: usize,
}

/// Upsert the baseline departments and staff any department that has no agents.
pub async fn seed_roster(
    departments: &dyn DepartmentRepository,
    agents: &dyn AgentRepository,
    provider: &str,
) -> DomainResult<RosterSeed> {
    let mut seed = RosterSeed::default();

    for department in baseline_departments() {
        departments.upsert(&department).await?;
        seed.departments += 1;

        let existing = agents
            .list(AgentFilter {
                department_id: Some(department.id.clone()),
                ..Default::default()
            })
            .await?;
        if !existing.is_empty() {
            continue;
        }
        for agent in baseline_agents(provider)
            .into_iter()
            .filter(|a| a.department_id == department.id)
        {
            agents.create(&agent).await?;
            seed.agents_created += 1;
        }
    }

    tracing::info!(
        departments = seed.departments,
        agents_created = seed.agents_created,
        "roster seeded"
    );
    Ok(seed)
}
