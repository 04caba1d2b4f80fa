//! Department and roster lookups.
//!
//! Resolves departments by id, name or alias, finds leads, picks the
//! subordinate that should execute a task, and detects which departments a
//! directive talks about.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    delegation_order, execution_priority, Agent, AgentRole, AgentStatus, Department,
};
use crate::domain::ports::{AgentFilter, AgentRepository, DepartmentRepository};

/// Topic keywords per well-known department, matched when nothing is mentioned.
const DEPARTMENT_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "dev",
        &["code", "api", "backend", "frontend", "implement", "개발", "코드", "実装", "开发"],
    ),
    (
        "design",
        &["design", "ui", "ux", "mockup", "figma", "디자인", "デザイン", "设计"],
    ),
    (
        "qa",
        &["test", "tests", "qa", "regression", "테스트", "品質", "测试"],
    ),
    (
        "operations",
        &["deploy", "infra", "server", "monitoring", "운영", "배포", "運用", "运维"],
    ),
    (
        "devsecops",
        &["security", "vulnerability", "cve", "보안", "セキュリティ", "安全"],
    ),
    (
        "planning",
        &["roadmap", "plan", "requirements", "기획", "企画", "规划"],
    ),
];

/// Instructions attached to a worker prompt for each role.
pub fn role_constraint(role: AgentRole) -> &'static str {
    match role {
        AgentRole::TeamLeader => {
            "You are the team leader. Own the outcome, keep the scope tight, and report \
             clearly what was done and what is left."
        }
        AgentRole::Senior => {
            "You are a senior member. Work independently, make sound technical decisions, \
             and leave the codebase better than you found it."
        }
        AgentRole::Junior => {
            "You are a junior member. Follow the existing conventions closely and keep \
             changes small; flag anything you are unsure about in your report."
        }
        AgentRole::Intern => {
            "You are an intern. Do only what is asked, avoid risky or destructive changes, \
             and describe every step you took."
        }
    }
}

#[derive(Clone)]
pub struct Directory {
    departments: Arc<dyn DepartmentRepository>,
    agents: Arc<dyn AgentRepository>,
}

impl Directory {
    pub fn new(
        departments: Arc<dyn DepartmentRepository>,
        agents: Arc<dyn AgentRepository>,
    ) -> Self {
        Self {
            departments,
            agents,
        }
    }

    pub async fn departments(&self) -> DomainResult<Vec<Department>> {
        self.departments.list().await
    }

    /// Find a department by id, display name, or alias (case-insensitive).
    pub async fn department(&self, key: &str) -> DomainResult<Option<Department>> {
        let key = key.trim().trim_start_matches('@');
        if key.is_empty() {
            return Ok(None);
        }
        if let Some(department) = self.departments.get(key).await? {
            return Ok(Some(department));
        }
        let key = key.to_lowercase();
        Ok(self
            .departments
            .list()
            .await?
            .into_iter()
            .find(|d| d.names().any(|n| n == key)))
    }

    pub async fn agent(&self, id: uuid::Uuid) -> DomainResult<Option<Agent>> {
        self.agents.get(id).await
    }

    /// The team leader of a department. With several, the best-ranked one.
    pub async fn leader_of(&self, department_id: &str) -> DomainResult<Option<Agent>> {
        let mut leaders = self
            .agents
            .list(AgentFilter {
                department_id: Some(department_id.to_string()),
                role: Some(AgentRole::TeamLeader),
                ..Default::default()
            })
            .await?;
        leaders.sort_by(delegation_order);
        Ok(leaders.into_iter().next())
    }

    /// Pick who executes work handed to `lead`.
    ///
    /// The best-ranked free subordinate of the lead's department, or the
    /// lead itself when nobody is free.
    pub async fn pick_executor(&self, lead: &Agent) -> DomainResult<Agent> {
        let mut candidates: Vec<Agent> = self
            .agents
            .list(AgentFilter {
                department_id: Some(lead.department_id.clone()),
                ..Default::default()
            })
            .await?
            .into_iter()
            .filter(|a| {
                a.id != lead.id
                    && !a.role.is_leader()
                    && a.status != AgentStatus::Offline
                    && a.current_task_id.is_none()
            })
            .collect();
        candidates.sort_by(delegation_order);

        Ok(candidates.into_iter().next().unwrap_or_else(|| lead.clone()))
    }

    /// Departments addressed with `@name` in the text, in order of appearance.
    pub async fn mentioned_departments(&self, text: &str) -> DomainResult<Vec<Department>> {
        let departments = self.departments.list().await?;
        let mut found: Vec<Department> = Vec::new();

        for token in text.split_whitespace() {
            let Some(name) = token.strip_prefix('@') else {
                continue;
            };
            let name = name
                .trim_end_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if name.is_empty() {
                continue;
            }
            if let Some(department) = departments.iter().find(|d| d.names().any(|n| n == name)) {
                if !found.iter().any(|f| f.id == department.id) {
                    found.push(department.clone());
                }
            }
        }
        Ok(found)
    }

    /// The department a directive is most likely about.
    ///
    /// An `@mention` wins. Otherwise department names and topic keywords are
    /// counted; ties go to the fixed execution priority.
    pub async fn detect_department(&self, text: &str) -> DomainResult<Option<Department>> {
        if let Some(first) = self.mentioned_departments(text).await?.into_iter().next() {
            return Ok(Some(first));
        }

        let departments = self.departments.list().await?;
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let hits = |needle: &str| -> usize {
            if needle.is_ascii() {
                words.iter().filter(|w| **w == needle).count()
            } else {
                lowered.matches(needle).count()
            }
        };

        let mut best: Option<(usize, &Department)> = None;
        for department in &departments {
            let mut score: usize = department.names().map(|n| hits(&n)).sum();
            if let Some((_, keywords)) = DEPARTMENT_KEYWORDS
                .iter()
                .find(|(id, _)| id.eq_ignore_ascii_case(&department.id))
            {
                score += keywords.iter().map(|k| hits(k)).sum::<usize>();
            }
            if score == 0 {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_score, current)) => match score.cmp(&best_score) {
                    Ordering::Greater => true,
                    Ordering::Less => false,
                    Ordering::Equal => {
                        let rank = |d: &Department| execution_priority(&d.id).unwrap_or(usize::MAX);
                        rank(department) < rank(current)
                    }
                },
            };
            if better {
                best = Some((score, department));
            }
        }

        Ok(best.map(|(_, d)| d.clone()))
    }
}
