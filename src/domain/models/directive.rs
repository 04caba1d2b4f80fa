//! Directives and their classified delegation policy.

use serde::{Deserialize, Serialize};

/// Operator-facing language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Ko,
    Ja,
    Zh,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ko => "ko",
            Self::Ja => "ja",
            Self::Zh => "zh",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "en" | "english" => Some(Self::En),
            "ko" | "korean" => Some(Self::Ko),
            "ja" | "japanese" => Some(Self::Ja),
            "zh" | "chinese" => Some(Self::Zh),
            _ => None,
        }
    }
}

/// Why a directive does not create work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The operator explicitly asked for no task.
    NoTask,
    /// Greeting, thanks, or a ping.
    Lightweight,
}

/// Classification of a directive's intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirectivePolicy {
    pub skip_delegation: bool,
    pub reason: Option<SkipReason>,
    pub skip_planned_meeting: bool,
    pub skip_plan_subtasks: bool,
}

/// A planned subtask supplied with a directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanItem {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub target_department_id: Option<String>,
}

/// Free-text instruction from an operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub text: String,
    /// Department that owns the work; detected from the text when absent.
    #[serde(default)]
    pub department_id: Option<String>,
    #[serde(default)]
    pub project_path: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub round_goal: Option<String>,
    #[serde(default)]
    pub requested_by: Option<String>,
    /// Replays of the same key are rejected.
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub plan: Vec<PlanItem>,
}

impl Directive {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn for_department(mut self, department_id: impl Into<String>) -> Self {
        self.department_id = Some(department_id.into());
        self
    }

    pub fn with_plan(mut self, plan: Vec<PlanItem>) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

impl PlanItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            target_department_id: None,
        }
    }

    pub fn targeting(mut self, department_id: impl Into<String>) -> Self {
        self.target_department_id = Some(department_id.into());
        self
    }
}
