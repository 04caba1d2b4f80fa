use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Fixed execution order for batched cross-department work.
pub const DEPARTMENT_EXECUTION_PRIORITY: [&str; 6] =
    ["dev", "design", "qa", "operations", "devsecops", "planning"];

/// A department of the organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    /// Slug, e.g. `dev`
    pub id: String,
    pub name: String,
    /// Alternate names (localized) used for mention detection
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub sort_order: i64,
}

impl Department {
    pub fn new(id: impl Into<String>, name: impl Into<String>, sort_order: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            aliases: Vec::new(),
            sort_order,
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    /// All names this department answers to, lowercased.
    pub fn names(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(self.id.to_lowercase())
            .chain(std::iter::once(self.name.to_lowercase()))
            .chain(self.aliases.iter().map(|a| a.to_lowercase()))
    }
}

/// Position of a department in the fixed execution priority, if listed.
pub fn execution_priority(department_id: &str) -> Option<usize> {
    DEPARTMENT_EXECUTION_PRIORITY
        .iter()
        .position(|d| d.eq_ignore_ascii_case(department_id))
}

/// Order two departments for batched execution.
///
/// Listed departments come first in priority order; unknown ones follow by
/// their configured sort order, then id.
pub fn execution_order(
    a_id: &str,
    a_sort: Option<i64>,
    b_id: &str,
    b_sort: Option<i64>,
) -> Ordering {
    match (execution_priority(a_id), execution_priority(b_id)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a_sort
            .unwrap_or(i64::MAX)
            .cmp(&b_sort.unwrap_or(i64::MAX))
            .then_with(|| a_id.cmp(b_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_listed_departments() {
        assert_eq!(execution_order("dev", None, "qa", None), Ordering::Less);
        assert_eq!(execution_order("planning", None, "design", None), Ordering::Greater);
    }

    #[test]
    fn test_unknown_departments_follow_sort_order() {
        assert_eq!(execution_order("legal", Some(1), "planning", None), Ordering::Greater);
        assert_eq!(execution_order("legal", Some(1), "finance", Some(2)), Ordering::Less);
        assert_eq!(execution_order("b", None, "a", None), Ordering::Greater);
    }

    #[test]
    fn test_names_include_aliases() {
        let dept = Department::new("design", "Design", 2).with_aliases(["디자인", "デザイン"]);
        let names: Vec<_> = dept.names().collect();
        assert!(names.contains(&"design".to_string()));
        assert!(names.contains(&"디자인".to_string()));
    }
}
