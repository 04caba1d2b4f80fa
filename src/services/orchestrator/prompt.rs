//! Execution prompts handed to workers.

use std::fmt::Write;

use crate::domain::models::{Agent, ChecklistItem, Subtask, SubtaskStatus, Task};
use crate::services::directory::role_constraint;

/// Build the prompt for one worker run of `task` by `agent`.
pub(super) fn build_prompt(
    task: &Task,
    agent: &Agent,
    department_name: &str,
    subtasks: &[Subtask],
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are {}, {} of the {} department.",
        agent.name,
        agent.role.as_str().replace('_', " "),
        department_name
    );
    let _ = writeln!(prompt, "{}", role_constraint(agent.role));
    prompt.push('\n');

    if let Some(project) = &task.metadata.project {
        let _ = writeln!(prompt, "Project: {project}");
    }
    if let Some(goal) = &task.metadata.round_goal {
        let _ = writeln!(prompt, "Round goal: {goal}");
    }
    if let Some(requested_by) = &task.metadata.requested_by {
        let _ = writeln!(prompt, "Requested by: {requested_by}");
    }

    let _ = writeln!(prompt, "Task: {}", task.title);
    if task.description != task.title {
        prompt.push('\n');
        prompt.push_str(task.description.trim());
        prompt.push('\n');
    }

    if !task.metadata.checklist.is_empty() {
        prompt.push('\n');
        prompt.push_str(&render_checklist(&task.metadata.checklist));
    } else {
        let open: Vec<&Subtask> = subtasks
            .iter()
            .filter(|s| {
                s.status != SubtaskStatus::Done && !s.is_foreign_to(task.department_id.as_deref())
            })
            .collect();
        if !open.is_empty() {
            prompt.push_str("\nPlan:\n");
            for subtask in open {
                let _ = writeln!(prompt, "- {}", subtask.title);
            }
        }
    }

    prompt
}

/// Ordered checklist with the single-run instruction.
pub(super) fn render_checklist(items: &[ChecklistItem]) -> String {
    let mut out = String::from("Checklist (complete every item, in order, in one continuous run):\n");
    for (i, item) in items.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, item.title);
        if let Some(description) = &item.description {
            let _ = writeln!(out, "   {description}");
        }
    }
    out
}

/// Description of a batch child created for `parent`.
pub(super) fn batch_description(
    parent: &Task,
    department_name: &str,
    items: &[ChecklistItem],
) -> String {
    format!(
        "Requested by the {} work \"{}\" for the {department_name} department.\n\n{}\n{}",
        parent.department_id.as_deref().unwrap_or("owning"),
        parent.title,
        parent.description.trim(),
        render_checklist(items)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AgentRole, TaskMetadata};
    use uuid::Uuid;

    #[test]
    fn test_prompt_carries_role_and_metadata() {
        let task = Task::new("Add a login page").with_metadata(TaskMetadata {
            project: Some("portal".into()),
            round_goal: Some("ship auth".into()),
            ..Default::default()
        });
        let agent = Agent::new("Mina", AgentRole::Junior, "dev", "claude");
        let prompt = build_prompt(&task, &agent, "Development", &[]);

        assert!(prompt.contains("Mina, junior of the Development department"));
        assert!(prompt.contains(role_constraint(AgentRole::Junior)));
        assert!(prompt.contains("Project: portal"));
        assert!(prompt.contains("Round goal: ship auth"));
    }

    #[test]
    fn test_checklist_is_numbered_in_order() {
        let items = vec![
            ChecklistItem {
                subtask_id: Uuid::new_v4(),
                title: "Wireframe".into(),
                description: None,
            },
            ChecklistItem {
                subtask_id: Uuid::new_v4(),
                title: "Palette".into(),
                description: Some("dark mode too".into()),
            },
        ];
        let text = render_checklist(&items);
        let first = text.find("1. Wireframe").unwrap();
        let second = text.find("2. Palette").unwrap();
        assert!(first < second);
        assert!(text.contains("one continuous run"));
        assert!(text.contains("dark mode too"));
    }

    #[test]
    fn test_foreign_subtasks_stay_out_of_the_plan() {
        let task = Task::new("Build it").with_department("dev");
        let agent = Agent::new("Mina", AgentRole::Senior, "dev", "claude");
        let subtasks = vec![
            Subtask::new(task.id, "Write handler").targeting("dev"),
            Subtask::new(task.id, "Draw icons").targeting("design"),
        ];
        let prompt = build_prompt(&task, &agent, "Development", &subtasks);
        assert!(prompt.contains("- Write handler"));
        assert!(!prompt.contains("Draw icons"));
    }
}
