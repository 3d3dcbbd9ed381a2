use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Infer priority from free text: urgent/critical/high win over low/nice to have
    pub fn infer(text: &str) -> Self {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        if words
            .iter()
            .any(|w| matches!(*w, "urgent" | "critical" | "high"))
        {
            Priority::High
        } else if words.contains(&"low") || lower.contains("nice to have") {
            Priority::Low
        } else {
            Priority::Medium
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Blocked,
    Completed,
}

impl TaskStatus {
    /// Derive status from the checkbox mark and the enclosing section title
    pub fn derive(checked: bool, section: &str) -> Self {
        if checked {
            return TaskStatus::Completed;
        }
        let section = section.to_lowercase();
        if section.contains("in progress") || section.contains("in-progress") {
            TaskStatus::InProgress
        } else if section.contains("blocked") {
            TaskStatus::Blocked
        } else {
            TaskStatus::Todo
        }
    }

    /// Only todo and in-progress tasks reach session creation
    pub fn is_executable(&self) -> bool {
        matches!(self, TaskStatus::Todo | TaskStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// 1-based line of the task marker in the source document
    pub line_number: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// A task parsed from the task document. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub description: String,
    pub session_name: String,
    pub section: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub context: TaskContext,
    pub metadata: TaskMetadata,
}

impl Task {
    /// Markdown brief handed to the agent launched in this task's session
    pub fn context_document(&self, batch_id: &str) -> String {
        let mut doc = format!("# {}\n\n", self.name);
        doc.push_str(&format!("- Batch: {}\n", batch_id));
        doc.push_str(&format!("- Task: {}\n", self.id));
        if !self.section.is_empty() {
            doc.push_str(&format!("- Section: {}\n", self.section));
        }
        doc.push_str(&format!("- Priority: {}\n", self.priority.as_str()));
        if !self.metadata.tags.is_empty() {
            doc.push_str(&format!("- Tags: {}\n", self.metadata.tags.join(", ")));
        }

        if !self.description.is_empty() {
            doc.push_str(&format!("\n## Description\n\n{}\n", self.description));
        }

        let sections = [
            ("Technical details", &self.context.technical_details),
            ("Dependencies", &self.context.dependencies),
            ("Acceptance criteria", &self.context.acceptance_criteria),
            ("Notes", &self.context.notes),
            ("Estimated time", &self.context.estimated_time),
        ];
        for (title, body) in sections {
            if let Some(body) = body {
                doc.push_str(&format!("\n## {}\n\n{}\n", title, body));
            }
        }

        doc
    }
}

/// Document-level information gathered while parsing a task list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDocMetadata {
    pub source: PathBuf,
    pub title: Option<String>,
    pub batch_id: Option<String>,
    pub sections: Vec<String>,
    pub total_tasks: usize,
    pub executable_tasks: usize,
    pub completed_tasks: usize,
    pub blocked_tasks: usize,
}
