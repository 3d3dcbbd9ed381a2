//! Line-oriented task document parser.
//!
//! A task document is markdown-ish: header lines open sections, checkbox
//! bullets open tasks, and indented `Label:` lines attach fields to the
//! task above them. Parsing is deliberately lenient; the only hard failure
//! is a document that cannot be read.

use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

use super::slug::{sanitize_id, slug_or};
use crate::error::{OrchestratorError, Result};
use crate::models::{Priority, Task, TaskContext, TaskDocMetadata, TaskMetadata, TaskStatus};

fn header_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s{0,3}(#{1,6})\s+(.*?)\s*#*\s*$").expect("header pattern"))
}

fn task_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*[-*+]\s+\[([ xX])\]\s*(.*)$").expect("task pattern"))
}

fn field_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:[-*+]\s+)?(session[\s_-]*name|description|desc|technical(?:\s+details?)?|tech|dependencies|depends\s+on|deps|acceptance(?:\s+criteria)?|notes?|(?:estimated\s+)?time|estimate)\s*:\s*(.*)$",
        )
        .expect("field pattern")
    })
}

fn batch_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*batch(?:[\s_-]*id)?\s*:\s*(\S+)\s*$").expect("batch pattern")
    })
}

fn tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|\s)#([A-Za-z][\w-]*)").expect("tag pattern"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Field {
    SessionName,
    Description,
    Technical,
    Dependencies,
    Acceptance,
    Notes,
    Time,
}

impl Field {
    fn from_label(label: &str) -> Option<Self> {
        let label = label.to_lowercase();
        let head = label.split_whitespace().next().unwrap_or("");
        match head {
            h if h.starts_with("session") => Some(Field::SessionName),
            "description" | "desc" => Some(Field::Description),
            "technical" | "tech" => Some(Field::Technical),
            "dependencies" | "depends" | "deps" => Some(Field::Dependencies),
            "acceptance" => Some(Field::Acceptance),
            "note" | "notes" => Some(Field::Notes),
            "time" | "estimated" | "estimate" => Some(Field::Time),
            _ => None,
        }
    }
}

/// Task block being accumulated while its lines are consumed
struct TaskBuilder {
    ordinal: usize,
    line_number: usize,
    checked: bool,
    name: String,
    inline_description: Option<String>,
    section: String,
    tags: Vec<String>,
    fields: BTreeMap<Field, Vec<String>>,
    active: Option<Field>,
}

impl TaskBuilder {
    fn open(ordinal: usize, line_number: usize, checked: bool, text: &str, section: &str) -> Self {
        let mut tags = Vec::new();
        for cap in tag_pattern().captures_iter(text) {
            if let Some(tag) = cap.get(1) {
                tags.push(tag.as_str().to_lowercase());
            }
        }
        let text = tag_pattern().replace_all(text, "");
        let text = text.trim();

        let (name, inline_description) = match text.split_once(':') {
            Some((name, rest)) if !name.trim().is_empty() => {
                let rest = rest.trim();
                (
                    name.trim().to_string(),
                    (!rest.is_empty()).then(|| rest.to_string()),
                )
            }
            _ => (text.to_string(), None),
        };

        Self {
            ordinal,
            line_number,
            checked,
            name,
            inline_description,
            section: section.to_string(),
            tags,
            fields: BTreeMap::new(),
            active: None,
        }
    }

    fn start_field(&mut self, field: Field, value: &str) {
        let lines = self.fields.entry(field).or_default();
        let value = value.trim();
        if !value.is_empty() {
            lines.push(value.to_string());
        }
        self.active = Some(field);
    }

    fn continue_line(&mut self, line: &str) {
        let field = self.active.unwrap_or(Field::Description);
        self.fields
            .entry(field)
            .or_default()
            .push(line.trim().to_string());
    }

    fn field(&self, field: Field) -> Option<String> {
        self.fields
            .get(&field)
            .filter(|lines| !lines.is_empty())
            .map(|lines| lines.join("\n"))
    }

    fn build(self) -> Task {
        let name = if self.name.is_empty() {
            format!("Task {}", self.ordinal)
        } else {
            self.name.clone()
        };

        let description = match (&self.inline_description, self.field(Field::Description)) {
            (Some(inline), Some(body)) => format!("{}\n{}", inline, body),
            (Some(inline), None) => inline.clone(),
            (None, Some(body)) => body,
            (None, None) => String::new(),
        };

        let session_name = match self.field(Field::SessionName) {
            Some(explicit) => slug_or(&explicit, "task"),
            None => slug_or(&name, "task"),
        };

        let priority = Priority::infer(&format!("{} {}", name, description));
        let status = TaskStatus::derive(self.checked, &self.section);

        Task {
            id: format!("task-{:03}", self.ordinal),
            name,
            description,
            session_name,
            section: self.section.clone(),
            priority,
            status,
            context: TaskContext {
                technical_details: self.field(Field::Technical),
                dependencies: self.field(Field::Dependencies),
                acceptance_criteria: self.field(Field::Acceptance),
                notes: self.field(Field::Notes),
                estimated_time: self.field(Field::Time),
            },
            metadata: TaskMetadata {
                line_number: self.line_number,
                tags: self.tags,
            },
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TaskSpecParser;

impl TaskSpecParser {
    pub fn new() -> Self {
        Self
    }

    /// Read and parse a task document, returning only the executable tasks.
    pub async fn parse(&self, path: &Path) -> Result<(Vec<Task>, TaskDocMetadata)> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OrchestratorError::validation(format!(
                    "task document not found: {}",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(OrchestratorError::validation(format!(
                    "cannot read task document {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let (tasks, metadata) = self.parse_str(&content, path);
        info!(
            source = %path.display(),
            total = metadata.total_tasks,
            executable = metadata.executable_tasks,
            "parsed task document"
        );
        Ok((tasks, metadata))
    }

    /// Parse document text. Never fails: unrecognized lines are skipped.
    pub fn parse_str(&self, content: &str, source: &Path) -> (Vec<Task>, TaskDocMetadata) {
        let mut metadata = TaskDocMetadata {
            source: source.to_path_buf(),
            ..TaskDocMetadata::default()
        };
        let mut all_tasks = Vec::new();
        let mut section = String::new();
        let mut current: Option<TaskBuilder> = None;

        for (idx, line) in content.lines().enumerate() {
            let line_number = idx + 1;

            if line.trim().is_empty() {
                if let Some(builder) = current.take() {
                    all_tasks.push(builder.build());
                }
                continue;
            }

            if let Some(cap) = task_pattern().captures(line) {
                if let Some(builder) = current.take() {
                    all_tasks.push(builder.build());
                }
                let checked = cap.get(1).is_some_and(|m| m.as_str() != " ");
                let text = cap.get(2).map_or("", |m| m.as_str());
                current = Some(TaskBuilder::open(
                    all_tasks.len() + 1,
                    line_number,
                    checked,
                    text,
                    &section,
                ));
                continue;
            }

            if let Some(cap) = header_pattern().captures(line) {
                if let Some(builder) = current.take() {
                    all_tasks.push(builder.build());
                }
                let level = cap.get(1).map_or(0, |m| m.as_str().len());
                section = cap.get(2).map_or("", |m| m.as_str()).trim().to_string();
                if level == 1 && metadata.title.is_none() {
                    metadata.title = Some(section.clone());
                }
                if !section.is_empty() && !metadata.sections.contains(&section) {
                    metadata.sections.push(section.clone());
                }
                continue;
            }

            if let Some(builder) = current.as_mut() {
                if let Some(cap) = field_pattern().captures(line) {
                    let label = cap.get(1).map_or("", |m| m.as_str());
                    if let Some(field) = Field::from_label(label) {
                        builder.start_field(field, cap.get(2).map_or("", |m| m.as_str()));
                        continue;
                    }
                }

                if line.starts_with(char::is_whitespace) {
                    builder.continue_line(line);
                    continue;
                }

                // An unindented line ends the block
                if let Some(builder) = current.take() {
                    all_tasks.push(builder.build());
                }
            }

            if let Some(cap) = batch_pattern().captures(line) {
                if metadata.batch_id.is_none() {
                    let id = sanitize_id(cap.get(1).map_or("", |m| m.as_str()));
                    if !id.is_empty() {
                        metadata.batch_id = Some(id);
                    }
                }
                continue;
            }

            debug!(line = line_number, "skipping unrecognized line");
        }

        if let Some(builder) = current.take() {
            all_tasks.push(builder.build());
        }

        metadata.total_tasks = all_tasks.len();
        metadata.completed_tasks = all_tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        metadata.blocked_tasks = all_tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Blocked)
            .count();

        let executable: Vec<Task> = all_tasks
            .into_iter()
            .filter(|t| t.status.is_executable())
            .collect();
        metadata.executable_tasks = executable.len();

        (executable, metadata)
    }
}
