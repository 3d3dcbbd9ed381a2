//! Per-session environment setup: banner, context file and agent command.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::AgentConfig;
use crate::models::Task;

/// Placeholder in the agent command template
pub const CONTEXT_PLACEHOLDER: &str = "{context}";

/// Single-quote `value` for a POSIX shell
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[derive(Debug, Clone)]
pub struct AgentLauncher {
    command: Option<String>,
    context_dir: PathBuf,
}

impl AgentLauncher {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            command: config.command.clone().filter(|c| !c.trim().is_empty()),
            context_dir: config.context_dir.clone(),
        }
    }

    /// Program name of the agent command, recorded on registry entries
    pub fn agent_name(&self) -> Option<String> {
        self.command
            .as_deref()
            .and_then(|c| c.split_whitespace().next())
            .map(str::to_string)
    }

    pub fn context_path(&self, workspace: &Path, task: &Task) -> PathBuf {
        workspace
            .join(&self.context_dir)
            .join(format!("{}.md", task.session_name))
    }

    /// Write the task brief into the workspace and return its path
    pub async fn write_context(
        &self,
        workspace: &Path,
        batch_id: &str,
        task: &Task,
    ) -> Result<PathBuf> {
        let path = self.context_path(workspace, task);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&path, task.context_document(batch_id))
            .await
            .with_context(|| format!("Failed to write context file {}", path.display()))?;
        Ok(path)
    }

    /// Shell line that starts the agent, if an agent command is configured
    pub fn launch_command(&self, context_file: &Path) -> Option<String> {
        let template = self.command.as_ref()?;
        let quoted = shell_quote(&context_file.to_string_lossy());
        Some(template.replace(CONTEXT_PLACEHOLDER, &quoted))
    }

    /// Shell line echoing a short description of the task
    pub fn banner(batch_id: &str, task: &Task) -> String {
        let mut line = format!(
            "printf '%s\\n' {} {}",
            shell_quote(&format!("== {} ==", task.name)),
            shell_quote(&format!(
                "batch {} | {} | {} priority",
                batch_id,
                task.id,
                task.priority.as_str()
            )),
        );
        if !task.description.is_empty() {
            line.push(' ');
            line.push_str(&shell_quote(&task.description));
        }
        line
    }
}
