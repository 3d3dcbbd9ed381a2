use super::task::Task;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Planned but not started (dry run)
    Created,
    Running,
    Stopped,
    Failed,
}

/// One task's terminal session inside a batch workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// `<batch id>_<task session name>`
    pub id: String,
    pub multiplexer_name: String,
    pub task: Task,
    pub workspace_path: PathBuf,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Session {
    pub fn new(
        batch_id: &str,
        multiplexer_name: String,
        task: Task,
        workspace_path: PathBuf,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: session_id(batch_id, &task.session_name),
            multiplexer_name,
            task,
            workspace_path,
            status: SessionStatus::Created,
            created_at: now,
            last_activity: now,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = SessionStatus::Running;
        self.last_activity = Utc::now();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = SessionStatus::Failed;
        self.error = Some(error.into());
        self.last_activity = Utc::now();
    }
}

/// Deterministic session id for a task within a batch
pub fn session_id(batch_id: &str, session_name: &str) -> String {
    format!("{}_{}", batch_id, session_name)
}
