use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Active,
    Stopped,
    Failed,
    Paused,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Stopped => "stopped",
            RecordStatus::Failed => "failed",
            RecordStatus::Paused => "paused",
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Persisted entry of the session registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub branch: String,
    pub worktree_path: PathBuf,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    #[serde(default)]
    pub agents: Vec<String>,
    /// Task session names hosted by this record (empty for single sessions)
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>, branch: impl Into<String>, worktree_path: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            branch: branch.into(),
            worktree_path,
            status: RecordStatus::Active,
            created_at: now,
            last_active: now,
            agents: Vec::new(),
            tasks: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }

    /// Format last_active as a human-readable relative time string
    pub fn last_active_display(&self) -> String {
        let duration = Utc::now().signed_duration_since(self.last_active);

        if duration.num_seconds() < 60 {
            "just now".to_string()
        } else if duration.num_minutes() < 60 {
            format!("{}m ago", duration.num_minutes())
        } else if duration.num_hours() < 24 {
            format!("{}h ago", duration.num_hours())
        } else if duration.num_days() == 1 {
            "yesterday".to_string()
        } else if duration.num_days() < 7 {
            format!("{}d ago", duration.num_days())
        } else {
            self.last_active.format("%b %d").to_string()
        }
    }
}
