use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An isolated git worktree owned by one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub id: String,
    pub branch_name: String,
    pub path: PathBuf,
    /// Repository the worktree was created from
    pub base_path: PathBuf,
}

impl WorkspaceInfo {
    pub fn display_path(&self) -> String {
        self.path
            .to_str()
            .map(|s| {
                if let Some(home) = dirs::home_dir() {
                    if let Some(home_str) = home.to_str() {
                        if s.starts_with(home_str) {
                            return format!("~{}", &s[home_str.len()..]);
                        }
                    }
                }
                s.to_string()
            })
            .unwrap_or_else(|| self.path.display().to_string())
    }
}
