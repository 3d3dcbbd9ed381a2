//! Durable session registry backed by a single JSON document.
//!
//! Every mutation rewrites the whole file through a temp file and rename.
//! Two processes writing at once race last-writer-wins; nothing here locks
//! across processes.

use crate::error::{OrchestratorError, Result};
use crate::models::SessionRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub sessions: Vec<SessionRecord>,
    pub last_updated: DateTime<Utc>,
}

impl PersistedState {
    pub fn new() -> Self {
        Self {
            sessions: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

impl Default for PersistedState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct SessionRegistry {
    path: PathBuf,
}

impl SessionRegistry {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<PersistedState> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PersistedState::new());
            }
            Err(e) => return Err(OrchestratorError::registry(&self.path, e)),
        };

        if contents.trim().is_empty() {
            return Ok(PersistedState::new());
        }

        serde_json::from_str(&contents)
            .map_err(|e| OrchestratorError::registry(&self.path, format!("invalid JSON: {}", e)))
    }

    async fn store(&self, mut state: PersistedState) -> Result<()> {
        state.last_updated = Utc::now();
        let contents = serde_json::to_string_pretty(&state)
            .map_err(|e| OrchestratorError::registry(&self.path, e))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| OrchestratorError::registry(&self.path, e))?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let write = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(contents.as_bytes()).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp_path, &self.path).await
        };

        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(OrchestratorError::registry(&self.path, e));
        }

        debug!(path = %self.path().display(), sessions = state.sessions.len(), "registry saved");
        Ok(())
    }

    pub async fn get_all(&self) -> Result<Vec<SessionRecord>> {
        Ok(self.load().await?.sessions)
    }

    pub async fn get(&self, id: &str) -> Result<Option<SessionRecord>> {
        Ok(self
            .load()
            .await?
            .sessions
            .into_iter()
            .find(|s| s.id == id))
    }

    /// Insert or replace the record with the same id
    pub async fn save(&self, record: &SessionRecord) -> Result<()> {
        let mut state = self.load().await?;
        match state.sessions.iter_mut().find(|s| s.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => state.sessions.push(record.clone()),
        }
        self.store(state).await
    }

    /// Remove a record; returns whether one existed
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let mut state = self.load().await?;
        let before = state.sessions.len();
        state.sessions.retain(|s| s.id != id);
        if state.sessions.len() == before {
            return Ok(false);
        }
        self.store(state).await?;
        Ok(true)
    }
}
