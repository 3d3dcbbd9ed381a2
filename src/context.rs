//! Per-invocation context handed to every component constructor.

use crate::config::Config;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    /// Repository that owns the managed worktrees
    pub repo: PathBuf,
    /// Correlates every log line of one CLI invocation
    pub run_id: Uuid,
    pub log_path: PathBuf,
    /// Whether attach may take over the terminal
    pub interactive: bool,
}

impl AppContext {
    pub fn new(config: Config, repo: PathBuf) -> Self {
        let log_path = config.log_path();
        Self {
            config: Arc::new(config),
            repo,
            run_id: Uuid::new_v4(),
            log_path,
            interactive: true,
        }
    }

    pub fn worktree_root(&self) -> PathBuf {
        self.config.worktree_root(&self.repo)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.config.registry_path()
    }

    pub fn span(&self) -> tracing::Span {
        tracing::info_span!("run", run_id = %self.run_id)
    }
}
