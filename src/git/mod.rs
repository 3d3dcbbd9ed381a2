mod worktree;

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

pub use worktree::{is_git_repo, GitCli, WorktreeInfo, WORKTREES_DIR};

/// Version-control command surface used by the workspace manager
#[async_trait]
pub trait Vcs: Send + Sync {
    async fn branch_exists(&self, repo: &Path, branch: &str) -> Result<bool>;

    async fn add_worktree(
        &self,
        repo: &Path,
        path: &Path,
        branch: &str,
        create_branch: bool,
    ) -> Result<()>;

    async fn remove_worktree(&self, repo: &Path, path: &Path) -> Result<()>;

    async fn list_worktrees(&self, repo: &Path) -> Result<Vec<WorktreeInfo>>;

    async fn prune_worktrees(&self, repo: &Path) -> Result<()>;
}
