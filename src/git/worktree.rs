//! Git worktree operations backing batch workspaces.
//!
//! Thin async wrappers over the `git` CLI. Each batch gets its own worktree
//! so agents working on different batches never share a checkout.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

use super::Vcs;

/// Directory name for storing batch worktrees
pub const WORKTREES_DIR: &str = ".worktrees";

async fn git(repo_path: &Path, args: &[&str]) -> Result<Output> {
    debug!(repo = %repo_path.display(), "git {}", args.join(" "));
    Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .await
        .with_context(|| format!("Failed to execute git {}", args.first().unwrap_or(&"")))
}

fn path_arg(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("Path is not valid UTF-8: {}", path.display()))
}

/// Check if a path is a git repository (or a worktree of one)
pub fn is_git_repo(path: &Path) -> bool {
    path.join(".git").exists()
}

/// Check whether a local branch exists
pub async fn branch_exists(repo_path: &Path, branch_name: &str) -> Result<bool> {
    let reference = format!("refs/heads/{}", branch_name);
    let output = git(repo_path, &["show-ref", "--verify", "--quiet", &reference]).await?;

    // show-ref exits 1 for a missing ref; anything else is a real failure
    match output.status.code() {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        _ => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("Failed to look up branch '{}': {}", branch_name, stderr);
        }
    }
}

/// Create a worktree at `worktree_path`.
///
/// With `create_branch` the branch is created at the current HEAD, otherwise
/// the existing branch is checked out.
pub async fn create_worktree(
    repo_path: &Path,
    branch_name: &str,
    worktree_path: &Path,
    create_branch: bool,
) -> Result<()> {
    if !is_git_repo(repo_path) {
        bail!("{} is not a git repository", repo_path.display());
    }

    if let Some(parent) = worktree_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("Failed to create worktree parent directory")?;
    }

    let path = path_arg(worktree_path)?;
    let output = if create_branch {
        git(repo_path, &["worktree", "add", "-b", branch_name, path]).await?
    } else {
        git(repo_path, &["worktree", "add", path, branch_name]).await?
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "Failed to create worktree at '{}' for branch '{}': {}",
            worktree_path.display(),
            branch_name,
            stderr.trim()
        );
    }

    Ok(())
}

/// Remove a worktree, discarding uncommitted changes
pub async fn remove_worktree(repo_path: &Path, worktree_path: &Path) -> Result<()> {
    let output = git(
        repo_path,
        &["worktree", "remove", "--force", path_arg(worktree_path)?],
    )
    .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "Failed to remove worktree at '{}': {}",
            worktree_path.display(),
            stderr.trim()
        );
    }

    Ok(())
}

/// Drop administrative entries for worktrees whose directories are gone
pub async fn prune_worktrees(repo_path: &Path) -> Result<()> {
    let output = git(repo_path, &["worktree", "prune"]).await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("Failed to prune worktrees: {}", stderr.trim());
    }

    Ok(())
}

/// List all worktrees in a repository
pub async fn list_worktrees(repo_path: &Path) -> Result<Vec<WorktreeInfo>> {
    let output = git(repo_path, &["worktree", "list", "--porcelain"]).await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("Failed to list worktrees: {}", stderr.trim());
    }

    Ok(parse_worktree_list(&String::from_utf8_lossy(&output.stdout)))
}

fn parse_worktree_list(stdout: &str) -> Vec<WorktreeInfo> {
    let mut worktrees = Vec::new();
    let mut current_path: Option<PathBuf> = None;
    let mut current_branch: Option<String> = None;

    for line in stdout.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            // Save previous worktree if we have one
            if let Some(path) = current_path.take() {
                worktrees.push(WorktreeInfo {
                    path,
                    branch: current_branch.take(),
                });
            }
            current_path = Some(PathBuf::from(path));
        } else if let Some(branch) = line.strip_prefix("branch refs/heads/") {
            current_branch = Some(branch.to_string());
        }
    }

    // Don't forget the last worktree
    if let Some(path) = current_path {
        worktrees.push(WorktreeInfo {
            path,
            branch: current_branch,
        });
    }

    worktrees
}

/// Information about a git worktree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: Option<String>,
}

/// `Vcs` implementation that shells out to the `git` binary
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCli;

#[async_trait]
impl Vcs for GitCli {
    async fn branch_exists(&self, repo: &Path, branch: &str) -> Result<bool> {
        branch_exists(repo, branch).await
    }

    async fn add_worktree(
        &self,
        repo: &Path,
        path: &Path,
        branch: &str,
        create_branch: bool,
    ) -> Result<()> {
        create_worktree(repo, branch, path, create_branch).await
    }

    async fn remove_worktree(&self, repo: &Path, path: &Path) -> Result<()> {
        remove_worktree(repo, path).await
    }

    async fn list_worktrees(&self, repo: &Path) -> Result<Vec<WorktreeInfo>> {
        list_worktrees(repo).await
    }

    async fn prune_worktrees(&self, repo: &Path) -> Result<()> {
        prune_worktrees(repo).await
    }
}
