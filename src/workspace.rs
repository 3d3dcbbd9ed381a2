//! Batch workspaces: one git worktree per batch or session id under a
//! managed root directory.

use futures::future::join_all;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::context::AppContext;
use crate::error::{OrchestratorError, Result};
use crate::git::{is_git_repo, Vcs};
use crate::models::WorkspaceInfo;
use crate::parser::{is_valid_id, slug_or};

fn ticket_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z][A-Z0-9]*-\d+$").expect("ticket pattern"))
}

pub struct WorkspaceManager {
    vcs: Arc<dyn Vcs>,
    repo: PathBuf,
    root: PathBuf,
    branch_prefix: String,
}

impl WorkspaceManager {
    pub fn new(ctx: &AppContext, vcs: Arc<dyn Vcs>) -> Self {
        Self {
            vcs,
            repo: ctx.repo.clone(),
            root: ctx.worktree_root(),
            branch_prefix: ctx.config.workspace.branch_prefix.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// `feature/PROJ-12` for ticket ids, `feature/<slug>` for everything else
    pub fn branch_for(&self, id: &str) -> String {
        let name = if ticket_pattern().is_match(id) {
            id.to_string()
        } else {
            slug_or(id, "workspace")
        };
        format!("{}/{}", self.branch_prefix, name)
    }

    /// Describe the workspace `create` would produce without touching disk
    pub fn plan(&self, id: &str, branch: Option<&str>) -> Result<WorkspaceInfo> {
        if !is_valid_id(id) {
            return Err(OrchestratorError::validation(format!(
                "invalid workspace id '{}': use letters, digits and '-'",
                id
            )));
        }
        Ok(WorkspaceInfo {
            id: id.to_string(),
            branch_name: branch
                .map(str::to_string)
                .unwrap_or_else(|| self.branch_for(id)),
            path: self.path_for(id),
            base_path: self.repo.clone(),
        })
    }

    pub async fn create(&self, id: &str, branch: Option<&str>) -> Result<WorkspaceInfo> {
        let info = self.plan(id, branch)?;

        if tokio::fs::metadata(&info.path).await.is_ok() {
            return Err(OrchestratorError::resource(id, &info.path, "already exists"));
        }

        let exists = self
            .vcs
            .branch_exists(&self.repo, &info.branch_name)
            .await
            .map_err(|e| OrchestratorError::resource(id, &info.path, format!("{:#}", e)))?;

        self.vcs
            .add_worktree(&self.repo, &info.path, &info.branch_name, !exists)
            .await
            .map_err(|e| OrchestratorError::resource(id, &info.path, format!("{:#}", e)))?;

        info!(
            id,
            branch = %info.branch_name,
            path = %info.path.display(),
            resumed = exists,
            "workspace created"
        );
        Ok(info)
    }

    /// Remove the workspace for `id`. Removing an absent workspace succeeds.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let path = self.path_for(id);

        if tokio::fs::metadata(&path).await.is_err() {
            debug!(id, path = %path.display(), "workspace already gone");
            if let Err(e) = self.vcs.prune_worktrees(&self.repo).await {
                debug!(error = %e, "worktree prune skipped");
            }
            return Ok(());
        }

        let primary = self.vcs.remove_worktree(&self.repo, &path).await;
        if let Err(e) = &primary {
            warn!(id, error = %e, "git worktree remove failed, deleting directory");
        }

        if primary.is_err() || tokio::fs::metadata(&path).await.is_ok() {
            let fallback = match tokio::fs::remove_dir_all(&path).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            };
            if let Err(e) = self.vcs.prune_worktrees(&self.repo).await {
                warn!(id, error = %e, "worktree prune failed");
            }
            if let Err(fallback_err) = fallback {
                let message = match primary {
                    Err(primary_err) => format!("{:#}; {}", primary_err, fallback_err),
                    Ok(()) => fallback_err.to_string(),
                };
                return Err(OrchestratorError::resource(id, &path, message));
            }
        }

        info!(id, path = %path.display(), "workspace removed");
        Ok(())
    }

    /// Workspaces under the managed root whose directories still exist
    pub async fn list(&self) -> Result<Vec<WorkspaceInfo>> {
        if !is_git_repo(&self.repo) {
            return Err(OrchestratorError::resource(
                "*",
                &self.repo,
                "not a git repository",
            ));
        }

        let worktrees = self
            .vcs
            .list_worktrees(&self.repo)
            .await
            .map_err(|e| OrchestratorError::resource("*", &self.repo, format!("{:#}", e)))?;

        let canonical_root = tokio::fs::canonicalize(&self.root)
            .await
            .unwrap_or_else(|_| self.root.clone());

        let managed: Vec<_> = worktrees
            .into_iter()
            .filter(|w| w.path.starts_with(&self.root) || w.path.starts_with(&canonical_root))
            .collect();

        let present = join_all(managed.iter().map(|w| tokio::fs::metadata(&w.path))).await;

        Ok(managed
            .into_iter()
            .zip(present)
            .filter(|(_, meta)| meta.as_ref().map(|m| m.is_dir()).unwrap_or(false))
            .filter_map(|(w, _)| {
                let id = w.path.file_name()?.to_string_lossy().to_string();
                Some(WorkspaceInfo {
                    branch_name: w.branch.unwrap_or_default(),
                    id,
                    path: w.path,
                    base_path: self.repo.clone(),
                })
            })
            .collect())
    }
}
