//! Batch orchestration: one workspace per batch, one multiplexer session per
//! executable task.
//!
//! Sessions are created one at a time. A failing task is recorded on its
//! `Session` and in the summary; it never stops the remaining tasks. Banner,
//! context file, agent launch and protocol notification are best-effort.
//!
//! Cancellation is checked between tasks, never inside one: a `tmux` or `git`
//! command that was already dispatched runs to completion, so whatever it
//! creates exists by the time `orchestrate` returns.

mod launcher;

use chrono::Local;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use launcher::AgentLauncher;

use crate::context::AppContext;
use crate::error::{OrchestratorError, Result};
use crate::models::{OrchestrationResult, Session, Task, TaskDocMetadata, WorkspaceInfo};
use crate::mux::{Multiplexer, MuxError, SessionName};
use crate::parser::sanitize_id;
use crate::protocol::ToolProtocolClient;
use crate::workspace::WorkspaceManager;

/// Batch id from the explicit argument, the task document, or the clock
pub fn resolve_batch_id(explicit: Option<&str>, metadata: &TaskDocMetadata) -> Result<String> {
    let raw = explicit
        .map(str::to_string)
        .or_else(|| metadata.batch_id.clone())
        .unwrap_or_else(|| Local::now().format("batch-%Y%m%d-%H%M%S").to_string());

    let id = sanitize_id(&raw);
    if id.is_empty() {
        return Err(OrchestratorError::validation(format!(
            "batch id '{}' has no usable characters",
            raw
        )));
    }
    Ok(id)
}

/// `base`, or `base-2`, `base-3`, ... when already taken in this batch
fn unique_session_name(base: &str, used: &mut HashSet<String>) -> String {
    if used.insert(base.to_string()) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if used.insert(candidate.clone()) {
            warn!(session = base, renamed = %candidate, "duplicate session name");
            return candidate;
        }
        n += 1;
    }
}

pub struct SessionOrchestrator {
    workspaces: Arc<WorkspaceManager>,
    mux: Arc<dyn Multiplexer>,
    launcher: AgentLauncher,
    protocol: Option<Arc<dyn ToolProtocolClient>>,
    prefix: String,
    banner: bool,
}

impl SessionOrchestrator {
    pub fn new(
        ctx: &AppContext,
        workspaces: Arc<WorkspaceManager>,
        mux: Arc<dyn Multiplexer>,
    ) -> Self {
        Self {
            workspaces,
            mux,
            launcher: AgentLauncher::new(&ctx.config.agent),
            protocol: None,
            prefix: ctx.config.mux.prefix.clone(),
            banner: ctx.config.mux.banner,
        }
    }

    pub fn with_protocol(mut self, client: Arc<dyn ToolProtocolClient>) -> Self {
        self.protocol = Some(client);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn launcher(&self) -> &AgentLauncher {
        &self.launcher
    }

    /// Tasks not reached before `cancel` fires are left `Created` and counted
    /// as skipped.
    pub async fn orchestrate(
        &self,
        tasks: &[Task],
        metadata: &TaskDocMetadata,
        batch_id: Option<&str>,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> Result<OrchestrationResult> {
        let batch_id = resolve_batch_id(batch_id, metadata)?;
        SessionName::batch(&self.prefix, &batch_id)?;

        let workspace = if dry_run {
            self.workspaces.plan(&batch_id, None)?
        } else {
            self.workspaces.create(&batch_id, None).await?
        };
        info!(
            batch = %batch_id,
            tasks = tasks.len(),
            dry_run,
            workspace = %workspace.path.display(),
            "orchestrating batch"
        );

        let mut result = OrchestrationResult::new(batch_id.clone(), workspace.clone());
        let mut used = HashSet::new();

        for task in tasks {
            let mut task = task.clone();
            task.session_name = unique_session_name(&task.session_name, &mut used);

            let session = if dry_run {
                self.planned_session(&batch_id, &workspace, task)
            } else if cancel.is_cancelled() {
                debug!(batch = %batch_id, task = %task.id, "cancelled, task not started");
                self.planned_session(&batch_id, &workspace, task)
            } else {
                self.start_session(&batch_id, &workspace, task).await
            };
            result.push(session);
        }

        info!(
            batch = %batch_id,
            total = result.summary.total,
            success = result.summary.success,
            failed = result.summary.failed,
            skipped = result.summary.skipped,
            "batch orchestrated"
        );
        Ok(result)
    }

    fn planned_session(&self, batch_id: &str, workspace: &WorkspaceInfo, task: Task) -> Session {
        let name = SessionName::task(&self.prefix, batch_id, &task.session_name)
            .map(|n| n.encode())
            .unwrap_or_default();
        Session::new(batch_id, name, task, workspace.path.clone())
    }

    async fn start_session(
        &self,
        batch_id: &str,
        workspace: &WorkspaceInfo,
        task: Task,
    ) -> Session {
        let name = match SessionName::task(&self.prefix, batch_id, &task.session_name) {
            Ok(name) => name.encode(),
            Err(e) => {
                let mut session =
                    Session::new(batch_id, String::new(), task, workspace.path.clone());
                session.mark_failed(e.to_string());
                return session;
            }
        };

        let mut session = Session::new(batch_id, name.clone(), task, workspace.path.clone());
        match self.mux.new_session(&name, &workspace.path).await {
            Ok(()) => {
                session.mark_running();
                info!(session = %name, task = %session.task.id, "session started");
                self.prepare_session(batch_id, &session).await;
            }
            Err(e) => {
                warn!(session = %name, error = %e, "session creation failed");
                session.mark_failed(e.to_string());
            }
        }
        session
    }

    async fn prepare_session(&self, batch_id: &str, session: &Session) {
        let name = &session.multiplexer_name;

        if self.banner {
            let banner = AgentLauncher::banner(batch_id, &session.task);
            if let Err(e) = self.mux.send_keys(name, &banner).await {
                warn!(session = %name, error = %e, "banner not written");
            }
        }

        match self
            .launcher
            .write_context(&session.workspace_path, batch_id, &session.task)
            .await
        {
            Ok(path) => {
                debug!(session = %name, context = %path.display(), "context file written");
                if let Some(command) = self.launcher.launch_command(&path) {
                    if let Err(e) = self.mux.send_keys(name, &command).await {
                        warn!(session = %name, error = %e, "agent not launched");
                    }
                }
            }
            Err(e) => {
                warn!(session = %name, error = %format!("{:#}", e), "context file not written")
            }
        }

        if let Some(protocol) = &self.protocol {
            let params = json!({
                "batchId": batch_id,
                "session": name,
                "taskId": session.task.id,
                "task": session.task.name,
                "workspace": session.workspace_path,
            });
            if let Err(e) = protocol.call("session/started", params).await {
                warn!(session = %name, error = %e, "session/started notification failed");
            }
        }
    }

    /// Live sessions created with this orchestrator's prefix
    pub async fn list_active(&self) -> Result<Vec<SessionName>> {
        let names = match self.mux.list_sessions().await {
            Ok(names) => names,
            Err(MuxError::NotAvailable(tool)) => {
                warn!(tool, "multiplexer not available, no sessions to list");
                return Ok(Vec::new());
            }
            Err(e) => {
                let scan = SessionName::scan_prefix(&self.prefix);
                return Err(OrchestratorError::session(&scan, e));
            }
        };

        let scan = SessionName::scan_prefix(&self.prefix);
        Ok(names
            .iter()
            .filter(|n| n.starts_with(&scan))
            .filter_map(|n| SessionName::decode(n))
            .filter(|n| n.prefix() == self.prefix)
            .collect())
    }

    /// Kill one session. A session that is already gone counts as stopped.
    pub async fn stop(&self, name: &str) -> Result<()> {
        match self.mux.kill_session(name).await {
            Ok(()) => {
                info!(session = name, "session stopped");
                Ok(())
            }
            Err(MuxError::NotFound(_)) => {
                debug!(session = name, "session already gone");
                Ok(())
            }
            Err(MuxError::NotAvailable(tool)) => {
                warn!(session = name, tool, "multiplexer not available, nothing to stop");
                Ok(())
            }
            Err(e) => Err(OrchestratorError::session(name, e)),
        }
    }

    /// Kill the batch session and every task session of `batch_id`
    pub async fn stop_all(&self, batch_id: &str) -> Result<()> {
        let targets: Vec<SessionName> = self
            .list_active()
            .await?
            .into_iter()
            .filter(|n| n.batch_id() == batch_id)
            .collect();

        let mut errors = Vec::new();
        for name in targets {
            debug!(batch = batch_id, task = ?name.task_name(), "stopping session");
            if let Err(e) = self.stop(&name.encode()).await {
                errors.push(e);
            }
        }
        OrchestratorError::from_steps(errors)
    }

    /// Stop every session of the batch, then remove its workspace. Both steps
    /// always run.
    pub async fn cleanup(&self, batch_id: &str) -> Result<()> {
        let mut errors = Vec::new();
        if let Err(e) = self.stop_all(batch_id).await {
            warn!(batch = batch_id, error = %e, "stopping sessions failed during cleanup");
            errors.push(e);
        }
        if let Err(e) = self.workspaces.remove(batch_id).await {
            warn!(batch = batch_id, error = %e, "removing workspace failed during cleanup");
            errors.push(e);
        }
        OrchestratorError::from_steps(errors)
    }
}
