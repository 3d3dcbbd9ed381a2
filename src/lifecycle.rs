//! User-facing session lifecycle: create, batch, attach, stop, delete, list.
//!
//! Every operation that creates more than one resource undoes what it built
//! when a later step fails, so a failed command leaves no orphaned worktree
//! or multiplexer session behind.

use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::context::AppContext;
use crate::error::{OrchestratorError, Result};
use crate::git::{GitCli, Vcs};
use crate::models::{
    OrchestrationResult, RecordStatus, SessionRecord, SessionStatus, TaskDocMetadata,
};
use crate::mux::{Multiplexer, SessionName, TmuxMultiplexer};
use crate::orchestrator::{resolve_batch_id, SessionOrchestrator};
use crate::parser::TaskSpecParser;
use crate::persistence::SessionRegistry;
use crate::protocol::{ProcessToolClient, ToolProtocolClient};
use crate::workspace::WorkspaceManager;

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Branch to check out instead of the one derived from the id
    pub branch: Option<String>,
    pub agents: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub batch_id: Option<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    pub keep_workspace: bool,
    pub keep_session: bool,
}

/// Resolves with the signal number on SIGINT or SIGTERM
#[cfg(unix)]
pub async fn shutdown_signal() -> i32 {
    let ctrl_c = tokio::signal::ctrl_c();
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                Ok(()) = ctrl_c => libc::SIGINT,
                _ = sigterm.recv() => libc::SIGTERM,
            }
        }
        Err(err) => {
            warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
            let _ = ctrl_c.await;
            libc::SIGINT
        }
    }
}

#[cfg(not(unix))]
pub async fn shutdown_signal() -> i32 {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "ctrl-c signal handler failed");
        std::future::pending::<()>().await;
    }
    2
}

pub struct LifecycleController {
    ctx: AppContext,
    registry: SessionRegistry,
    workspaces: Arc<WorkspaceManager>,
    orchestrator: SessionOrchestrator,
    mux: Arc<dyn Multiplexer>,
    parser: TaskSpecParser,
}

impl LifecycleController {
    pub fn new(
        ctx: AppContext,
        vcs: Arc<dyn Vcs>,
        mux: Arc<dyn Multiplexer>,
        protocol: Option<Arc<dyn ToolProtocolClient>>,
    ) -> Self {
        let workspaces = Arc::new(WorkspaceManager::new(&ctx, vcs));
        let mut orchestrator = SessionOrchestrator::new(&ctx, workspaces.clone(), mux.clone());
        if let Some(protocol) = protocol {
            orchestrator = orchestrator.with_protocol(protocol);
        }
        Self {
            registry: SessionRegistry::new(ctx.registry_path()),
            ctx,
            workspaces,
            orchestrator,
            mux,
            parser: TaskSpecParser::new(),
        }
    }

    /// Controller backed by the `git` and `tmux` binaries
    pub fn with_system_tools(ctx: AppContext) -> Self {
        let protocol = ProcessToolClient::from_config(&ctx.config)
            .map(|client| Arc::new(client) as Arc<dyn ToolProtocolClient>);
        Self::new(ctx, Arc::new(GitCli), Arc::new(TmuxMultiplexer::new()), protocol)
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    async fn require(&self, id: &str) -> Result<SessionRecord> {
        self.registry
            .get(id)
            .await?
            .ok_or_else(|| OrchestratorError::validation(format!("session '{}' not found", id)))
    }

    async fn ensure_unregistered(&self, id: &str) -> Result<()> {
        if self.registry.get(id).await?.is_some() {
            return Err(OrchestratorError::validation(format!(
                "session '{}' already exists",
                id
            )));
        }
        Ok(())
    }

    /// Workspace plus one multiplexer session, registered under `id`
    pub async fn create(&self, id: &str, opts: CreateOptions) -> Result<SessionRecord> {
        self.ensure_unregistered(id).await?;
        let name = SessionName::batch(self.orchestrator.prefix(), id)?.encode();

        let workspace = self.workspaces.create(id, opts.branch.as_deref()).await?;

        if let Err(e) = self.mux.new_session(&name, &workspace.path).await {
            warn!(id, session = %name, error = %e, "session creation failed, removing workspace");
            let followups: Vec<_> = self
                .workspaces
                .remove(id)
                .await
                .err()
                .into_iter()
                .collect();
            return Err(OrchestratorError::session(&name, e).with_followups(followups));
        }

        let mut record = SessionRecord::new(id, &workspace.branch_name, workspace.path.clone());
        record.agents = opts.agents;

        if let Err(e) = self.registry.save(&record).await {
            let followups: Vec<_> = self
                .orchestrator
                .cleanup(id)
                .await
                .err()
                .into_iter()
                .collect();
            return Err(e.with_followups(followups));
        }

        info!(id, session = %name, branch = %record.branch, "session created");
        Ok(record)
    }

    pub async fn create_batch(
        &self,
        task_doc: &Path,
        opts: BatchOptions,
    ) -> Result<OrchestrationResult> {
        self.create_batch_until(task_doc, opts, shutdown_signal()).await
    }

    /// `create_batch` that tears the batch down when `shutdown` resolves first
    pub async fn create_batch_until<F>(
        &self,
        task_doc: &Path,
        opts: BatchOptions,
        shutdown: F,
    ) -> Result<OrchestrationResult>
    where
        F: Future<Output = i32>,
    {
        let (tasks, metadata) = self.parser.parse(task_doc).await?;
        if tasks.is_empty() {
            return Err(OrchestratorError::validation(format!(
                "no executable tasks in {}",
                task_doc.display()
            )));
        }

        let batch_id = resolve_batch_id(opts.batch_id.as_deref(), &metadata)?;
        self.ensure_unregistered(&batch_id).await?;
        if !opts.dry_run && !self.mux.is_available().await {
            warn!(multiplexer = self.mux.id(), "multiplexer not available, sessions will fail");
        }

        // The orchestration is never dropped mid-command: after a signal it is
        // polled until the dispatched step finishes, then the batch is removed.
        let cancel = CancellationToken::new();
        let orchestration = self.orchestrator.orchestrate(
            &tasks,
            &metadata,
            Some(batch_id.as_str()),
            opts.dry_run,
            &cancel,
        );
        tokio::pin!(orchestration);
        tokio::pin!(shutdown);

        let (outcome, interrupted) = tokio::select! {
            outcome = &mut orchestration => (outcome, None),
            signal = &mut shutdown => {
                warn!(batch = %batch_id, signal, "interrupted, finishing the step in flight");
                cancel.cancel();
                (orchestration.await, Some(signal))
            }
        };

        if let Some(signal) = interrupted {
            if !opts.dry_run {
                info!(batch = %batch_id, "cleaning up interrupted batch");
                if let Err(e) = self.orchestrator.cleanup(&batch_id).await {
                    error!(batch = %batch_id, error = %e, "cleanup after interrupt failed");
                }
            }
            return Err(OrchestratorError::Interrupted(signal));
        }
        let result = outcome?;

        if opts.dry_run {
            return Ok(result);
        }

        let record = self.batch_record(&result, &metadata);
        if let Err(e) = self.registry.save(&record).await {
            let followups: Vec<_> = self
                .orchestrator
                .cleanup(&batch_id)
                .await
                .err()
                .into_iter()
                .collect();
            return Err(e.with_followups(followups));
        }

        info!(batch = %batch_id, status = %record.status, "batch registered");
        Ok(result)
    }

    fn batch_record(
        &self,
        result: &OrchestrationResult,
        metadata: &TaskDocMetadata,
    ) -> SessionRecord {
        let mut record = SessionRecord::new(
            &result.batch_id,
            &result.workspace.branch_name,
            result.workspace.path.clone(),
        );

        let (running, failed): (Vec<_>, Vec<_>) = result
            .sessions
            .iter()
            .partition(|s| s.status == SessionStatus::Running);
        record.tasks = running.iter().map(|s| s.task.session_name.clone()).collect();
        record.status = if running.is_empty() {
            RecordStatus::Failed
        } else {
            RecordStatus::Active
        };
        record.agents = self.orchestrator.launcher().agent_name().into_iter().collect();

        record.metadata.insert(
            "source".to_string(),
            metadata.source.display().to_string().into(),
        );
        if let Some(title) = &metadata.title {
            record.metadata.insert("title".to_string(), title.clone().into());
        }
        if !failed.is_empty() {
            let names: Vec<serde_json::Value> = failed
                .iter()
                .map(|s| s.task.session_name.clone().into())
                .collect();
            record.metadata.insert("failedTasks".to_string(), names.into());
        }
        record
    }

    fn attach_target(&self, record: &SessionRecord, task: Option<&str>) -> Result<String> {
        let prefix = self.orchestrator.prefix();
        let name = match (task, record.tasks.first()) {
            (Some(task), _) => {
                if !record.tasks.iter().any(|t| t == task) {
                    return Err(OrchestratorError::validation(format!(
                        "session '{}' has no task '{}'",
                        record.id, task
                    )));
                }
                SessionName::task(prefix, &record.id, task)?
            }
            (None, Some(first)) => SessionName::task(prefix, &record.id, first)?,
            (None, None) => SessionName::batch(prefix, &record.id)?,
        };
        Ok(name.encode())
    }

    /// Mark the record active and hand the terminal to its session. A session
    /// that no longer exists is recreated in the workspace.
    pub async fn attach(&self, id: &str, task: Option<&str>) -> Result<SessionRecord> {
        let mut record = self.require(id).await?;
        let target = self.attach_target(&record, task)?;

        match self.mux.has_session(&target).await {
            Ok(true) => {}
            Ok(false) => {
                if tokio::fs::metadata(&record.worktree_path).await.is_err() {
                    return Err(OrchestratorError::resource(
                        id,
                        &record.worktree_path,
                        "workspace is missing",
                    ));
                }
                self.mux
                    .new_session(&target, &record.worktree_path)
                    .await
                    .map_err(|e| OrchestratorError::session(&target, e))?;
                info!(id, session = %target, "session recreated");
            }
            Err(e) => return Err(OrchestratorError::session(&target, e)),
        }

        record.status = RecordStatus::Active;
        record.touch();
        self.registry.save(&record).await?;

        if self.ctx.interactive {
            self.mux
                .attach(&target)
                .await
                .map_err(|e| OrchestratorError::session(&target, e))?;
        }
        Ok(record)
    }

    pub async fn stop(&self, id: &str) -> Result<SessionRecord> {
        let mut record = self.require(id).await?;
        let mut errors = Vec::new();

        if let Err(e) = self.orchestrator.stop_all(id).await {
            errors.push(e);
        }

        record.status = RecordStatus::Stopped;
        record.touch();
        if let Err(e) = self.registry.save(&record).await {
            errors.push(e);
        }

        OrchestratorError::from_steps(errors)?;
        info!(id, "session stopped");
        Ok(record)
    }

    /// Stop sessions, remove the workspace and drop the registry entry. All
    /// steps run; failures are reported together.
    pub async fn delete(&self, id: &str, opts: DeleteOptions) -> Result<()> {
        let record = self.require(id).await?;
        if record.worktree_path != self.workspaces.path_for(id) {
            warn!(
                id,
                recorded = %record.worktree_path.display(),
                managed = %self.workspaces.path_for(id).display(),
                "recorded worktree is outside the managed root"
            );
        }

        let mut errors = Vec::new();
        if !opts.keep_session {
            if let Err(e) = self.orchestrator.stop_all(id).await {
                errors.push(e);
            }
        }
        if !opts.keep_workspace {
            if let Err(e) = self.workspaces.remove(id).await {
                errors.push(e);
            }
        }
        if let Err(e) = self.registry.remove(id).await {
            errors.push(e);
        }

        OrchestratorError::from_steps(errors)?;
        info!(id, "session deleted");
        Ok(())
    }

    /// Registry contents; active records without a live session show as
    /// stopped. When the multiplexer cannot be queried the stored statuses are
    /// returned unchanged.
    pub async fn list(&self) -> Result<Vec<SessionRecord>> {
        let mut records = self.registry.get_all().await?;
        let live: HashSet<String> = match self.orchestrator.list_active().await {
            Ok(names) => names.iter().map(|name| name.batch_id().to_string()).collect(),
            Err(e) => {
                warn!(error = %e, "cannot list live sessions, showing stored status");
                return Ok(records);
            }
        };

        for record in records.iter_mut() {
            if record.is_active() && !live.contains(&record.id) {
                record.status = RecordStatus::Stopped;
            }
        }
        Ok(records)
    }

    /// Delete every record; refuses while any is active unless `force`
    pub async fn delete_all(&self, force: bool) -> Result<usize> {
        let records = self.list().await?;
        let active: Vec<&str> = records
            .iter()
            .filter(|r| r.is_active())
            .map(|r| r.id.as_str())
            .collect();
        if !force && !active.is_empty() {
            return Err(OrchestratorError::validation(format!(
                "{} session(s) still active ({}); pass --force to delete them",
                active.len(),
                active.join(", ")
            )));
        }

        let mut deleted = 0;
        let mut errors = Vec::new();
        for record in &records {
            match self.delete(&record.id, DeleteOptions::default()).await {
                Ok(()) => deleted += 1,
                Err(e) => errors.push(e),
            }
        }
        OrchestratorError::from_steps(errors)?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::testing::{FakeMux, FakeVcs};
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    const PROJ1: &str = "\
# Sprint
Batch: proj1

- [ ] Fix bug
- [ ] Add feature
- [ ] Write docs
- [x] Already done
";

    struct Harness {
        dir: TempDir,
        vcs: Arc<FakeVcs>,
        mux: Arc<FakeMux>,
        controller: LifecycleController,
    }

    impl Harness {
        fn new() -> Self {
            Self::build(false)
        }

        fn interactive() -> Self {
            Self::build(true)
        }

        fn build(interactive: bool) -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::create_dir_all(dir.path().join(".git")).unwrap();
            let mut config = Config::default();
            config.registry.path = Some(dir.path().join("state").join("sessions.json"));
            let mut ctx = AppContext::new(config, dir.path().to_path_buf());
            ctx.interactive = interactive;

            let vcs = Arc::new(FakeVcs::new());
            let mux = Arc::new(FakeMux::new());
            let controller = LifecycleController::new(ctx, vcs.clone(), mux.clone(), None);
            Self {
                dir,
                vcs,
                mux,
                controller,
            }
        }

        fn write_doc(&self, content: &str) -> PathBuf {
            let path = self.dir.path().join("tasks.md");
            std::fs::write(&path, content).unwrap();
            path
        }

        fn workspace(&self, id: &str) -> PathBuf {
            self.dir.path().join(".worktrees").join(id)
        }

        async fn registered(&self) -> Vec<String> {
            self.controller
                .registry
                .get_all()
                .await
                .unwrap()
                .into_iter()
                .map(|r| r.id)
                .collect()
        }
    }

    #[tokio::test]
    async fn test_create_registers_session() {
        let h = Harness::new();
        let record = h
            .controller
            .create(
                "PROJ-1",
                CreateOptions {
                    agents: vec!["claude".to_string()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(record.branch, "feature/PROJ-1");
        assert_eq!(record.status, RecordStatus::Active);
        assert_eq!(record.worktree_path, h.workspace("PROJ-1"));
        assert_eq!(h.mux.sessions(), vec!["bmx_PROJ-1".to_string()]);
        assert_eq!(h.registered().await, vec!["PROJ-1".to_string()]);

        let err = h.controller.create("PROJ-1", CreateOptions::default()).await.unwrap_err();
        assert!(err.is_user_error());
    }

    #[tokio::test]
    async fn test_create_with_explicit_branch() {
        let h = Harness::new();
        let record = h
            .controller
            .create(
                "spike",
                CreateOptions {
                    branch: Some("experiments/spike".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(record.branch, "experiments/spike");
        assert_eq!(h.vcs.created_branches(), vec!["experiments/spike".to_string()]);
    }

    #[tokio::test]
    async fn test_create_compensates_session_failure() {
        let h = Harness::new();
        h.mux.fail_new_session("bmx_proj1");

        let err = h.controller.create("proj1", CreateOptions::default()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Session { .. }));
        assert!(!h.workspace("proj1").exists());
        assert!(h.registered().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_batch_registers_record() {
        let h = Harness::new();
        let doc = h.write_doc(PROJ1);

        let result = h.controller.create_batch(&doc, BatchOptions::default()).await.unwrap();
        assert_eq!(result.batch_id, "proj1");
        assert_eq!(result.summary.total, 3);
        assert_eq!(result.summary.success, 3);

        let record = h.controller.registry.get("proj1").await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Active);
        assert_eq!(record.tasks, vec!["fix-bug", "add-feature", "write-docs"]);
        assert_eq!(record.metadata["title"], "Sprint");

        let err = h.controller.create_batch(&doc, BatchOptions::default()).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_create_batch_records_partial_failure() {
        let h = Harness::new();
        h.mux.fail_new_session("bmx_proj1_add-feature");
        let doc = h.write_doc(PROJ1);

        let result = h.controller.create_batch(&doc, BatchOptions::default()).await.unwrap();
        assert_eq!(result.summary.failed, 1);

        let record = h.controller.registry.get("proj1").await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Active);
        assert_eq!(record.tasks, vec!["fix-bug", "write-docs"]);
        assert_eq!(record.metadata["failedTasks"][0], "add-feature");
    }

    #[tokio::test]
    async fn test_create_batch_all_failed_is_recorded_failed() {
        let h = Harness::new();
        h.mux.make_unavailable();
        let doc = h.write_doc(PROJ1);

        let result = h.controller.create_batch(&doc, BatchOptions::default()).await.unwrap();
        assert!(result.all_failed());
        let record = h.controller.registry.get("proj1").await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Failed);
    }

    #[tokio::test]
    async fn test_create_batch_validation() {
        let h = Harness::new();
        let missing = h.dir.path().join("missing.md");
        let err = h.controller.create_batch(&missing, BatchOptions::default()).await.unwrap_err();
        assert!(err.is_user_error());

        let doc = h.write_doc("# Done\n- [x] Shipped\n## Blocked\n- [ ] Waiting on infra\n");
        let err = h.controller.create_batch(&doc, BatchOptions::default()).await.unwrap_err();
        assert!(err.to_string().contains("no executable tasks"));
        assert!(h.registered().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_batch_dry_run_registers_nothing() {
        let h = Harness::new();
        let doc = h.write_doc(PROJ1);
        let opts = BatchOptions {
            batch_id: Some("preview".to_string()),
            dry_run: true,
        };

        let result = h.controller.create_batch(&doc, opts).await.unwrap();
        assert_eq!(result.batch_id, "preview");
        assert_eq!(result.summary.skipped, 3);
        assert!(h.registered().await.is_empty());
        assert!(!h.workspace("preview").exists());
    }

    #[tokio::test]
    async fn test_interrupt_cleans_up_batch() {
        let h = Harness::new();
        // tmux is still creating this session when the signal arrives
        h.mux.delay_on("bmx_proj1_add-feature", Duration::from_millis(100));
        let doc = h.write_doc(PROJ1);

        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            libc::SIGINT
        };
        let err = h
            .controller
            .create_batch_until(&doc, BatchOptions::default(), shutdown)
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::Interrupted(sig) if sig == libc::SIGINT));
        assert!(h.mux.sessions().is_empty());
        assert!(!h.workspace("proj1").exists());
        assert!(h.registered().await.is_empty());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(h.mux.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_attach_recreates_missing_session() {
        let h = Harness::new();
        h.controller.create("proj1", CreateOptions::default()).await.unwrap();
        h.controller.stop("proj1").await.unwrap();
        assert!(h.mux.sessions().is_empty());

        let record = h.controller.attach("proj1", None).await.unwrap();
        assert_eq!(record.status, RecordStatus::Active);
        assert_eq!(h.mux.sessions(), vec!["bmx_proj1".to_string()]);
        // not interactive, so the terminal is left alone
        assert!(h.mux.attached().is_empty());
    }

    #[tokio::test]
    async fn test_attach_batch_task() {
        let h = Harness::interactive();
        let doc = h.write_doc(PROJ1);
        h.controller.create_batch(&doc, BatchOptions::default()).await.unwrap();

        h.controller.attach("proj1", Some("write-docs")).await.unwrap();
        h.controller.attach("proj1", None).await.unwrap();
        assert_eq!(
            h.mux.attached(),
            vec!["bmx_proj1_write-docs".to_string(), "bmx_proj1_fix-bug".to_string()]
        );

        let err = h.controller.attach("proj1", Some("nope")).await.unwrap_err();
        assert!(err.is_user_error());
        let err = h.controller.attach("unknown", None).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_stop_marks_stopped() {
        let h = Harness::new();
        h.controller.create("proj1", CreateOptions::default()).await.unwrap();

        let record = h.controller.stop("proj1").await.unwrap();
        assert_eq!(record.status, RecordStatus::Stopped);
        assert!(h.mux.sessions().is_empty());

        // already gone is fine
        h.controller.stop("proj1").await.unwrap();
        let stored = h.controller.registry.get("proj1").await.unwrap().unwrap();
        assert_eq!(stored.status, RecordStatus::Stopped);
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let h = Harness::new();
        h.controller.create("proj1", CreateOptions::default()).await.unwrap();

        h.controller.delete("proj1", DeleteOptions::default()).await.unwrap();
        assert!(!h.workspace("proj1").exists());
        assert!(h.mux.sessions().is_empty());
        assert!(h.registered().await.is_empty());

        let err = h
            .controller
            .delete("proj1", DeleteOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_user_error());
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_delete_keep_flags() {
        let h = Harness::new();
        h.controller.create("proj1", CreateOptions::default()).await.unwrap();

        let opts = DeleteOptions {
            keep_workspace: true,
            keep_session: true,
        };
        h.controller.delete("proj1", opts).await.unwrap();
        assert!(h.workspace("proj1").is_dir());
        assert_eq!(h.mux.sessions(), vec!["bmx_proj1".to_string()]);
        assert!(h.registered().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_attempts_every_step() {
        let h = Harness::new();
        h.controller.create("proj1", CreateOptions::default()).await.unwrap();

        h.mux.fail_kills();
        let workspace = h.workspace("proj1");
        std::fs::remove_dir_all(&workspace).unwrap();
        std::fs::write(&workspace, "not a directory").unwrap();
        h.vcs.fail_remove();

        let err = h
            .controller
            .delete("proj1", DeleteOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.steps().len(), 2);
        assert!(!err.is_user_error());
        assert!(h.registered().await.is_empty());
    }

    #[tokio::test]
    async fn test_list_reports_dead_sessions_as_stopped() {
        let h = Harness::new();
        h.controller.create("alive", CreateOptions::default()).await.unwrap();
        h.controller.create("dead", CreateOptions::default()).await.unwrap();
        h.mux.kill_session("bmx_dead").await.unwrap();

        let records = h.controller.list().await.unwrap();
        let status = |id: &str| records.iter().find(|r| r.id == id).unwrap().status;
        assert_eq!(status("alive"), RecordStatus::Active);
        assert_eq!(status("dead"), RecordStatus::Stopped);

        let stored = h.controller.registry.get("dead").await.unwrap().unwrap();
        assert_eq!(stored.status, RecordStatus::Active);
    }

    #[tokio::test]
    async fn test_list_survives_multiplexer_errors() {
        let h = Harness::new();
        h.controller.create("a", CreateOptions::default()).await.unwrap();
        h.controller.create("b", CreateOptions::default()).await.unwrap();
        h.controller.stop("b").await.unwrap();
        h.mux.fail_lists();

        let records = h.controller.list().await.unwrap();
        let status = |id: &str| records.iter().find(|r| r.id == id).unwrap().status;
        assert_eq!(status("a"), RecordStatus::Active);
        assert_eq!(status("b"), RecordStatus::Stopped);

        // the registry entries still go even though stopping sessions fails
        let err = h.controller.delete_all(true).await.unwrap_err();
        assert!(!err.is_user_error());
        assert!(h.registered().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_all_requires_force_when_active() {
        let h = Harness::new();
        h.controller.create("a", CreateOptions::default()).await.unwrap();
        h.controller.create("b", CreateOptions::default()).await.unwrap();
        h.controller.stop("b").await.unwrap();

        let err = h.controller.delete_all(false).await.unwrap_err();
        assert!(err.is_user_error());
        assert!(err.to_string().contains("(a)"));
        assert_eq!(h.registered().await.len(), 2);

        assert_eq!(h.controller.delete_all(true).await.unwrap(), 2);
        assert!(h.registered().await.is_empty());
        assert!(h.mux.sessions().is_empty());
    }
}
