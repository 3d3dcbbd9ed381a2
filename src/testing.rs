//! In-memory collaborators with failure injection for unit tests.

use anyhow::{bail, Result as AnyResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{OrchestratorError, Result};
use crate::git::{Vcs, WorktreeInfo};
use crate::mux::{Multiplexer, MuxError};
use crate::protocol::ToolProtocolClient;

#[derive(Default)]
struct VcsState {
    branches: HashSet<String>,
    created_branches: Vec<String>,
    worktrees: Vec<WorktreeInfo>,
    fail_add: bool,
    fail_remove: bool,
    prunes: usize,
}

/// Worktrees are plain directories; branches are a set of names
#[derive(Default)]
pub struct FakeVcs {
    state: Mutex<VcsState>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_branch(self, branch: &str) -> Self {
        self.state.lock().unwrap().branches.insert(branch.to_string());
        self
    }

    pub fn fail_add(&self) {
        self.state.lock().unwrap().fail_add = true;
    }

    pub fn fail_remove(&self) {
        self.state.lock().unwrap().fail_remove = true;
    }

    pub fn register_worktree(&self, path: PathBuf, branch: &str) {
        std::fs::create_dir_all(&path).unwrap();
        self.state.lock().unwrap().worktrees.push(WorktreeInfo {
            path,
            branch: Some(branch.to_string()),
        });
    }

    pub fn created_branches(&self) -> Vec<String> {
        self.state.lock().unwrap().created_branches.clone()
    }

    pub fn prune_count(&self) -> usize {
        self.state.lock().unwrap().prunes
    }
}

#[async_trait]
impl Vcs for FakeVcs {
    async fn branch_exists(&self, _repo: &Path, branch: &str) -> AnyResult<bool> {
        Ok(self.state.lock().unwrap().branches.contains(branch))
    }

    async fn add_worktree(
        &self,
        _repo: &Path,
        path: &Path,
        branch: &str,
        create_branch: bool,
    ) -> AnyResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_add {
            bail!("fatal: injected worktree add failure");
        }
        if create_branch {
            if !state.branches.insert(branch.to_string()) {
                bail!("fatal: a branch named '{}' already exists", branch);
            }
            state.created_branches.push(branch.to_string());
        } else if !state.branches.contains(branch) {
            bail!("fatal: invalid reference: {}", branch);
        }
        std::fs::create_dir_all(path)?;
        state.worktrees.push(WorktreeInfo {
            path: path.to_path_buf(),
            branch: Some(branch.to_string()),
        });
        Ok(())
    }

    async fn remove_worktree(&self, _repo: &Path, path: &Path) -> AnyResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_remove {
            bail!("fatal: injected worktree remove failure");
        }
        let before = state.worktrees.len();
        state.worktrees.retain(|w| w.path != path);
        if state.worktrees.len() == before {
            bail!("fatal: '{}' is not a working tree", path.display());
        }
        std::fs::remove_dir_all(path)?;
        Ok(())
    }

    async fn list_worktrees(&self, _repo: &Path) -> AnyResult<Vec<WorktreeInfo>> {
        Ok(self.state.lock().unwrap().worktrees.clone())
    }

    async fn prune_worktrees(&self, _repo: &Path) -> AnyResult<()> {
        let mut state = self.state.lock().unwrap();
        state.prunes += 1;
        state.worktrees.retain(|w| w.path.exists());
        Ok(())
    }
}

#[derive(Default)]
struct MuxState {
    sessions: BTreeSet<String>,
    fail_new: HashSet<String>,
    delay_on: HashMap<String, Duration>,
    fail_kill: bool,
    fail_list: bool,
    fail_send: bool,
    unavailable: bool,
    sent: Vec<(String, String)>,
    attached: Vec<String>,
}

/// Session set held in memory; names can be made to fail or to complete late
#[derive(Default)]
pub struct FakeMux {
    state: Mutex<MuxState>,
}

impl FakeMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_new_session(&self, name: &str) {
        self.state.lock().unwrap().fail_new.insert(name.to_string());
    }

    /// `new_session(name)` takes `delay` before the session exists
    pub fn delay_on(&self, name: &str, delay: Duration) {
        self.state.lock().unwrap().delay_on.insert(name.to_string(), delay);
    }

    pub fn fail_kills(&self) {
        self.state.lock().unwrap().fail_kill = true;
    }

    pub fn fail_send_keys(&self) {
        self.state.lock().unwrap().fail_send = true;
    }

    /// `list_sessions` fails with a command error
    pub fn fail_lists(&self) {
        self.state.lock().unwrap().fail_list = true;
    }

    pub fn make_unavailable(&self) {
        self.state.lock().unwrap().unavailable = true;
    }

    pub fn insert_session(&self, name: &str) {
        self.state.lock().unwrap().sessions.insert(name.to_string());
    }

    pub fn sessions(&self) -> Vec<String> {
        self.state.lock().unwrap().sessions.iter().cloned().collect()
    }

    pub fn sent_keys(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn attached(&self) -> Vec<String> {
        self.state.lock().unwrap().attached.clone()
    }
}

#[async_trait]
impl Multiplexer for FakeMux {
    fn id(&self) -> &'static str {
        "fake"
    }

    async fn is_available(&self) -> bool {
        !self.state.lock().unwrap().unavailable
    }

    async fn new_session(&self, name: &str, _cwd: &Path) -> std::result::Result<(), MuxError> {
        let delay = self.state.lock().unwrap().delay_on.get(name).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(MuxError::NotAvailable("tmux"));
        }
        if state.fail_new.contains(name) {
            return Err(MuxError::CommandFailed(format!("injected failure for {}", name)));
        }
        if !state.sessions.insert(name.to_string()) {
            return Err(MuxError::CommandFailed(format!("duplicate session: {}", name)));
        }
        Ok(())
    }

    async fn kill_session(&self, name: &str) -> std::result::Result<(), MuxError> {
        let mut state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(MuxError::NotAvailable("tmux"));
        }
        if state.fail_kill {
            return Err(MuxError::CommandFailed(format!("injected kill failure for {}", name)));
        }
        if state.sessions.remove(name) {
            Ok(())
        } else {
            Err(MuxError::NotFound(name.to_string()))
        }
    }

    async fn has_session(&self, name: &str) -> std::result::Result<bool, MuxError> {
        let state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(MuxError::NotAvailable("tmux"));
        }
        Ok(state.sessions.contains(name))
    }

    async fn list_sessions(&self) -> std::result::Result<Vec<String>, MuxError> {
        let state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(MuxError::NotAvailable("tmux"));
        }
        if state.fail_list {
            return Err(MuxError::CommandFailed("injected list failure".to_string()));
        }
        Ok(state.sessions.iter().cloned().collect())
    }

    async fn send_keys(&self, name: &str, keys: &str) -> std::result::Result<(), MuxError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_send {
            return Err(MuxError::CommandFailed("injected send-keys failure".to_string()));
        }
        if !state.sessions.contains(name) {
            return Err(MuxError::NotFound(name.to_string()));
        }
        state.sent.push((name.to_string(), keys.to_string()));
        Ok(())
    }

    async fn attach(&self, name: &str) -> std::result::Result<(), MuxError> {
        let mut state = self.state.lock().unwrap();
        if !state.sessions.contains(name) {
            return Err(MuxError::NotFound(name.to_string()));
        }
        state.attached.push(name.to_string());
        Ok(())
    }
}

/// Records every call; optionally answers with a protocol error
#[derive(Default)]
pub struct FakeProtocol {
    calls: Mutex<Vec<(String, Value)>>,
    fail: bool,
}

impl FakeProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolProtocolClient for FakeProtocol {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.calls.lock().unwrap().push((method.to_string(), params));
        if self.fail {
            return Err(OrchestratorError::Protocol("injected failure".to_string()));
        }
        Ok(Value::Null)
    }
}
