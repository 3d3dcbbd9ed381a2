//! Terminal multiplexer seam.
//!
//! The orchestrator only needs a handful of tmux verbs, so the trait stays
//! small. `NotFound` is a distinct variant because callers treat killing an
//! absent session as success.

mod naming;
mod tmux;

use async_trait::async_trait;
use std::path::Path;

pub use naming::SessionName;
pub use tmux::TmuxMultiplexer;

#[derive(thiserror::Error, Debug)]
pub enum MuxError {
    #[error("multiplexer not available: {0}")]
    NotAvailable(&'static str),
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Implementation identifier (e.g. "tmux")
    fn id(&self) -> &'static str;

    async fn is_available(&self) -> bool;

    /// Start a detached session whose shell runs in `cwd`
    async fn new_session(&self, name: &str, cwd: &Path) -> Result<(), MuxError>;

    /// Kill a session; `NotFound` if it does not exist
    async fn kill_session(&self, name: &str) -> Result<(), MuxError>;

    async fn has_session(&self, name: &str) -> Result<bool, MuxError>;

    /// Names of all live sessions (empty when no server is running)
    async fn list_sessions(&self) -> Result<Vec<String>, MuxError>;

    /// Type `keys` into the session followed by Enter
    async fn send_keys(&self, name: &str, keys: &str) -> Result<(), MuxError>;

    /// Hand the controlling terminal to the session until the user detaches
    async fn attach(&self, name: &str) -> Result<(), MuxError>;
}
