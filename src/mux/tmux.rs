//! tmux multiplexer implementation
//!
//! Implements the Multiplexer trait for tmux using its command-line interface.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::{Multiplexer, MuxError};

/// stderr fragments tmux prints when the target session or server is absent
const MISSING_MARKERS: &[&str] = &[
    "can't find session",
    "session not found",
    "no server running",
    "error connecting to",
    "no current client",
];

fn is_missing(stderr: &str) -> bool {
    MISSING_MARKERS.iter().any(|m| stderr.contains(m))
}

/// Exact-match target for session-scoped commands
fn session_target(name: &str) -> String {
    format!("={}", name)
}

/// Exact-match target for pane-scoped commands (active pane of the session)
fn pane_target(name: &str) -> String {
    format!("={}:", name)
}

#[derive(Debug, Clone)]
pub struct TmuxMultiplexer {
    binary: String,
}

impl Default for TmuxMultiplexer {
    fn default() -> Self {
        Self {
            binary: "tmux".to_string(),
        }
    }
}

impl TmuxMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a tmux command and return its trimmed stdout
    async fn run_tmux_command(&self, args: &[&str]) -> Result<String, MuxError> {
        debug!("{} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MuxError::NotAvailable("tmux")
                } else {
                    MuxError::Io(e)
                }
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing(&stderr) {
                let target = args
                    .iter()
                    .position(|a| *a == "-t")
                    .and_then(|i| args.get(i + 1))
                    .map(|t| t.trim_start_matches('=').trim_end_matches(':').to_string())
                    .unwrap_or_default();
                return Err(MuxError::NotFound(target));
            }
            Err(MuxError::CommandFailed(format!(
                "tmux {} failed: {}",
                args.join(" "),
                stderr.trim()
            )))
        }
    }
}

#[async_trait]
impl Multiplexer for TmuxMultiplexer {
    fn id(&self) -> &'static str {
        "tmux"
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-V")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn new_session(&self, name: &str, cwd: &Path) -> Result<(), MuxError> {
        let cwd = cwd.to_string_lossy();
        self.run_tmux_command(&["new-session", "-d", "-s", name, "-c", &cwd])
            .await?;
        Ok(())
    }

    async fn kill_session(&self, name: &str) -> Result<(), MuxError> {
        self.run_tmux_command(&["kill-session", "-t", &session_target(name)])
            .await?;
        Ok(())
    }

    async fn has_session(&self, name: &str) -> Result<bool, MuxError> {
        match self
            .run_tmux_command(&["has-session", "-t", &session_target(name)])
            .await
        {
            Ok(_) => Ok(true),
            Err(MuxError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<String>, MuxError> {
        match self
            .run_tmux_command(&["list-sessions", "-F", "#{session_name}"])
            .await
        {
            Ok(stdout) => Ok(stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect()),
            // No server means no sessions
            Err(MuxError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn send_keys(&self, name: &str, keys: &str) -> Result<(), MuxError> {
        let target = pane_target(name);
        self.run_tmux_command(&["send-keys", "-t", &target, "-l", keys])
            .await?;
        self.run_tmux_command(&["send-keys", "-t", &target, "Enter"])
            .await?;
        Ok(())
    }

    async fn attach(&self, name: &str) -> Result<(), MuxError> {
        // Inside tmux, attaching would nest clients; switch instead
        let verb = if std::env::var_os("TMUX").is_some() {
            "switch-client"
        } else {
            "attach-session"
        };
        let target = session_target(name);
        let status = Command::new(&self.binary)
            .args([verb, "-t", target.as_str()])
            .status()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MuxError::NotAvailable("tmux")
                } else {
                    MuxError::Io(e)
                }
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(MuxError::CommandFailed(format!(
                "tmux {} exited with {}",
                verb, status
            )))
        }
    }
}
