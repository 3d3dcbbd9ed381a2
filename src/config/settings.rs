use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration embedded at compile time
const DEFAULT_CONFIG: &str = include_str!("defaults.toml");

const APP_DIR: &str = "batchmux";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    pub mux: MuxConfig,
    pub agent: AgentConfig,
    pub registry: RegistryConfig,
    pub protocol: ProtocolConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub repo: Option<PathBuf>,
    pub root: PathBuf,
    pub branch_prefix: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            repo: None,
            root: PathBuf::from(crate::git::WORKTREES_DIR),
            branch_prefix: "feature".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    pub prefix: String,
    pub banner: bool,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            prefix: "bmx".to_string(),
            banner: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Launch command template; `{context}` expands to the context file path
    pub command: Option<String>,
    pub context_dir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: None,
            context_dir: PathBuf::from(".batchmux/context"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub command: Option<String>,
    pub timeout_ms: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_ms: 30_000,
        }
    }
}

impl ProtocolConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub file: Option<PathBuf>,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid configuration file")
    }

    /// Load the config file at `path`, or the user config (falling back to defaults)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml_str(&content)
            }
            None => {
                let user_path = user_config_path();
                if user_path.exists() {
                    let content = std::fs::read_to_string(&user_path).with_context(|| {
                        format!("Failed to read config file {}", user_path.display())
                    })?;
                    Self::from_toml_str(&content)
                } else {
                    Self::from_toml_str(DEFAULT_CONFIG)
                }
            }
        }
    }

    /// Repository that owns the worktrees
    pub fn repo_path(&self) -> Result<PathBuf> {
        match &self.workspace.repo {
            Some(repo) => Ok(repo.clone()),
            None => std::env::current_dir().context("Failed to resolve current directory"),
        }
    }

    /// Managed worktree root, resolved against the repository when relative
    pub fn worktree_root(&self, repo: &Path) -> PathBuf {
        if self.workspace.root.is_absolute() {
            self.workspace.root.clone()
        } else {
            repo.join(&self.workspace.root)
        }
    }

    pub fn registry_path(&self) -> PathBuf {
        self.registry
            .path
            .clone()
            .unwrap_or_else(|| app_dir(dirs::config_dir()).join("sessions.json"))
    }

    pub fn log_path(&self) -> PathBuf {
        self.logging
            .file
            .clone()
            .unwrap_or_else(|| app_dir(dirs::data_dir()).join("batchmux.log"))
    }
}

fn app_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
}

/// Get the path to the user's config file
pub fn user_config_path() -> PathBuf {
    app_dir(dirs::config_dir()).join("config.toml")
}
