//! Client for an external tool-protocol service.
//!
//! The service is a command that reads one JSON-RPC style request on stdin
//! and answers with one response on stdout. It is spawned once per call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::Config;
use crate::error::{OrchestratorError, Result};

#[async_trait]
pub trait ToolProtocolClient: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> Result<Value>;
}

#[derive(Debug, Serialize)]
struct ToolRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct ToolResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ToolErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ToolErrorBody {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

#[derive(Debug, Clone)]
pub struct ProcessToolClient {
    command: String,
    timeout: Duration,
}

impl ProcessToolClient {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    /// Client for the configured service, if any
    pub fn from_config(config: &Config) -> Option<Self> {
        config
            .protocol
            .command
            .as_ref()
            .filter(|c| !c.trim().is_empty())
            .map(|c| Self::new(c.clone(), config.protocol.timeout()))
    }

    async fn exchange(&self, request: Vec<u8>) -> Result<Vec<u8>> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                OrchestratorError::Protocol(format!("failed to spawn '{}': {}", self.command, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A service that answers without reading its input closes the pipe early
            match stdin.write_all(&request).await {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                    return Err(OrchestratorError::Protocol(format!(
                        "failed to write request: {}",
                        e
                    )));
                }
                _ => {}
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| OrchestratorError::Protocol(e.to_string()))?;

        if !output.status.success() {
            return Err(OrchestratorError::Protocol(format!(
                "'{}' exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }
}

fn decode_response(stdout: &[u8]) -> Result<Value> {
    let response: ToolResponse = serde_json::from_slice(stdout)
        .map_err(|e| OrchestratorError::Protocol(format!("invalid response: {}", e)))?;

    match (response.result, response.error) {
        (_, Some(error)) => Err(OrchestratorError::Protocol(match error.code {
            Some(code) => format!("{} (code {})", error.message, code),
            None => error.message,
        })),
        (Some(result), None) => Ok(result),
        (None, None) => Ok(Value::Null),
    }
}

#[async_trait]
impl ToolProtocolClient for ProcessToolClient {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = serde_json::to_vec(&ToolRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        })
        .map_err(|e| OrchestratorError::Protocol(e.to_string()))?;

        debug!(method, command = %self.command, "tool call");
        let stdout = tokio::time::timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| OrchestratorError::Timeout {
                method: method.to_string(),
                after: self.timeout,
            })??;

        decode_response(&stdout)
    }
}
