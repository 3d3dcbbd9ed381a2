//! Reversible multiplexer session names.
//!
//! Names are `<prefix>_<batch id>` or `<prefix>_<batch id>_<task>`. Every
//! component is checked to be free of the separator, so decoding is a plain
//! split with no guessing.

use crate::error::{OrchestratorError, Result};
use std::fmt;

pub const SEPARATOR: char = '_';

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionName {
    prefix: String,
    batch_id: String,
    task: Option<String>,
}

fn check_component(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(OrchestratorError::validation(format!("{} must not be empty", kind)));
    }
    if value.contains(SEPARATOR)
        || value.contains(char::is_whitespace)
        || value.contains(['.', ':'])
    {
        return Err(OrchestratorError::validation(format!(
            "{} '{}' may not contain '{}', '.', ':' or whitespace",
            kind, value, SEPARATOR
        )));
    }
    Ok(())
}

impl SessionName {
    /// Name of the single session owned by a batch or standalone session id
    pub fn batch(prefix: &str, batch_id: &str) -> Result<Self> {
        check_component("session prefix", prefix)?;
        check_component("batch id", batch_id)?;
        Ok(Self {
            prefix: prefix.to_string(),
            batch_id: batch_id.to_string(),
            task: None,
        })
    }

    /// Name of one task's session inside a batch
    pub fn task(prefix: &str, batch_id: &str, task: &str) -> Result<Self> {
        check_component("task session name", task)?;
        let mut name = Self::batch(prefix, batch_id)?;
        name.task = Some(task.to_string());
        Ok(name)
    }

    /// Inverse of `encode`. Returns `None` for names this tool did not create.
    pub fn decode(name: &str) -> Option<Self> {
        let parts: Vec<&str> = name.split(SEPARATOR).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        match parts.as_slice() {
            [prefix, batch_id] => Some(Self {
                prefix: prefix.to_string(),
                batch_id: batch_id.to_string(),
                task: None,
            }),
            [prefix, batch_id, task] => Some(Self {
                prefix: prefix.to_string(),
                batch_id: batch_id.to_string(),
                task: Some(task.to_string()),
            }),
            _ => None,
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Prefix shared by every session this tool creates with `prefix`
    pub fn scan_prefix(prefix: &str) -> String {
        format!("{}{}", prefix, SEPARATOR)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn task_name(&self) -> Option<&str> {
        self.task.as_deref()
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.prefix, SEPARATOR, self.batch_id)?;
        if let Some(task) = &self.task {
            write!(f, "{}{}", SEPARATOR, task)?;
        }
        Ok(())
    }
}
