//! Error taxonomy shared by every orchestration component.

use std::path::PathBuf;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Missing or malformed input: task document, unknown or duplicate id.
    #[error("{0}")]
    Validation(String),

    /// Version-control or workspace failure.
    #[error("workspace '{id}' at {}: {message}", .path.display())]
    Resource {
        id: String,
        path: PathBuf,
        message: String,
    },

    /// Terminal multiplexer failure.
    #[error("session '{name}': {message}")]
    Session { name: String, message: String },

    /// Registry file could not be read or written.
    #[error("session registry {}: {message}", .path.display())]
    Registry { path: PathBuf, message: String },

    #[error("tool call '{method}' timed out after {}ms", .after.as_millis())]
    Timeout { method: String, after: Duration },

    #[error("tool call failed: {0}")]
    Protocol(String),

    #[error("interrupted by signal {0}")]
    Interrupted(i32),

    /// Several steps of a multi-step operation failed.
    #[error("{} step(s) failed: {}", .0.len(), join_messages(.0))]
    Aggregate(Vec<OrchestratorError>),
}

fn join_messages(errors: &[OrchestratorError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl OrchestratorError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn resource(id: &str, path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Resource {
            id: id.to_string(),
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn session(name: &str, message: impl std::fmt::Display) -> Self {
        Self::Session {
            name: name.to_string(),
            message: message.to_string(),
        }
    }

    pub fn registry(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Registry {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Collapse collected step errors: none is success, one is returned as-is.
    pub fn from_steps(mut errors: Vec<OrchestratorError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Aggregate(errors)),
        }
    }

    /// Attach errors from compensation steps that ran after `self` failed.
    pub fn with_followups(self, followups: Vec<OrchestratorError>) -> Self {
        if followups.is_empty() {
            return self;
        }
        let mut errors = vec![self];
        errors.extend(followups);
        Self::Aggregate(errors)
    }

    /// True for mistakes the user can fix by changing the input.
    pub fn is_user_error(&self) -> bool {
        match self {
            Self::Validation(_) => true,
            Self::Aggregate(errors) => {
                !errors.is_empty() && errors.iter().all(|e| e.is_user_error())
            }
            _ => false,
        }
    }

    /// Flattened list of step errors (a non-aggregate error yields itself).
    pub fn steps(&self) -> Vec<&OrchestratorError> {
        match self {
            Self::Aggregate(errors) => errors.iter().flat_map(|e| e.steps()).collect(),
            other => vec![other],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_steps() {
        assert!(OrchestratorError::from_steps(Vec::new()).is_ok());

        let single = OrchestratorError::from_steps(vec![OrchestratorError::validation("nope")]);
        assert!(matches!(single, Err(OrchestratorError::Validation(_))));

        let many = OrchestratorError::from_steps(vec![
            OrchestratorError::session("a", "gone"),
            OrchestratorError::resource("b", "/tmp/b", "busy"),
        ])
        .unwrap_err();
        assert_eq!(many.steps().len(), 2);
        assert!(many.to_string().starts_with("2 step(s) failed"));
    }

    #[test]
    fn test_with_followups() {
        let err = OrchestratorError::session("bmx_a", "boom").with_followups(Vec::new());
        assert!(matches!(err, OrchestratorError::Session { .. }));

        let err = OrchestratorError::session("bmx_a", "boom")
            .with_followups(vec![OrchestratorError::resource("a", "/tmp/a", "busy")]);
        assert_eq!(err.steps().len(), 2);
        assert!(matches!(err.steps()[0], OrchestratorError::Session { .. }));
    }

    #[test]
    fn test_user_error_classification() {
        assert!(OrchestratorError::validation("missing").is_user_error());
        assert!(!OrchestratorError::session("x", "boom").is_user_error());
        assert!(!OrchestratorError::Aggregate(vec![
            OrchestratorError::validation("missing"),
            OrchestratorError::registry("/tmp/r.json", "denied"),
        ])
        .is_user_error());
    }

    #[test]
    fn test_resource_display_includes_context() {
        let err =
            OrchestratorError::resource("PROJ-1", "/repo/.worktrees/PROJ-1", "already exists");
        let msg = err.to_string();
        assert!(msg.contains("PROJ-1"));
        assert!(msg.contains("/repo/.worktrees/PROJ-1"));
        assert!(msg.contains("already exists"));
    }
}
