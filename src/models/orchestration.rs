use super::session::{Session, SessionStatus};
use super::workspace::WorkspaceInfo;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Outcome of one batch: the workspace plus one session per executable task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub batch_id: String,
    pub workspace: WorkspaceInfo,
    pub sessions: Vec<Session>,
    pub summary: Summary,
}

impl OrchestrationResult {
    pub fn new(batch_id: String, workspace: WorkspaceInfo) -> Self {
        Self {
            batch_id,
            workspace,
            sessions: Vec::new(),
            summary: Summary::default(),
        }
    }

    /// Append a session and account for it in the summary
    pub fn push(&mut self, session: Session) {
        self.summary.total += 1;
        match session.status {
            SessionStatus::Running => self.summary.success += 1,
            SessionStatus::Failed => {
                self.summary.failed += 1;
                let reason = session.error.as_deref().unwrap_or("unknown error");
                self.summary
                    .errors
                    .push(format!("{}: {}", session.task.name, reason));
            }
            SessionStatus::Created | SessionStatus::Stopped => self.summary.skipped += 1,
        }
        self.sessions.push(session);
    }

    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }

    pub fn all_failed(&self) -> bool {
        self.summary.total > 0 && self.summary.failed == self.summary.total
    }
}
