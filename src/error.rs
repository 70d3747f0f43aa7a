use thiserror::Error;
use crate::runtime::outcome::ErrorInfo;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    #[error("Unresolved task '{task}': {reason}")]
    UnresolvedTask {
        task: String,
        reason: String,
    },

    #[error("Task '{task}' failed: {message}")]
    TaskExecution {
        task: String,
        message: String,
    },

    #[error("Isolation transport error for task '{task}': {message}")]
    IsolationTransport {
        task: String,
        message: String,
    },

    #[error("Malformed step at position {index}: {reason}")]
    MalformedStep {
        index: usize,
        reason: String,
    },

    /// Raised by the fail-fast policy once the failing outcome has been merged.
    #[error("Flow aborted, task '{task}' failed: {error}")]
    TaskFailed {
        task: String,
        error: ErrorInfo,
    },

    #[error("Group merge mismatch: {ids} identifiers but {outcomes} outcomes")]
    GroupMismatch {
        ids: usize,
        outcomes: usize,
    },
}

impl FlowError {
    pub fn unresolved(task: &str, reason: impl Into<String>) -> Self {
        FlowError::UnresolvedTask {
            task: task.to_string(),
            reason: reason.into(),
        }
    }

    pub fn malformed(index: usize, reason: impl Into<String>) -> Self {
        FlowError::MalformedStep {
            index,
            reason: reason.into(),
        }
    }

    /// Configuration defects always abort a run, whatever the failure policy.
    pub fn is_configuration_defect(&self) -> bool {
        matches!(
            self,
            FlowError::UnresolvedTask { .. } | FlowError::MalformedStep { .. } | FlowError::GroupMismatch { .. }
        )
    }
}
