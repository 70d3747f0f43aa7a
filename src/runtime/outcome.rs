use std::fmt;
use serde::{Serialize, Deserialize};
use serde_json::Value;
use crate::error::FlowError;

/// Where a task failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The unit ran (or could not be loaded) and reported an error.
    Execution,
    /// The worker thread/process failed to start, crashed, or its channel closed.
    Transport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: FailureKind,
    pub message: String,
}

impl ErrorInfo {
    pub fn execution(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Execution, message: message.into() }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Transport, message: message.into() }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::Execution => write!(f, "execution error: {}", self.message),
            FailureKind::Transport => write!(f, "transport error: {}", self.message),
        }
    }
}

/// The tagged result of running one task.
///
/// Serialized as `{"status": "success", "payload": <value>}` or
/// `{"status": "failure", "payload": {"kind": .., "message": ..}}`, so a failure
/// marker can never be mistaken for a task value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "payload", rename_all = "snake_case")]
pub enum Outcome {
    Success(Value),
    Failure(ErrorInfo),
}

impl Outcome {
    pub fn success(value: impl Into<Value>) -> Self {
        Outcome::Success(value.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Outcome::Success(v) => Some(v),
            Outcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(e) => Some(e),
        }
    }
}

impl From<FlowError> for Outcome {
    fn from(err: FlowError) -> Self {
        match err {
            FlowError::TaskExecution { message, .. } => Outcome::Failure(ErrorInfo::execution(message)),
            FlowError::IsolationTransport { message, .. } => Outcome::Failure(ErrorInfo::transport(message)),
            FlowError::TaskFailed { error, .. } => Outcome::Failure(error),
            other => Outcome::Failure(ErrorInfo::execution(other.to_string())),
        }
    }
}
