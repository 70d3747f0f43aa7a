use serde::{Serialize, Deserialize};
use serde_json::Value;
use anyhow::{Result, Context as AnyhowContext};
use crate::runtime::context::ContextSnapshot;
use crate::runtime::outcome::{ErrorInfo, Outcome};
use crate::runtime::task::UnitPath;

/// Request sent to an isolated worker. One JSON document per message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerMessage {
    pub task_id: String,
    pub unit: UnitPath,
    pub snapshot: ContextSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub task_id: String,
    pub status: WorkerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerMessage {
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to encode worker message")
    }

    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to decode worker message")
    }
}

impl WorkerResponse {
    pub fn success(task_id: &str, result: Value) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: WorkerStatus::Success,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(task_id: &str, error: impl Into<String>) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: WorkerStatus::Error,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to encode worker response")
    }

    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to decode worker response")
    }

    /// Errors reported by a worker are task-level: the unit failed to load or run.
    pub fn into_outcome(self) -> Outcome {
        match self.status {
            WorkerStatus::Success => Outcome::Success(self.result.unwrap_or(Value::Null)),
            WorkerStatus::Error => Outcome::Failure(ErrorInfo::execution(
                self.error.unwrap_or_else(|| "worker reported an error without detail".to_string()),
            )),
        }
    }
}
