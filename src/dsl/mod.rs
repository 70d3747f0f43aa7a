pub mod builder;

use std::collections::HashMap;
use anyhow::Context as AnyhowContext;
use std::slice;
use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use crate::config::{EngineConfig, FailurePolicy};
use crate::error::FlowError;
use crate::runtime::task::Isolation;

/// One entry of a flow: a single task, or a group run concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Task(String),
    Group(Vec<String>),
    /// Kept in place so the run aborts when it reaches this position,
    /// with the results of every earlier step intact.
    #[serde(skip)]
    Malformed { raw: Value, reason: String },
}

impl Step {
    pub fn task(id: &str) -> Self {
        Step::Task(id.to_string())
    }

    pub fn group<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Step::Group(ids.into_iter().map(Into::into).collect())
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Step::Group(_))
    }

    /// Identifiers of this step, rejecting empty groups and blank identifiers.
    pub fn task_ids(&self, index: usize) -> Result<&[String], FlowError> {
        let ids = match self {
            Step::Malformed { reason, .. } => return Err(FlowError::malformed(index, reason.clone())),
            Step::Task(id) => slice::from_ref(id),
            Step::Group(ids) if ids.is_empty() => {
                return Err(FlowError::malformed(index, "parallel group is empty"));
            }
            Step::Group(ids) => ids.as_slice(),
        };
        if ids.iter().any(|id| id.trim().is_empty()) {
            return Err(FlowError::malformed(index, "task identifier is blank"));
        }
        Ok(ids)
    }

    /// Parses nested string/array data, e.g. `"a"` or `["b", "c"]`.
    pub fn from_value(index: usize, value: &Value) -> Result<Self, FlowError> {
        match value {
            Value::String(id) => {
                let step = Step::Task(id.clone());
                step.task_ids(index)?;
                Ok(step)
            }
            Value::Array(items) => {
                let ids = items.iter()
                    .map(|item| item.as_str().map(str::to_string).ok_or_else(|| {
                        FlowError::malformed(index, format!("group member {} is not a string", item))
                    }))
                    .collect::<Result<Vec<_>, _>>()?;
                let step = Step::Group(ids);
                step.task_ids(index)?;
                Ok(step)
            }
            other => Err(FlowError::malformed(
                index,
                format!("expected a task identifier or a list of identifiers, got {}", other),
            )),
        }
    }

    /// Like `from_value`, but a bad entry becomes `Step::Malformed` instead of an error.
    pub fn from_value_deferred(index: usize, value: &Value) -> Self {
        Step::from_value(index, value).unwrap_or_else(|err| {
            let reason = match err {
                FlowError::MalformedStep { reason, .. } => reason,
                other => other.to_string(),
            };
            Step::Malformed { raw: value.clone(), reason }
        })
    }
}

impl From<&str> for Step {
    fn from(id: &str) -> Self {
        Step::task(id)
    }
}

/// Ordered sequence of steps defining one execution run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flow {
    steps: Vec<Step>,
}

impl Flow {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn from_value(value: &Value) -> Result<Self, FlowError> {
        let items = value.as_array()
            .ok_or_else(|| FlowError::malformed(0, "a flow must be a list of steps"))?;
        let steps = items.iter()
            .enumerate()
            .map(|(i, v)| Step::from_value(i, v))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// How a flow file binds a task identifier to a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub unit: String,
    #[serde(default)]
    pub isolation: Isolation,
}

/// Flow file as written in YAML. Steps stay raw until compiled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowFile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub policy: Option<FailurePolicy>,
    #[serde(default)]
    pub initial: Map<String, Value>,
    #[serde(default)]
    pub tasks: HashMap<String, TaskSpec>,
    pub steps: Vec<Value>,
    #[serde(default)]
    pub engine: Option<EngineConfig>,
}

impl FlowFile {
    pub fn from_yaml(source: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(source).context("Flow file is not valid YAML for a flow definition")
    }
}
