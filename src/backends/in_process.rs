use std::sync::Arc;
use async_trait::async_trait;
use tracing::debug;
use crate::backends::ExecutionBackend;
use crate::error::FlowError;
use crate::runtime::context::ContextSnapshot;
use crate::runtime::outcome::Outcome;
use crate::runtime::resolver::UnitCache;
use crate::runtime::task::{Isolation, TaskReference};

/// Calls the unit directly on the engine's runtime.
pub struct InProcessBackend {
    units: Arc<UnitCache>,
}

impl InProcessBackend {
    pub fn new(units: Arc<UnitCache>) -> Self {
        Self { units }
    }
}

#[async_trait]
impl ExecutionBackend for InProcessBackend {
    fn isolation(&self) -> Isolation {
        Isolation::InProcess
    }

    async fn execute(&self, task_id: &str, reference: &TaskReference, snapshot: Arc<ContextSnapshot>) -> Outcome {
        let handler = match reference {
            TaskReference::Callable(h) => h.clone(),
            TaskReference::Path(path) => match self.units.get_or_load(path) {
                Ok(h) => h,
                Err(e) => {
                    return FlowError::TaskExecution {
                        task: task_id.to_string(),
                        message: format!("Unit loading failed: {:#}", e),
                    }.into();
                }
            },
        };

        debug!(task_id, unit = handler.name(), "Executing in-process");
        match handler.execute(snapshot).await {
            Ok(value) => Outcome::Success(value),
            Err(e) => FlowError::TaskExecution {
                task: task_id.to_string(),
                message: format!("Execution error: {:#}", e),
            }.into(),
        }
    }
}
