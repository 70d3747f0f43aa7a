use std::sync::Arc;
use async_trait::async_trait;
use crate::runtime::context::ContextSnapshot;
use crate::runtime::outcome::Outcome;
use crate::runtime::task::{Isolation, TaskReference};

pub mod in_process;
pub mod process;
pub mod thread;

pub use in_process::InProcessBackend;
pub use process::ProcessBackend;
pub use thread::ThreadBackend;

/// Runs one task against a snapshot.
///
/// Never fails: load errors, task errors and transport errors are all
/// returned as `Outcome::Failure`.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    fn isolation(&self) -> Isolation;

    async fn execute(&self, task_id: &str, reference: &TaskReference, snapshot: Arc<ContextSnapshot>) -> Outcome;

    /// Releases pooled workers. Idempotent.
    async fn shutdown(&self) {}
}
