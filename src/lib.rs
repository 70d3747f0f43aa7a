pub mod actions;
pub mod backends;
pub mod compiler;
pub mod config;
pub mod dsl;
pub mod error;
pub mod runtime;

pub use config::{EngineConfig, FailurePolicy};
pub use error::FlowError;
pub use runtime::engine::{FlowExecutor, RunOutcome, RunState};
pub use runtime::outcome::{ErrorInfo, FailureKind, Outcome};
