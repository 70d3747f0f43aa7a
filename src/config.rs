use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, Context as AnyhowContext};
use serde::{Serialize, Deserialize};

pub const WORKER_BINARY: &str = "taskflow_worker";

/// What a task failure does to the rest of the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The first failure aborts the run with the partial store.
    #[default]
    FailFast,
    /// Failures are recorded as markers and later steps still run.
    ContinueAndRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub policy: FailurePolicy,
    /// Worker threads in the thread-isolated pool.
    pub thread_workers: usize,
    /// Upper bound on concurrently alive worker processes.
    pub process_workers: usize,
    /// Worker executable for process isolation. Defaults to the
    /// `taskflow_worker` binary next to the current executable.
    pub worker_program: Option<PathBuf>,
    pub worker_args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: FailurePolicy::FailFast,
            thread_workers: 4,
            process_workers: 2,
            worker_program: None,
            worker_args: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_worker_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.worker_program = Some(program.into());
        self
    }

    pub fn worker_program(&self) -> PathBuf {
        if let Some(p) = &self.worker_program {
            return p.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(WORKER_BINARY)))
            .unwrap_or_else(|| PathBuf::from(WORKER_BINARY))
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine config from {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse engine config from {}", path.display()))
    }
}
