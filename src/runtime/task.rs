use std::fmt;
use std::sync::Arc;
use serde::{Serialize, Deserialize};
use crate::actions::TaskHandler;

/// Which execution backend a task is dispatched to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    #[default]
    InProcess,
    Thread,
    Process,
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Isolation::InProcess => "in_process",
            Isolation::Thread => "thread",
            Isolation::Process => "process",
        };
        f.write_str(s)
    }
}

/// Load-path descriptor of a unit. Resolvable independently in any isolated
/// context that hosts a catalog with the same path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct UnitPath(String);

impl UnitPath {
    pub fn new(path: &str) -> Self {
        let mut p = path.trim();
        while let Some(rest) = p.strip_prefix("./") {
            p = rest;
        }
        Self(p.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for UnitPath {
    fn from(s: String) -> Self {
        UnitPath::new(&s)
    }
}

impl From<&str> for UnitPath {
    fn from(s: &str) -> Self {
        UnitPath::new(s)
    }
}

impl From<UnitPath> for String {
    fn from(p: UnitPath) -> Self {
        p.0
    }
}

impl fmt::Display for UnitPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved executable unit.
#[derive(Debug, Clone)]
pub enum TaskReference {
    /// Direct handle; only usable in the engine's own memory space.
    Callable(Arc<dyn TaskHandler>),
    Path(UnitPath),
}

impl TaskReference {
    pub fn path(&self) -> Option<&UnitPath> {
        match self {
            TaskReference::Path(p) => Some(p),
            TaskReference::Callable(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedTask {
    pub id: String,
    pub reference: TaskReference,
    pub isolation: Isolation,
}
