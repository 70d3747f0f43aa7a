use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use anyhow::{Result, Context as AnyhowContext};
use crate::runtime::outcome::Outcome;

/// Immutable view of the results store taken when a task (or a parallel group)
/// is dispatched, together with the caller-supplied initial data.
///
/// This is the only shape of store state that crosses a thread or process
/// boundary; it knows nothing about how `ResultsStore` keeps its entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    #[serde(default)]
    initial: Map<String, Value>,
    #[serde(default)]
    entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub task: String,
    pub outcome: Outcome,
}

impl ContextSnapshot {
    pub fn new(initial: Map<String, Value>, entries: Vec<SnapshotEntry>) -> Self {
        Self { initial, entries }
    }

    /// Caller-supplied data the run was started with.
    pub fn initial(&self, key: &str) -> Option<&Value> {
        self.initial.get(key)
    }

    pub fn initial_data(&self) -> &Map<String, Value> {
        &self.initial
    }

    pub fn get(&self, task_id: &str) -> Option<&Outcome> {
        self.entries.iter().find(|e| e.task == task_id).map(|e| &e.outcome)
    }

    /// Success value of an earlier task; `None` for missing tasks and failure markers.
    pub fn value(&self, task_id: &str) -> Option<&Value> {
        self.get(task_id).and_then(Outcome::value)
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    /// Task identifiers in the order they entered the store.
    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.task.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to encode context snapshot")
    }

    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to decode context snapshot")
    }
}
