use std::collections::HashMap;
use serde::{Serialize, Serializer};
use serde::ser::SerializeMap;
use serde_json::{Map, Value};
use crate::error::FlowError;
use crate::runtime::context::{ContextSnapshot, SnapshotEntry};
use crate::runtime::outcome::Outcome;

/// Insertion-ordered mapping from task identifier to outcome for one flow run.
///
/// Only the flow executor mutates it. Overwriting an identifier keeps the
/// entry at its original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsStore {
    entries: Vec<(String, Outcome)>,
    index: HashMap<String, usize>,
}

impl ResultsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, task_id: &str) -> Option<&Outcome> {
        self.index.get(task_id).map(|&i| &self.entries[i].1)
    }

    pub fn value(&self, task_id: &str) -> Option<&Value> {
        self.get(task_id).and_then(Outcome::value)
    }

    pub fn set(&mut self, task_id: &str, outcome: Outcome) {
        match self.index.get(task_id) {
            Some(&i) => self.entries[i].1 = outcome,
            None => {
                self.index.insert(task_id.to_string(), self.entries.len());
                self.entries.push((task_id.to_string(), outcome));
            }
        }
    }

    /// Writes every outcome of a parallel group, in declared order.
    /// Nothing is written when the arity does not match.
    pub fn merge_group(&mut self, ids: &[String], outcomes: Vec<Outcome>) -> Result<(), FlowError> {
        if ids.len() != outcomes.len() {
            return Err(FlowError::GroupMismatch { ids: ids.len(), outcomes: outcomes.len() });
        }
        for (id, outcome) in ids.iter().zip(outcomes) {
            self.set(id, outcome);
        }
        Ok(())
    }

    /// Deep copy of the current state plus the run's initial data.
    pub fn snapshot(&self, initial: &Map<String, Value>) -> ContextSnapshot {
        let entries = self.entries.iter()
            .map(|(task, outcome)| SnapshotEntry { task: task.clone(), outcome: outcome.clone() })
            .collect();
        ContextSnapshot::new(initial.clone(), entries)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Outcome)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn task_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &Outcome)> {
        self.iter().filter(|(_, o)| o.is_failure())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Success values only, keyed by task identifier. Handy for result-equality checks.
    pub fn values(&self) -> Map<String, Value> {
        self.iter()
            .filter_map(|(k, o)| o.value().map(|v| (k.to_string(), v.clone())))
            .collect()
    }
}

impl Serialize for ResultsStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
