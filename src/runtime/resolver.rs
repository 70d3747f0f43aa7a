use std::collections::HashMap;
use std::sync::Arc;
use anyhow::{Result, anyhow};
use dashmap::DashMap;
use tracing::debug;
use crate::actions::TaskHandler;
use crate::error::FlowError;
use crate::runtime::task::{Isolation, ResolvedTask, TaskReference, UnitPath};

/// The "load executable unit by reference" capability.
pub trait UnitLoader: Send + Sync {
    fn load(&self, path: &UnitPath) -> Result<Arc<dyn TaskHandler>>;
}

/// Units registered under a load path. Each hosting context (the engine,
/// a worker process) builds its own catalog.
#[derive(Default)]
pub struct UnitCatalog {
    units: HashMap<UnitPath, Arc<dyn TaskHandler>>,
}

impl UnitCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: &str, handler: Arc<dyn TaskHandler>) {
        self.units.insert(UnitPath::new(path), handler);
    }

    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.units.keys().map(UnitPath::as_str).collect();
        paths.sort_unstable();
        paths
    }
}

impl UnitLoader for UnitCatalog {
    fn load(&self, path: &UnitPath) -> Result<Arc<dyn TaskHandler>> {
        self.units.get(path)
            .cloned()
            .ok_or_else(|| anyhow!("No unit registered at path '{}'", path))
    }
}

/// Resolved-unit cache in front of a loader.
///
/// A path is loaded at most once: concurrent requests for the same path from
/// several worker threads serialize on the cache entry and all receive the
/// handler produced by the first load. Entries are never invalidated unless
/// `invalidate` is called.
pub struct UnitCache {
    loader: Arc<dyn UnitLoader>,
    cache: DashMap<UnitPath, Arc<dyn TaskHandler>>,
}

impl UnitCache {
    pub fn new(loader: Arc<dyn UnitLoader>) -> Self {
        Self {
            loader,
            cache: DashMap::new(),
        }
    }

    pub fn get_or_load(&self, path: &UnitPath) -> Result<Arc<dyn TaskHandler>> {
        if let Some(handler) = self.cache.get(path) {
            return Ok(handler.clone());
        }
        let entry = self.cache.entry(path.clone()).or_try_insert_with(|| {
            debug!(unit = %path, "Loading unit");
            self.loader.load(path)
        })?;
        Ok(entry.value().clone())
    }

    pub fn invalidate(&self, path: &UnitPath) {
        self.cache.remove(path);
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

#[derive(Debug, Clone)]
enum BindingTarget {
    Callable(Arc<dyn TaskHandler>),
    Path(UnitPath),
}

#[derive(Debug, Clone)]
struct TaskBinding {
    target: BindingTarget,
    isolation: Isolation,
}

/// Maps task identifiers to units and the backend each one runs on.
/// Passed explicitly into the executor; scoped to whoever built it.
pub struct TaskResolver {
    bindings: HashMap<String, TaskBinding>,
    units: Arc<UnitCache>,
}

impl TaskResolver {
    pub fn new(loader: Arc<dyn UnitLoader>) -> Self {
        Self {
            bindings: HashMap::new(),
            units: Arc::new(UnitCache::new(loader)),
        }
    }

    /// In-memory callable, always executed in-process.
    pub fn bind_callable(&mut self, task_id: &str, handler: Arc<dyn TaskHandler>) -> &mut Self {
        self.bindings.insert(task_id.to_string(), TaskBinding {
            target: BindingTarget::Callable(handler),
            isolation: Isolation::InProcess,
        });
        self
    }

    pub fn bind_path(&mut self, task_id: &str, path: &str, isolation: Isolation) -> &mut Self {
        self.bindings.insert(task_id.to_string(), TaskBinding {
            target: BindingTarget::Path(UnitPath::new(path)),
            isolation,
        });
        self
    }

    /// Binds a callable with an explicit isolation. Only in-process isolation
    /// can run it; anything else fails at resolution time.
    pub fn bind_callable_with(&mut self, task_id: &str, handler: Arc<dyn TaskHandler>, isolation: Isolation) -> &mut Self {
        self.bindings.insert(task_id.to_string(), TaskBinding {
            target: BindingTarget::Callable(handler),
            isolation,
        });
        self
    }

    pub fn resolve(&self, task_id: &str) -> Result<ResolvedTask, FlowError> {
        let binding = self.bindings.get(task_id)
            .ok_or_else(|| FlowError::unresolved(task_id, "no callable or load path is bound to this identifier"))?;

        let reference = match (&binding.target, binding.isolation) {
            (BindingTarget::Callable(h), Isolation::InProcess) => TaskReference::Callable(h.clone()),
            (BindingTarget::Callable(_), isolation) => {
                return Err(FlowError::unresolved(
                    task_id,
                    format!("in-memory callable cannot cross the {} isolation boundary; bind a load path instead", isolation),
                ));
            }
            (BindingTarget::Path(p), _) => TaskReference::Path(p.clone()),
        };

        Ok(ResolvedTask {
            id: task_id.to_string(),
            reference,
            isolation: binding.isolation,
        })
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.bindings.contains_key(task_id)
    }

    pub fn units(&self) -> Arc<UnitCache> {
        self.units.clone()
    }
}
