use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use anyhow::{Result, Context as AnyhowContext};
use serde_json::{Map, Value};
use tracing::{info, warn};
use crate::config::EngineConfig;
use crate::dsl::{Flow, FlowFile, Step};
use crate::runtime::resolver::{TaskResolver, UnitLoader};

/// A flow file turned into what the executor consumes.
pub struct CompiledFlow {
    pub id: String,
    pub name: String,
    pub flow: Flow,
    pub resolver: TaskResolver,
    pub initial: Map<String, Value>,
    pub config: EngineConfig,
}

pub struct FlowCompiler {
    loader: Arc<dyn UnitLoader>,
    defaults: EngineConfig,
}

impl FlowCompiler {
    pub fn new(loader: Arc<dyn UnitLoader>) -> Self {
        Self {
            loader,
            defaults: EngineConfig::default(),
        }
    }

    /// Engine settings used when the flow file carries no `engine` section.
    pub fn with_defaults(mut self, defaults: EngineConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Reads, parses and compiles a YAML flow file.
    pub fn compile_file(&self, path: &Path) -> Result<CompiledFlow> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("Cannot read flow file {}", path.display()))?;
        let file = FlowFile::from_yaml(&source)
            .with_context(|| format!("Cannot parse flow file {}", path.display()))?;
        info!(flow = %file.id, path = %path.display(), "Loaded flow file");
        self.compile(file)
    }

    /// Bad steps are compiled in place as `Step::Malformed`: the run executes
    /// everything before them and aborts when it gets there.
    pub fn compile(&self, file: FlowFile) -> Result<CompiledFlow> {
        let steps = file.steps.iter()
            .enumerate()
            .map(|(index, raw)| {
                let step = Step::from_value_deferred(index, raw);
                if let Step::Malformed { reason, .. } = &step {
                    warn!(flow = %file.id, step = index, "Malformed step will abort the run: {}", reason);
                }
                step
            })
            .collect();
        let flow = Flow::new(steps);

        let mut resolver = TaskResolver::new(self.loader.clone());
        for (task_id, spec) in &file.tasks {
            resolver.bind_path(task_id, &spec.unit, spec.isolation);
        }

        // Resolution is lazy: an unbound identifier aborts the run only once its step is reached.
        let mut seen = HashSet::new();
        for (index, step) in flow.steps().iter().enumerate() {
            let Ok(ids) = step.task_ids(index) else { continue };
            for id in ids {
                if !resolver.contains(id) && seen.insert(id.clone()) {
                    warn!(flow = %file.id, task_id = %id, step = index, "Task has no binding and will fail when reached");
                }
            }
        }

        let mut config = file.engine.unwrap_or_else(|| self.defaults.clone());
        if let Some(policy) = file.policy {
            config.policy = policy;
        }

        Ok(CompiledFlow {
            name: file.name.unwrap_or_else(|| file.id.clone()),
            id: file.id,
            flow,
            resolver,
            initial: file.initial,
            config,
        })
    }
}
