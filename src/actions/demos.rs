use async_trait::async_trait;
use serde_json::{Map, Value, json};
use crate::actions::TaskHandler;
use crate::runtime::context::ContextSnapshot;
use crate::runtime::outcome::Outcome;
use crate::runtime::resolver::UnitCatalog;
use anyhow::{Result, anyhow, bail};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Catalog with every demo unit registered under `demos/<name>`.
pub fn catalog() -> UnitCatalog {
    let mut catalog = UnitCatalog::new();
    register(&mut catalog);
    catalog
}

pub fn register(catalog: &mut UnitCatalog) {
    catalog.register("demos/one", Arc::new(ConstantUnit::new("one", json!(1))));
    catalog.register("demos/two", Arc::new(ConstantUnit::new("two", json!(2))));
    catalog.register("demos/three", Arc::new(ConstantUnit::new("three", json!(3))));
    catalog.register("demos/sum", Arc::new(SumUnit));
    catalog.register("demos/add_initial", Arc::new(AddInitialUnit));
    catalog.register("demos/snapshot_keys", Arc::new(SnapshotKeysUnit));
    catalog.register("demos/fail", Arc::new(FailUnit));
    catalog.register("demos/sleep", Arc::new(SleepUnit));
    catalog.register("demos/report", Arc::new(ReportUnit));
    catalog.register("demos/exit", Arc::new(ExitUnit));
}

#[derive(Debug)]
pub struct ConstantUnit {
    name: String,
    value: Value,
}

impl ConstantUnit {
    pub fn new(name: &str, value: Value) -> Self {
        Self { name: name.to_string(), value }
    }
}

#[async_trait]
impl TaskHandler for ConstantUnit {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: Arc<ContextSnapshot>) -> Result<Value> {
        Ok(self.value.clone())
    }
}

/// Sums every numeric success value visible in the snapshot.
#[derive(Debug)]
pub struct SumUnit;

#[async_trait]
impl TaskHandler for SumUnit {
    fn name(&self) -> &str {
        "sum"
    }

    async fn execute(&self, ctx: Arc<ContextSnapshot>) -> Result<Value> {
        let mut int_total: i64 = 0;
        let mut float_total: f64 = 0.0;
        let mut saw_float = false;

        for entry in ctx.entries() {
            let Some(Value::Number(n)) = entry.outcome.value() else { continue };
            if let Some(i) = n.as_i64() {
                int_total = int_total.checked_add(i)
                    .ok_or_else(|| anyhow!("integer overflow while adding the result of '{}'", entry.task))?;
            } else if let Some(f) = n.as_f64() {
                float_total += f;
                saw_float = true;
            }
        }

        if saw_float {
            Ok(json!(int_total as f64 + float_total))
        } else {
            Ok(json!(int_total))
        }
    }
}

/// `initialData + 50`.
#[derive(Debug)]
pub struct AddInitialUnit;

#[async_trait]
impl TaskHandler for AddInitialUnit {
    fn name(&self) -> &str {
        "add_initial"
    }

    async fn execute(&self, ctx: Arc<ContextSnapshot>) -> Result<Value> {
        let input = ctx.initial("initialData")
            .and_then(Value::as_i64)
            .ok_or_else(|| anyhow!("initialData is missing or not an integer"))?;
        Ok(json!(input + 50))
    }
}

/// Reports which task results were visible when it was dispatched.
#[derive(Debug)]
pub struct SnapshotKeysUnit;

#[async_trait]
impl TaskHandler for SnapshotKeysUnit {
    fn name(&self) -> &str {
        "snapshot_keys"
    }

    async fn execute(&self, ctx: Arc<ContextSnapshot>) -> Result<Value> {
        Ok(json!(ctx.task_ids().collect::<Vec<_>>()))
    }
}

#[derive(Debug)]
pub struct FailUnit;

#[async_trait]
impl TaskHandler for FailUnit {
    fn name(&self) -> &str {
        "fail"
    }

    async fn execute(&self, _ctx: Arc<ContextSnapshot>) -> Result<Value> {
        bail!("deliberate failure")
    }
}

/// Sleeps for `sleep_ms` from the initial data (100ms when absent).
#[derive(Debug)]
pub struct SleepUnit;

#[async_trait]
impl TaskHandler for SleepUnit {
    fn name(&self) -> &str {
        "sleep"
    }

    async fn execute(&self, ctx: Arc<ContextSnapshot>) -> Result<Value> {
        let ms = ctx.initial("sleep_ms").and_then(Value::as_u64).unwrap_or(100);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(json!({ "slept_ms": ms }))
    }
}

/// Summarises the run so far, reading failure markers instead of tripping on them.
#[derive(Debug)]
pub struct ReportUnit;

#[async_trait]
impl TaskHandler for ReportUnit {
    fn name(&self) -> &str {
        "report"
    }

    async fn execute(&self, ctx: Arc<ContextSnapshot>) -> Result<Value> {
        let mut succeeded = Vec::new();
        let mut failed = Map::new();
        for entry in ctx.entries() {
            match &entry.outcome {
                Outcome::Success(_) => succeeded.push(Value::String(entry.task.clone())),
                Outcome::Failure(e) => {
                    failed.insert(entry.task.clone(), Value::String(e.message.clone()));
                }
            }
        }
        info!(succeeded = succeeded.len(), failed = failed.len(), "[REPORT]");
        Ok(json!({ "succeeded": succeeded, "failed": failed }))
    }
}

/// Terminates the hosting process. Only meaningful inside a worker process,
/// where it stands in for a crashing unit.
#[derive(Debug)]
pub struct ExitUnit;

#[async_trait]
impl TaskHandler for ExitUnit {
    fn name(&self) -> &str {
        "exit"
    }

    async fn execute(&self, _ctx: Arc<ContextSnapshot>) -> Result<Value> {
        std::process::exit(3)
    }
}
