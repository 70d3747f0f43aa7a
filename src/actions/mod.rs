use async_trait::async_trait;
use serde_json::Value;
use crate::runtime::context::ContextSnapshot;
use anyhow::Result;
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;

pub mod demos;

/// A unit of work. It receives a read-only snapshot of everything earlier
/// steps produced and returns its own result.
#[async_trait]
pub trait TaskHandler: Send + Sync + Debug {
    fn name(&self) -> &str;
    async fn execute(&self, ctx: Arc<ContextSnapshot>) -> Result<Value>;
}

/// Adapts an async closure into a `TaskHandler`.
pub struct FnTask<F> {
    name: String,
    func: F,
}

impl<F> Debug for FnTask<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnTask<F>
where
    F: Fn(Arc<ContextSnapshot>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: Arc<ContextSnapshot>) -> Result<Value> {
        (self.func)(ctx).await
    }
}

pub fn task_fn<F, Fut>(name: &str, func: F) -> Arc<dyn TaskHandler>
where
    F: Fn(Arc<ContextSnapshot>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnTask { name: name.to_string(), func })
}
