use std::sync::{Arc, OnceLock};
use serde_json::{Map, Value};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;
use crate::backends::{ExecutionBackend, InProcessBackend, ProcessBackend, ThreadBackend};
use crate::config::{EngineConfig, FailurePolicy};
use crate::dsl::{Flow, Step};
use crate::error::FlowError;
use crate::runtime::context::ContextSnapshot;
use crate::runtime::outcome::Outcome;
use crate::runtime::resolver::TaskResolver;
use crate::runtime::store::ResultsStore;
use crate::runtime::task::{Isolation, ResolvedTask};

/// Lifecycle of one flow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    RunningStep { index: usize },
    MergingResults { index: usize },
    Completed,
    Aborted,
}

/// What a run hands back. Task failures never escape as a Rust error: they
/// are either markers in the store or, under fail-fast, the abort reason.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(ResultsStore),
    Aborted {
        store: ResultsStore,
        error: FlowError,
    },
}

impl RunOutcome {
    pub fn state(&self) -> RunState {
        match self {
            RunOutcome::Completed(_) => RunState::Completed,
            RunOutcome::Aborted { .. } => RunState::Aborted,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    pub fn store(&self) -> &ResultsStore {
        match self {
            RunOutcome::Completed(store) => store,
            RunOutcome::Aborted { store, .. } => store,
        }
    }

    pub fn error(&self) -> Option<&FlowError> {
        match self {
            RunOutcome::Completed(_) => None,
            RunOutcome::Aborted { error, .. } => Some(error),
        }
    }

    pub fn into_store(self) -> ResultsStore {
        match self {
            RunOutcome::Completed(store) => store,
            RunOutcome::Aborted { store, .. } => store,
        }
    }

    pub fn into_result(self) -> Result<ResultsStore, (ResultsStore, FlowError)> {
        match self {
            RunOutcome::Completed(store) => Ok(store),
            RunOutcome::Aborted { store, error } => Err((store, error)),
        }
    }
}

/// Walks a flow step by step, dispatching each task to the backend its
/// binding names and merging outcomes into a store owned by the run.
///
/// Isolated backends are started on first use and reused by every later
/// run of the same executor until `shutdown`.
pub struct FlowExecutor {
    resolver: TaskResolver,
    config: EngineConfig,
    in_process: Arc<InProcessBackend>,
    thread: OnceLock<Arc<ThreadBackend>>,
    process: OnceLock<Arc<ProcessBackend>>,
}

impl FlowExecutor {
    pub fn new(resolver: TaskResolver, config: EngineConfig) -> Self {
        let in_process = Arc::new(InProcessBackend::new(resolver.units()));
        Self {
            resolver,
            config,
            in_process,
            thread: OnceLock::new(),
            process: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn backend_for(&self, isolation: Isolation) -> Arc<dyn ExecutionBackend> {
        match isolation {
            Isolation::InProcess => self.in_process.clone() as Arc<dyn ExecutionBackend>,
            Isolation::Thread => self.thread
                .get_or_init(|| Arc::new(ThreadBackend::new(self.config.thread_workers, self.resolver.units())))
                .clone(),
            Isolation::Process => self.process
                .get_or_init(|| {
                    let backend = ProcessBackend::new(
                        self.config.worker_program(),
                        self.config.worker_args.clone(),
                        self.config.process_workers,
                    );
                    info!(program = %backend.program().display(), size = self.config.process_workers, "Process pool configured");
                    Arc::new(backend)
                })
                .clone(),
        }
    }

    /// Runs `flow` with the executor's configured failure policy.
    pub async fn run(&self, flow: &Flow, initial: Map<String, Value>) -> RunOutcome {
        self.run_with_policy(flow, initial, self.config.policy).await
    }

    pub async fn run_with_policy(&self, flow: &Flow, initial: Map<String, Value>, policy: FailurePolicy) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let run = FlowRun {
            executor: self,
            store: ResultsStore::new(),
            initial,
            policy,
            state: RunState::Idle,
        };
        run.execute(flow).instrument(info_span!("flow_run", run_id = %run_id)).await
    }

    /// Stops every worker thread and worker process started by this executor.
    pub async fn shutdown(&self) {
        if let Some(thread) = self.thread.get() {
            thread.shutdown().await;
        }
        if let Some(process) = self.process.get() {
            process.shutdown().await;
        }
    }
}

struct FlowRun<'a> {
    executor: &'a FlowExecutor,
    store: ResultsStore,
    initial: Map<String, Value>,
    policy: FailurePolicy,
    state: RunState,
}

impl FlowRun<'_> {
    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "State transition");
        self.state = next;
    }

    async fn execute(mut self, flow: &Flow) -> RunOutcome {
        info!(steps = flow.len(), policy = ?self.policy, "Starting flow run");

        for (index, step) in flow.steps().iter().enumerate() {
            self.transition(RunState::RunningStep { index });
            if let Err(error) = self.run_step(index, step).await {
                self.transition(RunState::Aborted);
                error!(step = index, recorded = self.store.len(), "Flow aborted: {}", error);
                return RunOutcome::Aborted { store: self.store, error };
            }
        }

        self.transition(RunState::Completed);
        info!(recorded = self.store.len(), "Flow completed");
        RunOutcome::Completed(self.store)
    }

    async fn run_step(&mut self, index: usize, step: &Step) -> Result<(), FlowError> {
        let ids = step.task_ids(index)?;

        // Every member resolves before any member runs.
        let tasks = ids.iter()
            .map(|id| self.executor.resolver.resolve(id))
            .collect::<Result<Vec<_>, _>>()?;

        if step.is_group() {
            info!(step = index, tasks = ?ids, "Starting parallel group");
        } else {
            info!(step = index, task_id = %ids[0], isolation = %tasks[0].isolation, "Starting sequential task");
        }

        // One snapshot per step: group members never see each other's results.
        let snapshot = Arc::new(self.store.snapshot(&self.initial));
        let outcomes = self.dispatch(tasks, snapshot).await;

        self.transition(RunState::MergingResults { index });
        self.store.merge_group(ids, outcomes)?;
        info!(step = index, added = ids.len(), "Step merged");

        for id in ids {
            if let Some(Outcome::Failure(info)) = self.store.get(id) {
                warn!(step = index, task_id = %id, "Task failed: {}", info);
                if self.policy == FailurePolicy::FailFast {
                    return Err(FlowError::TaskFailed { task: id.clone(), error: info.clone() });
                }
            }
        }
        Ok(())
    }

    /// Starts every task of the step at once and waits for all of them: the join barrier.
    async fn dispatch(&self, tasks: Vec<ResolvedTask>, snapshot: Arc<ContextSnapshot>) -> Vec<Outcome> {
        let handles: Vec<_> = tasks.into_iter()
            .map(|task| {
                let backend = self.executor.backend_for(task.isolation);
                let snapshot = snapshot.clone();
                let id = task.id.clone();
                debug!(task_id = %id, isolation = %backend.isolation(), "Dispatching task");
                let handle = tokio::spawn(
                    async move { backend.execute(&task.id, &task.reference, snapshot).await }.in_current_span(),
                );
                (id, handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => FlowError::TaskExecution {
                    task: id,
                    message: format!("task panicked: {}", e),
                }.into(),
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}
