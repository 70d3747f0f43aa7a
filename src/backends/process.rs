use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use anyhow::{Result, Context as AnyhowContext, anyhow, bail};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use crate::backends::ExecutionBackend;
use crate::error::FlowError;
use crate::runtime::context::ContextSnapshot;
use crate::runtime::outcome::Outcome;
use crate::runtime::protocol::{WorkerMessage, WorkerResponse};
use crate::runtime::task::{Isolation, TaskReference};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A child worker process speaking newline-delimited JSON on stdin/stdout.
struct WorkerProcess {
    id: usize,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl WorkerProcess {
    fn spawn(id: usize, program: &Path, args: &[String]) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start worker process {}", program.display()))?;

        let stdin = child.stdin.take().ok_or_else(|| anyhow!("Worker stdin was not captured"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("Worker stdout was not captured"))?;
        debug!(worker = id, pid = ?child.id(), "Spawned worker process");

        Ok(Self {
            id,
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Writes one request line. Nothing has reached the unit if this fails.
    async fn send(&mut self, payload: &str) -> Result<()> {
        self.stdin.write_all(payload.as_bytes()).await.context("Failed to write to worker stdin")?;
        self.stdin.write_all(b"\n").await.context("Failed to write to worker stdin")?;
        self.stdin.flush().await.context("Failed to flush worker stdin")?;
        Ok(())
    }

    /// Reads one response line, which must carry the request's task id.
    async fn receive(&mut self, task_id: &str) -> Result<WorkerResponse> {
        let mut line = String::new();
        let read = self.stdout.read_line(&mut line).await.context("Failed to read from worker stdout")?;
        if read == 0 {
            let status = self.child.try_wait().ok().flatten();
            bail!("worker process exited before responding (status: {:?})", status);
        }

        let response = WorkerResponse::decode(line.trim_end())?;
        if response.task_id != task_id {
            bail!("response correlation mismatch: expected '{}', got '{}'", task_id, response.task_id);
        }
        Ok(response)
    }

    fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => false,
            Ok(Some(status)) => {
                debug!(worker = self.id, ?status, "Idle worker process has exited");
                true
            }
            Err(e) => {
                warn!(worker = self.id, "Failed to poll worker process: {}", e);
                true
            }
        }
    }

    async fn kill(mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!(worker = self.id, "Kill signal not delivered: {}", e);
        }
        let _ = self.child.wait().await;
    }

    /// Closing stdin asks the worker to exit; it is killed if it does not.
    async fn stop(self) {
        let WorkerProcess { id, mut child, stdin, stdout } = self;
        drop(stdin);
        drop(stdout);
        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!(worker = id, ?status, "Worker process exited"),
            Ok(Err(e)) => warn!(worker = id, "Failed to reap worker process: {}", e),
            Err(_) => {
                warn!(worker = id, "Worker process ignored shutdown, killing");
                let _ = child.kill().await;
            }
        }
    }
}

/// Bounded pool of long-lived worker processes, spawned on demand.
///
/// Each child handles one message at a time; the semaphore caps the number of
/// children. Children that misbehave are killed and replaced on next use.
pub struct ProcessBackend {
    program: PathBuf,
    args: Vec<String>,
    permits: Semaphore,
    idle: Mutex<Vec<WorkerProcess>>,
    next_id: AtomicUsize,
}

impl ProcessBackend {
    pub fn new(program: PathBuf, args: Vec<String>, size: usize) -> Self {
        Self {
            program,
            args,
            permits: Semaphore::new(size.max(1)),
            idle: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn spawn_worker(&self) -> Result<WorkerProcess> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        WorkerProcess::spawn(id, &self.program, &self.args)
    }

    /// An idle child, skipping any that died while pooled, or a fresh one.
    fn checkout(&self) -> Result<WorkerProcess> {
        loop {
            let reused = match self.idle.lock() {
                Ok(mut idle) => idle.pop(),
                Err(poisoned) => poisoned.into_inner().pop(),
            };
            match reused {
                Some(mut worker) => {
                    if !worker.has_exited() {
                        return Ok(worker);
                    }
                }
                None => return self.spawn_worker(),
            }
        }
    }

    fn checkin(&self, worker: WorkerProcess) {
        if self.permits.is_closed() {
            // Dropped: kill_on_drop reaps it.
            return;
        }
        match self.idle.lock() {
            Ok(mut idle) => idle.push(worker),
            Err(poisoned) => poisoned.into_inner().push(worker),
        }
    }

    fn drain_idle(&self) -> Vec<WorkerProcess> {
        match self.idle.lock() {
            Ok(mut idle) => std::mem::take(&mut *idle),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    /// OS process ids of the pooled idle children.
    pub fn idle_pids(&self) -> Vec<u32> {
        match self.idle.lock() {
            Ok(idle) => idle.iter().filter_map(|w| w.child.id()).collect(),
            Err(poisoned) => poisoned.into_inner().iter().filter_map(|w| w.child.id()).collect(),
        }
    }

    pub fn idle_workers(&self) -> usize {
        match self.idle.lock() {
            Ok(idle) => idle.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

fn transport(task_id: &str, message: impl Into<String>) -> Outcome {
    FlowError::IsolationTransport {
        task: task_id.to_string(),
        message: message.into(),
    }.into()
}

#[async_trait]
impl ExecutionBackend for ProcessBackend {
    fn isolation(&self) -> Isolation {
        Isolation::Process
    }

    async fn execute(&self, task_id: &str, reference: &TaskReference, snapshot: Arc<ContextSnapshot>) -> Outcome {
        let Some(unit) = reference.path() else {
            return transport(task_id, "in-memory callables cannot cross a process boundary");
        };

        let _permit = match self.permits.acquire().await {
            Ok(p) => p,
            Err(_) => return transport(task_id, "process pool is shut down"),
        };

        let payload = WorkerMessage {
            task_id: task_id.to_string(),
            unit: unit.clone(),
            snapshot: (*snapshot).clone(),
        }.encode();
        let payload = match payload {
            Ok(p) => p,
            Err(e) => return transport(task_id, format!("{:#}", e)),
        };

        let mut worker = match self.checkout() {
            Ok(w) => w,
            Err(e) => return transport(task_id, format!("{:#}", e)),
        };

        // A child can still die between checkout and write. The request never
        // reached it, so it is resent once to a fresh child.
        if let Err(e) = worker.send(&payload).await {
            warn!(task_id, worker = worker.id, "Worker process unreachable, retrying on a new one: {:#}", e);
            worker.kill().await;
            worker = match self.spawn_worker() {
                Ok(w) => w,
                Err(e) => return transport(task_id, format!("{:#}", e)),
            };
            if let Err(e) = worker.send(&payload).await {
                worker.kill().await;
                return transport(task_id, format!("{:#}", e));
            }
        }
        debug!(task_id, worker = worker.id, unit = %unit, "Dispatched to worker process");

        match worker.receive(task_id).await {
            Ok(response) => {
                self.checkin(worker);
                response.into_outcome()
            }
            Err(e) => {
                warn!(task_id, worker = worker.id, "Discarding worker process: {:#}", e);
                worker.kill().await;
                transport(task_id, format!("{:#}", e))
            }
        }
    }

    async fn shutdown(&self) {
        self.permits.close();
        let workers = self.drain_idle();
        let count = workers.len();
        for worker in workers {
            worker.stop().await;
        }
        info!(processes = count, "Process pool shut down");
    }
}
