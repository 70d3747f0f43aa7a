use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use crate::backends::ExecutionBackend;
use crate::error::FlowError;
use crate::runtime::context::ContextSnapshot;
use crate::runtime::outcome::Outcome;
use crate::runtime::protocol::{WorkerMessage, WorkerResponse};
use crate::runtime::resolver::UnitCache;
use crate::runtime::task::{Isolation, TaskReference};
use crate::runtime::worker::handle_message;

/// Encoded `WorkerMessage` plus the channel its encoded `WorkerResponse` goes back on.
struct Job {
    task_id: String,
    payload: String,
    reply: oneshot::Sender<String>,
}

/// Bounded pool of OS threads, each driving its own single-threaded runtime.
///
/// Nothing but encoded strings crosses into a worker: the snapshot is
/// serialized on dispatch and the unit is resolved again on the worker side.
pub struct ThreadBackend {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadBackend {
    pub fn new(size: usize, units: Arc<UnitCache>) -> Self {
        let size = size.max(1);
        let (tx, rx) = mpsc::channel(size);
        let receiver = Arc::new(tokio::sync::Mutex::new(rx));

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let receiver = receiver.clone();
            let units = units.clone();
            let spawned = thread::Builder::new()
                .name(format!("taskflow-worker-{}", index))
                .spawn(move || worker_loop(index, receiver, units));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => error!(index, "Failed to spawn worker thread: {}", e),
            }
        }
        info!(threads = workers.len(), "Thread pool started");

        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    pub fn size(&self) -> usize {
        self.workers.lock().map(|w| w.len()).unwrap_or_else(|p| p.into_inner().len())
    }

    fn sender(&self) -> Option<mpsc::Sender<Job>> {
        match self.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Closes the job channel and hands back the worker handles to join.
    fn close(&self) -> Vec<JoinHandle<()>> {
        match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

fn transport(task_id: &str, message: impl Into<String>) -> Outcome {
    FlowError::IsolationTransport {
        task: task_id.to_string(),
        message: message.into(),
    }.into()
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>;

/// Serves jobs until the channel closes. A crash while serving rebuilds the
/// runtime and resumes on the same thread, so the pool never shrinks.
fn worker_loop(index: usize, receiver: SharedReceiver, units: Arc<UnitCache>) {
    loop {
        let served = panic::catch_unwind(AssertUnwindSafe(|| serve_jobs(index, &receiver, &units)));
        match served {
            Ok(()) => break,
            Err(_) => error!(index, "Worker thread crashed while serving a job, restarting"),
        }
    }
    debug!(index, "Worker thread exiting");
}

fn serve_jobs(index: usize, receiver: &SharedReceiver, units: &Arc<UnitCache>) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(index, "Worker thread could not build its runtime: {}", e);
            return;
        }
    };

    runtime.block_on(async {
        loop {
            let job = {
                let mut rx = receiver.lock().await;
                rx.recv().await
            };
            let Some(job) = job else { break };

            let response = match WorkerMessage::decode(&job.payload) {
                Ok(message) => handle_message(units.clone(), message).await,
                Err(e) => WorkerResponse::error(&job.task_id, format!("{:#}", e)),
            };

            match response.encode() {
                Ok(encoded) => {
                    if job.reply.send(encoded).is_err() {
                        warn!(index, task_id = %job.task_id, "Dispatcher stopped waiting for the response");
                    }
                }
                // Dropping the reply sender surfaces as a transport failure.
                Err(e) => error!(index, task_id = %job.task_id, "Failed to encode response: {:#}", e),
            }
        }
    });
}

#[async_trait]
impl ExecutionBackend for ThreadBackend {
    fn isolation(&self) -> Isolation {
        Isolation::Thread
    }

    async fn execute(&self, task_id: &str, reference: &TaskReference, snapshot: Arc<ContextSnapshot>) -> Outcome {
        let Some(unit) = reference.path() else {
            return transport(task_id, "in-memory callables cannot be sent to a worker thread");
        };
        let Some(sender) = self.sender() else {
            return transport(task_id, "thread pool is shut down");
        };

        let message = WorkerMessage {
            task_id: task_id.to_string(),
            unit: unit.clone(),
            snapshot: (*snapshot).clone(),
        };
        let payload = match message.encode() {
            Ok(p) => p,
            Err(e) => return transport(task_id, format!("{:#}", e)),
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job {
            task_id: task_id.to_string(),
            payload,
            reply: reply_tx,
        };
        if sender.send(job).await.is_err() {
            return transport(task_id, "all worker threads have exited");
        }
        debug!(task_id, unit = %unit, "Dispatched to worker thread");

        let raw = match reply_rx.await {
            Ok(raw) => raw,
            Err(_) => return transport(task_id, "worker thread dropped the task before responding"),
        };
        match WorkerResponse::decode(&raw) {
            Ok(response) if response.task_id == task_id => response.into_outcome(),
            Ok(response) => transport(
                task_id,
                format!("response correlation mismatch: got '{}'", response.task_id),
            ),
            Err(e) => transport(task_id, format!("{:#}", e)),
        }
    }

    async fn shutdown(&self) {
        let handles = self.close();
        if handles.is_empty() {
            return;
        }
        let count = handles.len();
        let joined = tokio::task::spawn_blocking(move || {
            for handle in handles {
                if handle.join().is_err() {
                    error!("Worker thread panicked during shutdown");
                }
            }
        }).await;
        if let Err(e) = joined {
            error!("Failed to join worker threads: {}", e);
        }
        info!(threads = count, "Thread pool shut down");
    }
}

impl Drop for ThreadBackend {
    fn drop(&mut self) {
        for handle in self.close() {
            let _ = handle.join();
        }
    }
}
