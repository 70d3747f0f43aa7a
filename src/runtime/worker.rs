use std::sync::Arc;
use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};
use crate::runtime::protocol::{WorkerMessage, WorkerResponse};
use crate::runtime::resolver::UnitCache;

/// Runs one worker message inside an isolated context (worker thread or child
/// process). The unit is resolved here, independently of the dispatching side.
pub async fn handle_message(units: Arc<UnitCache>, message: WorkerMessage) -> WorkerResponse {
    let WorkerMessage { task_id, unit, snapshot } = message;

    // Loading and running both happen inside the spawned task: a panic in
    // either surfaces as a JoinError and the hosting worker keeps serving.
    let id = task_id.clone();
    let run = tokio::spawn(async move {
        let handler = units.get_or_load(&unit).map_err(|e| {
            warn!(task_id = %id, unit = %unit, "Unit loading failed: {:#}", e);
            format!("Unit loading failed: {:#}", e)
        })?;
        handler.execute(Arc::new(snapshot)).await
            .map_err(|e| format!("Execution error: {:#}", e))
    });

    match run.await {
        Ok(Ok(value)) => WorkerResponse::success(&task_id, value),
        Ok(Err(message)) => WorkerResponse::error(&task_id, message),
        Err(join_err) => {
            warn!(task_id = %task_id, "Unit panicked: {}", join_err);
            WorkerResponse::error(&task_id, format!("Unit panicked: {}", join_err))
        }
    }
}

/// Worker-process main loop: one `WorkerMessage` per stdin line, one
/// `WorkerResponse` per stdout line, until stdin reaches EOF.
pub async fn serve_stdio(units: Arc<UnitCache>, name: &str) -> Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    info!(worker = name, pid = std::process::id(), "Worker ready");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match WorkerMessage::decode(&line) {
            Ok(message) => {
                debug!(worker = name, task_id = %message.task_id, unit = %message.unit, "Received task");
                handle_message(units.clone(), message).await
            }
            Err(e) => {
                error!(worker = name, "Rejecting undecodable message: {:#}", e);
                WorkerResponse::error("", format!("Undecodable message: {:#}", e))
            }
        };

        let mut encoded = response.encode()?;
        encoded.push('\n');
        stdout.write_all(encoded.as_bytes()).await?;
        stdout.flush().await?;
    }

    info!(worker = name, "Input closed, worker exiting");
    Ok(())
}

