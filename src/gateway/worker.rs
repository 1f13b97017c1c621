//! Isolated execution of one agent run
//!
//! Each run gets its own OS thread and current-thread runtime. The caller
//! waits on a channel with a deadline; on timeout it walks away and the thread
//! finishes (and cleans up) on its own.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, info};

use super::ToolError;
use crate::agent::DelegatedAgent;

const WORKER_THREAD_NAME: &str = "askcfo-tool-worker";

/// Run `agent` on `prompt`, blocking the calling thread for at most `timeout`
pub(crate) fn run_isolated(
    mut agent: Box<dyn DelegatedAgent>,
    prompt: String,
    timeout: Duration,
) -> Result<(), ToolError> {
    let (tx, rx) = mpsc::channel();

    let handle = thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || {
            debug!("Tool worker started");
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    let _ = tx.send(Err(ToolError::Worker(format!(
                        "failed to start runtime: {}",
                        e
                    ))));
                    return;
                }
            };

            let outcome = runtime.block_on(async {
                let result = AssertUnwindSafe(agent.run(&prompt)).catch_unwind().await;
                info!("Cleaning up agent");
                agent.cleanup().await;
                match result {
                    Ok(run) => run.map_err(|e| ToolError::Execution(e.to_string())),
                    Err(panic) => {
                        let reason = panic_message(panic.as_ref());
                        error!(reason = %reason, "Agent run panicked");
                        Err(ToolError::Worker(reason))
                    }
                }
            });

            // The receiver is gone if the caller already timed out
            if tx.send(outcome).is_err() {
                info!("Abandoned tool run finished after its deadline");
            }
            debug!("Tool worker exiting");
        })
        .map_err(|e| ToolError::Worker(format!("failed to spawn worker thread: {}", e)))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            error!(timeout = ?timeout, "Tool run timed out, abandoning it");
            Err(ToolError::Timeout(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => {
            let reason = match handle.join() {
                Err(panic) => panic_message(panic.as_ref()),
                Ok(()) => "worker exited without a result".to_string(),
            };
            error!(reason = %reason, "Tool worker failed");
            Err(ToolError::Worker(reason))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("worker panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("worker panicked: {}", s)
    } else {
        "worker panicked".to_string()
    }
}
