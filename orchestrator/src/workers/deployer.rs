//! Deployment worker for orchestration
//!
//! Drains the admission queue and dispatches deployments to the pipeline
//! under the global concurrency ceiling. Dispatch order is strict FIFO
//! among enqueued tasks: the worker waits for a free slot before it looks
//! at the next task.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::deploy::pipeline::DeploymentPipeline;
use crate::workers::queue::DeployTask;

/// Deployer worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Maximum deployments in flight at once
    pub max_concurrent: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self { max_concurrent: 1 }
    }
}

/// Run the deployer worker
pub async fn run(
    options: &Options,
    pipeline: Arc<DeploymentPipeline>,
    mut queue_rx: mpsc::UnboundedReceiver<DeployTask>,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!("Deployer worker starting...");

    let slots = options.max_concurrent.max(1);
    let semaphore = Arc::new(Semaphore::new(slots));

    loop {
        let task = tokio::select! {
            _ = &mut shutdown_signal => {
                break;
            }
            task = queue_rx.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        let permit = tokio::select! {
            _ = &mut shutdown_signal => {
                break;
            }
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        info!("Dispatching deployment {}", task.deployment_id);
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            let id = task.deployment_id;
            if let Err(e) = pipeline.deploy(&id).await {
                error!("Deployment {} ended with error: {}", id, e);
            }
            drop(permit);
        });
    }

    info!("Deployer worker shutting down...");

    // Drain: wait for in-flight deployments to reach a terminal state.
    let _ = semaphore.acquire_many(slots as u32).await;

    info!("Deployer worker stopped");
}
