//! Admission queue
//!
//! Unbounded in-process FIFO feeding the deployer worker. Enqueue never
//! rejects and returns promptly; by the time it returns the deployment row
//! is already pending and will eventually be observed by the worker.

use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::OrchestratorError;

/// A queued deployment task.
///
/// Carries only the deployment id; the pipeline reconstructs paths and
/// context from the store.
#[derive(Debug, Clone)]
pub struct DeployTask {
    pub deployment_id: String,
}

/// Sending half of the admission queue.
#[derive(Clone)]
pub struct AdmissionQueue {
    tx: mpsc::UnboundedSender<DeployTask>,
}

impl AdmissionQueue {
    /// Create the queue, returning the sender and the worker's receiver.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeployTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Submit a deployment for processing.
    ///
    /// O(1), unbounded backlog. Fails only if the worker has shut down.
    pub fn enqueue(&self, deployment_id: impl Into<String>) -> Result<(), OrchestratorError> {
        let task = DeployTask {
            deployment_id: deployment_id.into(),
        };
        debug!("Enqueueing deployment {}", task.deployment_id);

        self.tx.send(task).map_err(|e| {
            OrchestratorError::Internal(format!(
                "admission queue is closed, dropped deployment {}",
                e.0.deployment_id
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_preserves_fifo_order() {
        let (queue, mut rx) = AdmissionQueue::new();
        queue.enqueue("a").unwrap();
        queue.enqueue("b").unwrap();
        queue.enqueue("c").unwrap();

        assert_eq!(rx.recv().await.unwrap().deployment_id, "a");
        assert_eq!(rx.recv().await.unwrap().deployment_id, "b");
        assert_eq!(rx.recv().await.unwrap().deployment_id, "c");
    }

    #[tokio::test]
    async fn test_enqueue_fails_after_worker_shutdown() {
        let (queue, rx) = AdmissionQueue::new();
        drop(rx);
        assert!(queue.enqueue("orphan").is_err());
    }
}
