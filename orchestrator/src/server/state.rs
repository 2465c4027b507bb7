//! Server state

use std::sync::Arc;

use crate::store::Store;
use crate::workers::queue::AdmissionQueue;

/// Shared state for the admission HTTP server
pub struct ServerState {
    /// Persistent store handle
    pub store: Arc<Store>,

    /// Admission queue feeding the deployer worker
    pub queue: AdmissionQueue,
}

impl ServerState {
    pub fn new(store: Arc<Store>, queue: AdmissionQueue) -> Self {
        Self { store, queue }
    }
}
