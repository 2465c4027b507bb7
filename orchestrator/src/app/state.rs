//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::errors::OrchestratorError;
use crate::filesys::layout::DeploymentLayout;
use crate::store::Store;
use crate::workers::queue::AdmissionQueue;

/// Main application state
pub struct AppState {
    /// Persistent store handle
    pub store: Arc<Store>,

    /// Admission queue (sending half)
    pub queue: AdmissionQueue,

    /// Deployment filesystem layout
    pub layout: DeploymentLayout,
}

impl AppState {
    /// Initialize application state: open the store and prepare the
    /// filesystem layout.
    pub async fn init(
        options: &AppOptions,
        queue: AdmissionQueue,
    ) -> Result<Self, OrchestratorError> {
        info!("Initializing application state...");

        let store = Arc::new(Store::from_path(&options.database_path).await?);

        let layout = DeploymentLayout::new(&options.data_dir);
        layout.setup().await?;

        Ok(Self {
            store,
            queue,
            layout,
        })
    }
}
