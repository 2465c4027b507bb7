//! Error types for the deployment orchestrator

use thiserror::Error;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Project rejected: {0}")]
    PlanError(String),

    #[error("Clone failed: {0}")]
    FetchError(String),

    #[error("Image build failed with exit code {code}: {stderr_tail}")]
    BuildError { code: i32, stderr_tail: String },

    #[error("Artifact extraction failed: {0}")]
    ExtractError(String),

    #[error("No free ports in range {start}-{end}")]
    PortExhausted { start: u16, end: u16 },

    #[error("Supervisor error: {0}")]
    SuperviseError(String),

    #[error("Proxy error: {0}")]
    ProxyError(String),

    #[error("URL minting failed: {0}")]
    MintError(String),

    #[error("State persistence error: {0}")]
    StateError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Whether the supervisor step may be retried with a fresh port.
    pub fn is_retriable_supervise(&self) -> bool {
        matches!(self, OrchestratorError::SuperviseError(_))
    }
}
