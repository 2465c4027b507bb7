//! Persistent store
//!
//! SQLite-backed store for projects, users, git accounts, and deployments.
//! The orchestrator reads projects and git accounts and is the only writer
//! of deployment rows.

pub mod accounts;
pub mod deployments;
pub mod models;

use std::path::Path;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

use crate::errors::OrchestratorError;

/// SQLite-backed store.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Create a store from an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a store from a database file path.
    ///
    /// Creates parent directories, opens the database in create mode, and
    /// bootstraps the schema with idempotent DDL. Schema migrations proper
    /// are managed by the external facade; the bootstrap exists so the
    /// daemon is self-contained in development.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, OrchestratorError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.bootstrap_schema().await?;

        info!("Store opened at {}", path.display());
        Ok(store)
    }

    /// Create an in-memory store (tests and throwaway environments).
    pub async fn in_memory() -> Result<Self, OrchestratorError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.bootstrap_schema().await?;
        Ok(store)
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn bootstrap_schema(&self) -> Result<(), OrchestratorError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL REFERENCES users (id),
                name TEXT NOT NULL,
                git_repo_url TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS git_accounts (
                user_id TEXT NOT NULL REFERENCES users (id),
                provider TEXT NOT NULL,
                provider_user_id TEXT NOT NULL,
                access_token TEXT NOT NULL,
                PRIMARY KEY (user_id, provider)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS deployments (
                id TEXT PRIMARY KEY,
                project_id INTEGER NOT NULL REFERENCES projects (id),
                status TEXT NOT NULL DEFAULT 'pending',
                version TEXT NOT NULL DEFAULT 'TBD',
                deployment_url TEXT,
                internal_port INTEGER,
                build_output_path TEXT,
                dockerfile_used TEXT NOT NULL DEFAULT 'unknown',
                error_message TEXT,
                log_file_path TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_deployments_url_status
            ON deployments (deployment_url, status)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
