//! Project, user, and git account queries
//!
//! These rows are managed by the external facade; the orchestrator reads
//! them. The create/upsert operations exist for the admission facade and
//! for test setup.

use chrono::Utc;
use uuid::Uuid;

use crate::errors::OrchestratorError;
use crate::store::models::{GitAccountRecord, ProjectRecord, UserRecord};
use crate::store::Store;

impl Store {
    /// Create a user row.
    pub async fn create_user(&self, username: &str) -> Result<UserRecord, OrchestratorError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query("INSERT INTO users (id, username, created_at) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(username)
            .bind(now)
            .execute(self.pool())
            .await?;

        Ok(UserRecord {
            id,
            username: username.to_string(),
            created_at: now,
        })
    }

    /// Create a project row.
    pub async fn create_project(
        &self,
        owner_id: &str,
        name: &str,
        git_repo_url: &str,
    ) -> Result<ProjectRecord, OrchestratorError> {
        let now = Utc::now();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO projects (owner_id, name, git_repo_url, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(owner_id)
        .bind(name)
        .bind(git_repo_url)
        .bind(now)
        .fetch_one(self.pool())
        .await?;

        Ok(ProjectRecord {
            id,
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            git_repo_url: git_repo_url.to_string(),
            created_at: now,
        })
    }

    /// Fetch a project by id.
    pub async fn get_project(&self, id: i64) -> Result<Option<ProjectRecord>, OrchestratorError> {
        let record = sqlx::query_as::<_, ProjectRecord>(
            "SELECT id, owner_id, name, git_repo_url, created_at FROM projects WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(record)
    }

    /// Insert or replace a git account for a user and provider.
    pub async fn upsert_git_account(
        &self,
        user_id: &str,
        provider: &str,
        provider_user_id: &str,
        access_token: &str,
    ) -> Result<(), OrchestratorError> {
        sqlx::query(
            r#"
            INSERT INTO git_accounts (user_id, provider, provider_user_id, access_token)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (user_id, provider) DO UPDATE
            SET provider_user_id = excluded.provider_user_id,
                access_token = excluded.access_token
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .bind(provider_user_id)
        .bind(access_token)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Fetch a user's git account for a provider.
    pub async fn get_git_account(
        &self,
        user_id: &str,
        provider: &str,
    ) -> Result<Option<GitAccountRecord>, OrchestratorError> {
        let record = sqlx::query_as::<_, GitAccountRecord>(
            r#"
            SELECT user_id, provider, provider_user_id, access_token
            FROM git_accounts
            WHERE user_id = ? AND provider = ?
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .fetch_optional(self.pool())
        .await?;

        Ok(record)
    }
}
