//! Deployment row operations
//!
//! All status writes go through here so the status DAG is enforced in one
//! place. Transition updates are guarded with a `WHERE status = ...` clause;
//! zero affected rows means the transition was not permitted.

use chrono::Utc;
use uuid::Uuid;

use crate::errors::OrchestratorError;
use crate::store::models::{DeploymentRecord, DockerfileSource};
use crate::store::Store;
use crate::utils::{truncate_end, MAX_ERROR_MESSAGE_LEN};

impl Store {
    /// Create a deployment row in `pending` state.
    pub async fn create_deployment(
        &self,
        project_id: i64,
    ) -> Result<DeploymentRecord, OrchestratorError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO deployments (id, project_id, status, version, dockerfile_used, created_at, updated_at)
            VALUES (?, ?, 'pending', 'TBD', 'unknown', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(project_id)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_deployment(&id).await?.ok_or_else(|| {
            OrchestratorError::StateError(format!("deployment {} vanished after insert", id))
        })
    }

    /// Fetch a deployment row by id.
    pub async fn get_deployment(
        &self,
        id: &str,
    ) -> Result<Option<DeploymentRecord>, OrchestratorError> {
        let record = sqlx::query_as::<_, DeploymentRecord>(
            r#"
            SELECT id, project_id, status, version, deployment_url, internal_port,
                   build_output_path, dockerfile_used, error_message, log_file_path,
                   created_at, updated_at
            FROM deployments
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(record)
    }

    /// Transition `pending -> deploying`, stamping the log file path.
    ///
    /// The log file path is assigned here, before the row first leaves
    /// `pending`, and is never changed afterwards.
    pub async fn mark_deploying(
        &self,
        id: &str,
        log_file_path: &str,
    ) -> Result<(), OrchestratorError> {
        let result = sqlx::query(
            r#"
            UPDATE deployments
            SET status = 'deploying', log_file_path = ?, updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(log_file_path)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::StateError(format!(
                "deployment {} is not pending",
                id
            )));
        }
        Ok(())
    }

    /// Transition `deploying -> failed` with an end-trimmed error message.
    pub async fn mark_failed(
        &self,
        id: &str,
        error_message: &str,
    ) -> Result<(), OrchestratorError> {
        let message = truncate_end(error_message, MAX_ERROR_MESSAGE_LEN);
        let result = sqlx::query(
            r#"
            UPDATE deployments
            SET status = 'failed', error_message = ?, updated_at = ?
            WHERE id = ? AND status = 'deploying'
            "#,
        )
        .bind(&message)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::StateError(format!(
                "deployment {} is not deploying",
                id
            )));
        }
        Ok(())
    }

    /// Transition `deploying -> success` with the terminal field set.
    pub async fn mark_success(
        &self,
        id: &str,
        deployment_url: &str,
        internal_port: u16,
        build_output_path: &str,
        dockerfile_used: DockerfileSource,
    ) -> Result<(), OrchestratorError> {
        let result = sqlx::query(
            r#"
            UPDATE deployments
            SET status = 'success', deployment_url = ?, internal_port = ?,
                build_output_path = ?, dockerfile_used = ?, error_message = NULL,
                updated_at = ?
            WHERE id = ? AND status = 'deploying'
            "#,
        )
        .bind(deployment_url)
        .bind(internal_port as i64)
        .bind(build_output_path)
        .bind(dockerfile_used.as_str())
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::StateError(format!(
                "deployment {} is not deploying",
                id
            )));
        }
        Ok(())
    }

    /// Record the commit hash captured at clone time.
    pub async fn set_version(&self, id: &str, version: &str) -> Result<(), OrchestratorError> {
        sqlx::query("UPDATE deployments SET version = ?, updated_at = ? WHERE id = ?")
            .bind(version)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Record the planner's Dockerfile decision.
    pub async fn set_dockerfile_used(
        &self,
        id: &str,
        source: DockerfileSource,
    ) -> Result<(), OrchestratorError> {
        sqlx::query("UPDATE deployments SET dockerfile_used = ?, updated_at = ? WHERE id = ?")
            .bind(source.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Record the minted public URL while the deployment is in flight.
    ///
    /// Persisting the URL at mint time makes it visible to concurrent
    /// collision checks while the row is still `deploying`.
    pub async fn set_deployment_url(
        &self,
        id: &str,
        deployment_url: &str,
    ) -> Result<(), OrchestratorError> {
        sqlx::query("UPDATE deployments SET deployment_url = ?, updated_at = ? WHERE id = ?")
            .bind(deployment_url)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Count active deployments (deploying or success) holding the given URL.
    pub async fn count_active_by_url(&self, url: &str) -> Result<i64, OrchestratorError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM deployments
            WHERE deployment_url = ? AND status IN ('deploying', 'success')
            "#,
        )
        .bind(url)
        .fetch_one(self.pool())
        .await?;

        Ok(count)
    }
}
