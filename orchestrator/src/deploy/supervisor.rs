//! App supervisor
//!
//! Registers the extracted artifact with the pm2 process supervisor under
//! the name `deploy-<id>` and waits for the process to come online.

use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::deploy::logsink::{run_teed, LogSink};
use crate::errors::OrchestratorError;
use crate::filesys::{dir::Dir, file::File};
use crate::store::models::BuildType;
use crate::utils::truncate_end;

/// Supervisor settings
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// How long to wait for the process to reach `online`
    pub readiness_timeout: Duration,

    /// Interval between status polls
    pub poll_interval: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            readiness_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// The supervisor process name for a deployment
pub fn process_name(deployment_id: &str) -> String {
    format!("deploy-{}", deployment_id)
}

/// Registers and monitors application processes via pm2.
#[derive(Debug, Clone)]
pub struct AppSupervisor {
    options: SupervisorOptions,
}

impl AppSupervisor {
    pub fn new(options: SupervisorOptions) -> Self {
        Self { options }
    }

    /// Register the application on `port` and wait for it to come online.
    pub async fn start(
        &self,
        build_output: &Path,
        deployment_id: &str,
        build_type: BuildType,
        port: u16,
        sink: &mut LogSink,
    ) -> Result<(), OrchestratorError> {
        let name = process_name(deployment_id);
        info!("Starting {} on port {} ({:?})", name, port, build_type);

        self.delete_if_exists(&name, sink).await;

        let mut command = Command::new("pm2");
        command
            .current_dir(build_output)
            .env("PORT", port.to_string())
            .env("NODE_ENV", "production");

        match build_type {
            BuildType::Standalone => {
                let entrypoint = File::new(build_output.join("server.js"));
                if !entrypoint.exists().await {
                    return Err(OrchestratorError::SuperviseError(format!(
                        "standalone entrypoint missing at {}",
                        entrypoint.path().display()
                    )));
                }
                command.args(["start", "server.js"]);
            }
            BuildType::Classic => {
                if !File::new(build_output.join("package.json")).exists().await {
                    return Err(OrchestratorError::SuperviseError(
                        "classic start requires package.json in the build output".to_string(),
                    ));
                }
                if !Dir::new(build_output.join(".next")).exists().await {
                    return Err(OrchestratorError::SuperviseError(
                        "classic start requires a .next build directory".to_string(),
                    ));
                }
                command.args(["start", "node_modules/.bin/next"]);
            }
        }

        command.args(["--name", name.as_str(), "--cwd"]).arg(build_output);
        if build_type == BuildType::Classic {
            command.args(["--", "start"]);
        }

        let output = run_teed(command, sink).await?;
        if !output.success() {
            return Err(OrchestratorError::SuperviseError(format!(
                "pm2 start exited with code {}: {}",
                output.exit_code(),
                truncate_end(&output.stderr.tail(), 400)
            )));
        }

        self.await_online(&name).await
    }

    /// Delete a prior registration with the same name.
    ///
    /// A "not found" response counts as success; any other failure is
    /// logged and start proceeds, since the subsequent start would surface
    /// a genuinely stuck registration anyway.
    async fn delete_if_exists(&self, name: &str, sink: &mut LogSink) {
        sink.write_line(&format!("Removing previous process {} (if any)", name))
            .await;

        match Command::new("pm2").args(["delete", name]).output().await {
            Ok(output) if output.status.success() => {
                debug!("Deleted previous supervisor process {}", name);
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.to_lowercase().contains("not found") {
                    warn!("pm2 delete {} failed: {}", name, stderr.trim());
                }
            }
            Err(e) => {
                warn!("pm2 delete {} could not run: {}", name, e);
            }
        }
    }

    /// Poll until the process is `online` or the readiness timeout expires.
    async fn await_online(&self, name: &str) -> Result<(), OrchestratorError> {
        let deadline = tokio::time::Instant::now() + self.options.readiness_timeout;
        let mut last_status = "unknown".to_string();

        loop {
            if let Some(status) = query_status(name).await {
                if status == "online" {
                    info!("Process {} is online", name);
                    return Ok(());
                }
                last_status = status;
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(OrchestratorError::SuperviseError(format!(
                    "process {} did not reach online (last status: {}); see `pm2 logs {}`",
                    name, last_status, name
                )));
            }

            tokio::time::sleep(self.options.poll_interval).await;
        }
    }
}

async fn query_status(name: &str) -> Option<String> {
    let output = Command::new("pm2").arg("jlist").output().await.ok()?;
    if !output.status.success() {
        return None;
    }

    let processes: Vec<Value> = serde_json::from_slice(&output.stdout).ok()?;
    processes
        .iter()
        .find(|p| p.get("name").and_then(Value::as_str) == Some(name))
        .and_then(|p| p.pointer("/pm2_env/status"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_name_format() {
        assert_eq!(process_name("abc-123"), "deploy-abc-123");
    }
}
