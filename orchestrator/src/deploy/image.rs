//! Image builder
//!
//! Drives the container runtime's `build` verb, teeing all output to the
//! deployment log.

use std::path::Path;

use tokio::process::Command;
use tracing::info;

use crate::deploy::logsink::{run_teed, LogSink};
use crate::errors::OrchestratorError;
use crate::utils::truncate_end;

const STDERR_TAIL_LEN: usize = 400;

/// Build a container image from `context_dir` with the given Dockerfile.
pub async fn build_image(
    context_dir: &Path,
    dockerfile_path: &Path,
    tag: &str,
    build_args: &[(String, String)],
    sink: &mut LogSink,
) -> Result<(), OrchestratorError> {
    info!("Building image {} from {}", tag, dockerfile_path.display());

    let mut command = Command::new("docker");
    command
        .arg("build")
        .arg("-t")
        .arg(tag)
        .arg("-f")
        .arg(dockerfile_path);

    for (key, value) in build_args {
        command.arg("--build-arg").arg(format!("{}={}", key, value));
    }

    command.arg(context_dir);

    let output = run_teed(command, sink).await?;

    if !output.success() {
        return Err(OrchestratorError::BuildError {
            code: output.exit_code(),
            stderr_tail: truncate_end(&output.stderr.tail(), STDERR_TAIL_LEN),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_display_carries_exit_code() {
        let err = OrchestratorError::BuildError {
            code: 2,
            stderr_tail: "npm ERR! missing script: build".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("exit code 2"));
        assert!(message.contains("missing script"));
    }
}
