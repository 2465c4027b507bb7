//! Artifact extractor
//!
//! Runs the freshly built image once with a bind mount and copies the
//! conventional `/app` tree onto the host. The copy script degrades through
//! progressively weaker copy modes and always exits zero, so permission
//! quirks on foreign filesystems cannot abort the pipeline; success is
//! confirmed by a sentinel on stdout.

use std::path::Path;

use tokio::fs;
use tokio::process::Command;
use tracing::{info, warn};

use crate::deploy::logsink::{run_teed, LogSink};
use crate::errors::OrchestratorError;
use crate::utils::truncate_end;

/// Emitted by the copy script after the first copy branch that succeeds.
pub const COPY_SENTINEL: &str = "build artifacts copied";

const CONTAINER_MOUNT: &str = "/output";

fn copy_script() -> String {
    format!(
        "mkdir -p {mount} && \
         ((cp -rv /app/. {mount}/ && echo '{sentinel} (verbose)') || \
          (cp -a /app/. {mount}/ && echo '{sentinel} (archive)') || \
          (cp -r /app/. {mount}/ && echo '{sentinel} (plain)')); \
         exit 0",
        mount = CONTAINER_MOUNT,
        sentinel = COPY_SENTINEL
    )
}

/// Copy the image's `/app` contents into `host_dir`.
pub async fn extract_artifacts(
    image_tag: &str,
    host_dir: &Path,
    sink: &mut LogSink,
) -> Result<(), OrchestratorError> {
    info!("Extracting artifacts from {} to {}", image_tag, host_dir.display());

    fs::create_dir_all(host_dir).await?;

    let mut command = Command::new("docker");
    command
        .arg("run")
        .arg("--rm")
        .arg("-v")
        .arg(format!("{}:{}", host_dir.display(), CONTAINER_MOUNT))
        .arg(image_tag)
        .arg("sh")
        .arg("-c")
        .arg(copy_script());

    let output = run_teed(command, sink).await?;

    // The script swallows copy failures; a non-zero exit means the runtime
    // itself could not execute the container.
    if !output.success() {
        return Err(OrchestratorError::ExtractError(format!(
            "container runtime exited with code {}: {}",
            output.exit_code(),
            truncate_end(&output.stderr.tail(), 400)
        )));
    }

    if !output.stdout.contains(COPY_SENTINEL) {
        warn!(
            "Artifact copy sentinel missing for {}; extracted tree may be incomplete",
            image_tag
        );
        sink.write_line("Warning: artifact copy did not confirm completion")
            .await;
    }

    Ok(())
}
