//! Privileged operations
//!
//! Proxy config writes, symlink installs, reloads, and ownership changes
//! rely on operator-granted elevation. The trait keeps the pipeline pure:
//! production shells out through sudo, tests bind the in-memory fake.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::errors::OrchestratorError;

/// Elevated filesystem and service operations.
///
/// Each method returns the command's combined output so callers can tee it
/// to the deployment log.
#[async_trait]
pub trait PrivilegedOps: Send + Sync {
    /// Write `contents` to a root-owned file.
    async fn write_file(&self, path: &Path, contents: &str) -> Result<String, OrchestratorError>;

    /// Create or replace a symlink at `link` pointing to `target`.
    async fn symlink(&self, target: &Path, link: &Path) -> Result<String, OrchestratorError>;

    /// Recursively change ownership of `path` to `uid`.
    async fn chown_recursive(&self, path: &Path, uid: u32) -> Result<String, OrchestratorError>;

    /// Reload the reverse proxy daemon.
    async fn reload_proxy(&self) -> Result<String, OrchestratorError>;
}

/// Production binding: shells out through sudo.
pub struct SystemPrivilegedOps;

#[async_trait]
impl PrivilegedOps for SystemPrivilegedOps {
    async fn write_file(&self, path: &Path, contents: &str) -> Result<String, OrchestratorError> {
        debug!("Privileged write to {}", path.display());

        // Stage into a sibling temp file, then rename over the target so
        // the proxy never observes a half-written config.
        let staged = path.with_extension("tmp");

        let mut child = Command::new("sudo")
            .arg("tee")
            .arg(&staged)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(contents.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(OrchestratorError::ProxyError(format!(
                "privileged write to {} failed: {}",
                staged.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let output = Command::new("sudo")
            .arg("mv")
            .arg("-f")
            .arg(&staged)
            .arg(path)
            .output()
            .await?;
        if !output.status.success() {
            return Err(OrchestratorError::ProxyError(format!(
                "privileged move to {} failed: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(format!("wrote {}", path.display()))
    }

    async fn symlink(&self, target: &Path, link: &Path) -> Result<String, OrchestratorError> {
        debug!("Privileged symlink {} -> {}", link.display(), target.display());

        let output = Command::new("sudo")
            .arg("ln")
            .arg("-sfn")
            .arg(target)
            .arg(link)
            .output()
            .await?;

        if !output.status.success() {
            return Err(OrchestratorError::ProxyError(format!(
                "symlink {} failed: {}",
                link.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(format!("linked {} -> {}", link.display(), target.display()))
    }

    async fn chown_recursive(&self, path: &Path, uid: u32) -> Result<String, OrchestratorError> {
        debug!("Privileged chown {} to uid {}", path.display(), uid);

        let output = Command::new("sudo")
            .arg("chown")
            .arg("-R")
            .arg(format!("{uid}:{uid}"))
            .arg(path)
            .output()
            .await?;

        if !output.status.success() {
            return Err(OrchestratorError::Internal(format!(
                "chown of {} failed: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(format!("chowned {} to {}", path.display(), uid))
    }

    async fn reload_proxy(&self) -> Result<String, OrchestratorError> {
        debug!("Reloading reverse proxy");

        let output = Command::new("sudo")
            .args(["systemctl", "reload", "nginx"])
            .output()
            .await?;

        if !output.status.success() {
            return Err(OrchestratorError::ProxyError(format!(
                "proxy reload failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok("proxy reloaded".to_string())
    }
}

/// Recorded state of the in-memory fake.
#[derive(Debug, Default)]
pub struct MemoryPrivilegedState {
    pub files: HashMap<PathBuf, String>,
    pub symlinks: HashMap<PathBuf, PathBuf>,
    pub chowns: Vec<(PathBuf, u32)>,
    pub reload_count: usize,
}

/// In-memory binding for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryPrivilegedOps {
    pub state: Mutex<MemoryPrivilegedState>,
}

#[async_trait]
impl PrivilegedOps for MemoryPrivilegedOps {
    async fn write_file(&self, path: &Path, contents: &str) -> Result<String, OrchestratorError> {
        let mut state = self.state.lock().expect("privileged state poisoned");
        state.files.insert(path.to_path_buf(), contents.to_string());
        Ok(format!("wrote {}", path.display()))
    }

    async fn symlink(&self, target: &Path, link: &Path) -> Result<String, OrchestratorError> {
        let mut state = self.state.lock().expect("privileged state poisoned");
        state
            .symlinks
            .insert(link.to_path_buf(), target.to_path_buf());
        Ok(format!("linked {} -> {}", link.display(), target.display()))
    }

    async fn chown_recursive(&self, path: &Path, uid: u32) -> Result<String, OrchestratorError> {
        let mut state = self.state.lock().expect("privileged state poisoned");
        state.chowns.push((path.to_path_buf(), uid));
        Ok(format!("chowned {} to {}", path.display(), uid))
    }

    async fn reload_proxy(&self) -> Result<String, OrchestratorError> {
        let mut state = self.state.lock().expect("privileged state poisoned");
        state.reload_count += 1;
        Ok("proxy reloaded".to_string())
    }
}
