//! On-disk layout for deployment working trees

use std::path::PathBuf;

use crate::filesys::dir::Dir;

/// Filesystem layout for deployment workspaces and clone trees.
///
/// Each deployment owns `<deployments_root>/<id>/` (build output and log
/// file) plus a clone tree under `<clones_root>/deployment-<id>-repo/`. The
/// clone tree deliberately lives under the user home so that checkouts do
/// not cross filesystem boundaries with permission quirks.
#[derive(Debug, Clone)]
pub struct DeploymentLayout {
    /// Root directory holding one subdirectory per deployment
    pub deployments_root: PathBuf,

    /// Root directory holding git clone trees
    pub clones_root: PathBuf,
}

impl DeploymentLayout {
    /// Create a new layout rooted at the given data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            deployments_root: data_dir.join("deployments"),
            clones_root: home_dir().join(".code-catalyst-clones"),
        }
    }

    /// Get the directory for a single deployment
    pub fn deployment_dir(&self, deployment_id: &str) -> Dir {
        Dir::new(self.deployments_root.join(deployment_id))
    }

    /// Get the build output directory for a deployment
    pub fn build_output_dir(&self, deployment_id: &str) -> Dir {
        self.deployment_dir(deployment_id).subdir("build-output")
    }

    /// Get the log file path for a deployment
    pub fn log_file(&self, deployment_id: &str) -> PathBuf {
        self.deployment_dir(deployment_id)
            .path()
            .join(format!("deployment-{}.log", deployment_id))
    }

    /// Get the root of the clone tree for a deployment
    pub fn clone_root_dir(&self, deployment_id: &str) -> Dir {
        Dir::new(
            self.clones_root
                .join(format!("deployment-{}-repo", deployment_id)),
        )
    }

    /// Get the repository checkout directory for a deployment
    pub fn clone_repository_dir(&self, deployment_id: &str) -> Dir {
        self.clone_root_dir(deployment_id).subdir("repository")
    }

    /// Setup the layout (create the root directories)
    pub async fn setup(&self) -> Result<(), crate::errors::OrchestratorError> {
        Dir::new(&self.deployments_root).create().await?;
        Dir::new(&self.clones_root).create().await?;
        Ok(())
    }
}

impl Default for DeploymentLayout {
    fn default() -> Self {
        // Use /var/lib/catalyst on Linux, or the user home on other platforms
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/var/lib/catalyst");

        #[cfg(not(target_os = "linux"))]
        let base_dir = home_dir().join(".catalyst");

        Self::new(base_dir)
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = DeploymentLayout::new("/data");
        assert_eq!(
            layout.deployment_dir("d1").path(),
            std::path::Path::new("/data/deployments/d1")
        );
        assert_eq!(
            layout.build_output_dir("d1").path(),
            std::path::Path::new("/data/deployments/d1/build-output")
        );
        assert!(layout
            .log_file("d1")
            .ends_with("deployments/d1/deployment-d1.log"));
        assert!(layout
            .clone_repository_dir("d1")
            .path()
            .ends_with(".code-catalyst-clones/deployment-d1-repo/repository"));
    }
}
