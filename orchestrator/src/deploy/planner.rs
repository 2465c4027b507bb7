//! Build planner
//!
//! Decides which Dockerfile is passed to the image builder and rejects
//! projects with no viable shape before any build time is spent.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use crate::errors::OrchestratorError;
use crate::filesys::file::File;
use crate::store::models::DockerfileSource;

const NEXT_CONFIG_CANDIDATES: &[&str] = &["next.config.js", "next.config.mjs", "next.config.ts"];

const STANDALONE_DOCKERFILE: &str = "Dockerfile.standalone";
const CLASSIC_DOCKERFILE: &str = "Dockerfile.classic";

/// The planner's decision
#[derive(Debug, Clone)]
pub struct BuildPlan {
    /// Dockerfile handed to the image builder
    pub dockerfile_path: PathBuf,

    /// How the Dockerfile was selected
    pub source: DockerfileSource,
}

/// Selects a Dockerfile for a cloned project.
pub struct BuildPlanner {
    default_dockerfiles_dir: PathBuf,
}

impl BuildPlanner {
    pub fn new(default_dockerfiles_dir: impl Into<PathBuf>) -> Self {
        Self {
            default_dockerfiles_dir: default_dockerfiles_dir.into(),
        }
    }

    /// Decide the build plan for the repository at `repo_dir`.
    ///
    /// A user Dockerfile always wins. Without one, a detected Next.js
    /// project gets one of the platform defaults depending on whether the
    /// config declares standalone output. Anything else is rejected with a
    /// user-actionable error.
    pub async fn plan(&self, repo_dir: &Path) -> Result<BuildPlan, OrchestratorError> {
        let user_dockerfile = repo_dir.join("Dockerfile");
        let has_user_dockerfile = File::new(&user_dockerfile).exists().await;

        let config_path = find_next_config(repo_dir).await;
        let framework_detected =
            config_path.is_some() || package_json_declares_next(repo_dir).await;

        let standalone = match &config_path {
            Some(path) => match File::new(path).read_string().await {
                Ok(source) => declares_standalone_output(&source),
                Err(e) => {
                    debug!("Could not read {}: {}", path.display(), e);
                    false
                }
            },
            None => false,
        };

        if has_user_dockerfile {
            // The user's Dockerfile drives the build; the framework hint
            // only guides the supervisor's start strategy.
            let source = if framework_detected && !standalone {
                DockerfileSource::UserClassicAssumed
            } else {
                DockerfileSource::User
            };
            info!("Using user Dockerfile ({})", source.as_str());
            return Ok(BuildPlan {
                dockerfile_path: user_dockerfile,
                source,
            });
        }

        if framework_detected {
            let (name, source) = if standalone {
                (STANDALONE_DOCKERFILE, DockerfileSource::DefaultStandalone)
            } else {
                (CLASSIC_DOCKERFILE, DockerfileSource::DefaultClassic)
            };

            let dockerfile_path = self.default_dockerfiles_dir.join(name);
            if !File::new(&dockerfile_path).exists().await {
                return Err(OrchestratorError::ConfigError(format!(
                    "default Dockerfile missing at {}",
                    dockerfile_path.display()
                )));
            }

            info!("Using platform default {} ({})", name, source.as_str());
            return Ok(BuildPlan {
                dockerfile_path,
                source,
            });
        }

        Err(OrchestratorError::PlanError(
            "No Dockerfile found at the repository root and no supported framework detected. \
             Add a Dockerfile to deploy this project."
                .to_string(),
        ))
    }
}

async fn find_next_config(repo_dir: &Path) -> Option<PathBuf> {
    for name in NEXT_CONFIG_CANDIDATES {
        let candidate = repo_dir.join(name);
        if File::new(&candidate).exists().await {
            return Some(candidate);
        }
    }
    None
}

async fn package_json_declares_next(repo_dir: &Path) -> bool {
    let package_json = File::new(repo_dir.join("package.json"));
    if !package_json.exists().await {
        return false;
    }

    let manifest: Value = match package_json.read_json().await {
        Ok(value) => value,
        Err(e) => {
            debug!("Unparseable package.json: {}", e);
            return false;
        }
    };

    ["dependencies", "devDependencies"].iter().any(|section| {
        manifest
            .get(section)
            .and_then(|deps| deps.get("next"))
            .is_some()
    })
}

/// Whether a Next.js config source declares `output: "standalone"`.
///
/// Case-insensitive, tolerant of whitespace and of double quotes, single
/// quotes, or backticks around the literal.
pub(crate) fn declares_standalone_output(config_source: &str) -> bool {
    let normalized: String = config_source
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    ["output:\"standalone\"", "output:'standalone'", "output:`standalone`"]
        .iter()
        .any(|pattern| normalized.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write(dir: &Path, name: &str, contents: &str) {
        File::new(dir.join(name)).write_string(contents).await.unwrap();
    }

    fn planner_with_defaults(dir: &Path) -> BuildPlanner {
        // The defaults directory doubles as scratch space for the assets.
        BuildPlanner::new(dir.join("defaults"))
    }

    async fn write_default_dockerfiles(dir: &Path) {
        write(&dir.join("defaults"), STANDALONE_DOCKERFILE, "FROM node").await;
        write(&dir.join("defaults"), CLASSIC_DOCKERFILE, "FROM node").await;
    }

    #[test]
    fn test_standalone_detection_quote_styles() {
        assert!(declares_standalone_output("output: \"standalone\""));
        assert!(declares_standalone_output("output: 'standalone'"));
        assert!(declares_standalone_output("output: `standalone`"));
        assert!(declares_standalone_output("OUTPUT:   \"STANDALONE\""));
        assert!(!declares_standalone_output("output: \"export\""));
        assert!(!declares_standalone_output("// output: nothing here"));
    }

    #[tokio::test]
    async fn test_user_dockerfile_without_framework() {
        let tmp = tempfile::tempdir().unwrap();
        write_default_dockerfiles(tmp.path()).await;
        write(tmp.path(), "Dockerfile", "FROM scratch").await;

        let plan = planner_with_defaults(tmp.path()).plan(tmp.path()).await.unwrap();
        assert_eq!(plan.source, DockerfileSource::User);
        assert!(plan.dockerfile_path.ends_with("Dockerfile"));
    }

    #[tokio::test]
    async fn test_user_dockerfile_with_classic_next_config() {
        let tmp = tempfile::tempdir().unwrap();
        write_default_dockerfiles(tmp.path()).await;
        write(tmp.path(), "Dockerfile", "FROM scratch").await;
        write(tmp.path(), "next.config.js", "module.exports = {}").await;

        let plan = planner_with_defaults(tmp.path()).plan(tmp.path()).await.unwrap();
        assert_eq!(plan.source, DockerfileSource::UserClassicAssumed);
        assert!(plan.dockerfile_path.ends_with("Dockerfile"));
    }

    #[tokio::test]
    async fn test_user_dockerfile_with_standalone_next_config() {
        let tmp = tempfile::tempdir().unwrap();
        write_default_dockerfiles(tmp.path()).await;
        write(tmp.path(), "Dockerfile", "FROM scratch").await;
        write(
            tmp.path(),
            "next.config.js",
            "module.exports = { output: \"standalone\" }",
        )
        .await;

        let plan = planner_with_defaults(tmp.path()).plan(tmp.path()).await.unwrap();
        assert_eq!(plan.source, DockerfileSource::User);
    }

    #[tokio::test]
    async fn test_default_standalone_selected() {
        let tmp = tempfile::tempdir().unwrap();
        write_default_dockerfiles(tmp.path()).await;
        write(
            tmp.path(),
            "next.config.mjs",
            "export default { output: 'standalone' }",
        )
        .await;

        let plan = planner_with_defaults(tmp.path()).plan(tmp.path()).await.unwrap();
        assert_eq!(plan.source, DockerfileSource::DefaultStandalone);
        assert!(plan.dockerfile_path.ends_with(STANDALONE_DOCKERFILE));
    }

    #[tokio::test]
    async fn test_default_classic_selected() {
        let tmp = tempfile::tempdir().unwrap();
        write_default_dockerfiles(tmp.path()).await;
        write(tmp.path(), "next.config.js", "module.exports = {}").await;

        let plan = planner_with_defaults(tmp.path()).plan(tmp.path()).await.unwrap();
        assert_eq!(plan.source, DockerfileSource::DefaultClassic);
        assert!(plan.dockerfile_path.ends_with(CLASSIC_DOCKERFILE));
    }

    #[tokio::test]
    async fn test_framework_detected_via_package_json() {
        let tmp = tempfile::tempdir().unwrap();
        write_default_dockerfiles(tmp.path()).await;
        write(
            tmp.path(),
            "package.json",
            r#"{ "dependencies": { "next": "14.0.0" } }"#,
        )
        .await;

        let plan = planner_with_defaults(tmp.path()).plan(tmp.path()).await.unwrap();
        assert_eq!(plan.source, DockerfileSource::DefaultClassic);
    }

    #[tokio::test]
    async fn test_no_dockerfile_no_framework_is_user_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_default_dockerfiles(tmp.path()).await;
        write(tmp.path(), "index.py", "print('hi')").await;

        let err = planner_with_defaults(tmp.path()).plan(tmp.path()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::PlanError(_)));
        assert!(err.to_string().contains("No Dockerfile"));
    }

    #[tokio::test]
    async fn test_missing_default_dockerfile_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        // Deliberately no defaults written
        write(tmp.path(), "next.config.js", "module.exports = {}").await;

        let err = planner_with_defaults(tmp.path()).plan(tmp.path()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ConfigError(_)));
    }
}
