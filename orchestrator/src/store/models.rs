//! Persistent store records and deployment status machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deployment status
///
/// Transitions form a DAG: `pending -> deploying -> (success | failed)`.
/// The terminal states sink; no other transitions are permitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    /// Created, waiting for admission
    #[default]
    Pending,

    /// Pipeline in progress
    Deploying,

    /// Built, supervised, and exposed
    Success,

    /// Terminal failure
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
        }
    }

    /// Whether a transition to `next` is permitted by the status DAG
    pub fn can_transition_to(&self, next: DeploymentStatus) -> bool {
        matches!(
            (self, next),
            (DeploymentStatus::Pending, DeploymentStatus::Deploying)
                | (DeploymentStatus::Deploying, DeploymentStatus::Success)
                | (DeploymentStatus::Deploying, DeploymentStatus::Failed)
        )
    }

    /// Whether this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Success | DeploymentStatus::Failed)
    }

    /// Whether a deployment in this status holds its public URL
    ///
    /// Active deployments participate in the URL uniqueness check.
    pub fn is_active(&self) -> bool {
        matches!(self, DeploymentStatus::Deploying | DeploymentStatus::Success)
    }
}

impl std::str::FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeploymentStatus::Pending),
            "deploying" => Ok(DeploymentStatus::Deploying),
            "success" => Ok(DeploymentStatus::Success),
            "failed" => Ok(DeploymentStatus::Failed),
            _ => Err(format!("Invalid deployment status: {}", s)),
        }
    }
}

/// Which Dockerfile the build planner selected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DockerfileSource {
    /// User-provided Dockerfile, framework declares standalone output
    User,

    /// User-provided Dockerfile, standalone output not declared
    UserClassicAssumed,

    /// Platform default for standalone Next.js builds
    DefaultStandalone,

    /// Platform default for classic Next.js builds
    DefaultClassic,

    /// Not yet decided (initial row state)
    #[default]
    Unknown,
}

impl DockerfileSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DockerfileSource::User => "user",
            DockerfileSource::UserClassicAssumed => "user_classic_assumed",
            DockerfileSource::DefaultStandalone => "default_standalone",
            DockerfileSource::DefaultClassic => "default_classic",
            DockerfileSource::Unknown => "unknown",
        }
    }

    /// How the supervisor should start the extracted artifact
    pub fn build_type(&self) -> BuildType {
        match self {
            DockerfileSource::DefaultClassic | DockerfileSource::UserClassicAssumed => {
                BuildType::Classic
            }
            _ => BuildType::Standalone,
        }
    }
}

impl std::str::FromStr for DockerfileSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(DockerfileSource::User),
            "user_classic_assumed" => Ok(DockerfileSource::UserClassicAssumed),
            "default_standalone" => Ok(DockerfileSource::DefaultStandalone),
            "default_classic" => Ok(DockerfileSource::DefaultClassic),
            "unknown" => Ok(DockerfileSource::Unknown),
            _ => Err(format!("Invalid dockerfile source: {}", s)),
        }
    }
}

/// Start strategy for the supervised application process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildType {
    /// Self-contained `server.js` entrypoint, no dependency tree needed
    Standalone,

    /// Framework CLI start, requires `node_modules` at runtime
    Classic,
}

/// Deployment row from the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeploymentRecord {
    /// Unique deployment id, also used as an image tag component
    pub id: String,
    /// Project this deployment belongs to
    pub project_id: i64,
    /// Current status (pending, deploying, success, failed)
    pub status: String,
    /// Commit identifier captured at clone time ("TBD" until captured)
    pub version: String,
    /// Final public URL once assigned
    pub deployment_url: Option<String>,
    /// Internal port assigned when the supervisor start succeeds
    pub internal_port: Option<i64>,
    /// Host filesystem path to the extracted artifacts
    pub build_output_path: Option<String>,
    /// Which Dockerfile was used for the build
    pub dockerfile_used: String,
    /// Failure description, set only when status is failed
    pub error_message: Option<String>,
    /// Path to the append-only deployment log
    pub log_file_path: Option<String>,
    /// When the row was created
    pub created_at: DateTime<Utc>,
    /// When the row was last written
    pub updated_at: DateTime<Utc>,
}

impl DeploymentRecord {
    /// Parsed status; unparseable values read as pending
    pub fn deployment_status(&self) -> DeploymentStatus {
        self.status.parse().unwrap_or_default()
    }

    /// Parsed dockerfile source; unparseable values read as unknown
    pub fn dockerfile_source(&self) -> DockerfileSource {
        self.dockerfile_used.parse().unwrap_or_default()
    }
}

/// Project row: stable identity of a user-owned repository target.
///
/// Created by the external facade; the orchestrator only reads it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectRecord {
    pub id: i64,
    pub owner_id: String,
    pub name: String,
    pub git_repo_url: String,
    pub created_at: DateTime<Utc>,
}

/// User row (read-only input to the orchestrator)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Git provider credentials, read at clone time only
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GitAccountRecord {
    pub user_id: String,
    pub provider: String,
    pub provider_user_id: String,
    pub access_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_dag_forward_edges() {
        assert!(DeploymentStatus::Pending.can_transition_to(DeploymentStatus::Deploying));
        assert!(DeploymentStatus::Deploying.can_transition_to(DeploymentStatus::Success));
        assert!(DeploymentStatus::Deploying.can_transition_to(DeploymentStatus::Failed));
    }

    #[test]
    fn test_status_dag_rejects_everything_else() {
        let all = [
            DeploymentStatus::Pending,
            DeploymentStatus::Deploying,
            DeploymentStatus::Success,
            DeploymentStatus::Failed,
        ];
        let allowed = [
            (DeploymentStatus::Pending, DeploymentStatus::Deploying),
            (DeploymentStatus::Deploying, DeploymentStatus::Success),
            (DeploymentStatus::Deploying, DeploymentStatus::Failed),
        ];
        for from in all {
            for to in all {
                let expected = allowed.contains(&(from, to));
                assert_eq!(from.can_transition_to(to), expected, "{:?} -> {:?}", from, to);
            }
        }
    }

    #[test]
    fn test_terminal_states_sink() {
        assert!(DeploymentStatus::Success.is_terminal());
        assert!(DeploymentStatus::Failed.is_terminal());
        assert!(!DeploymentStatus::Pending.is_terminal());
        assert!(!DeploymentStatus::Deploying.is_terminal());
    }

    #[test]
    fn test_active_states_hold_urls() {
        assert!(DeploymentStatus::Deploying.is_active());
        assert!(DeploymentStatus::Success.is_active());
        assert!(!DeploymentStatus::Pending.is_active());
        assert!(!DeploymentStatus::Failed.is_active());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            DeploymentStatus::Pending,
            DeploymentStatus::Deploying,
            DeploymentStatus::Success,
            DeploymentStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<DeploymentStatus>(), Ok(status));
        }
        assert!("bogus".parse::<DeploymentStatus>().is_err());
    }

    #[test]
    fn test_build_type_mapping() {
        assert_eq!(DockerfileSource::DefaultClassic.build_type(), BuildType::Classic);
        assert_eq!(
            DockerfileSource::UserClassicAssumed.build_type(),
            BuildType::Classic
        );
        assert_eq!(DockerfileSource::User.build_type(), BuildType::Standalone);
        assert_eq!(
            DockerfileSource::DefaultStandalone.build_type(),
            BuildType::Standalone
        );
        assert_eq!(DockerfileSource::Unknown.build_type(), BuildType::Standalone);
    }

    #[test]
    fn test_dockerfile_source_round_trip() {
        for source in [
            DockerfileSource::User,
            DockerfileSource::UserClassicAssumed,
            DockerfileSource::DefaultStandalone,
            DockerfileSource::DefaultClassic,
            DockerfileSource::Unknown,
        ] {
            assert_eq!(source.as_str().parse::<DockerfileSource>(), Ok(source));
        }
    }
}
