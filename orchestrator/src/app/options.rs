//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::deploy::git::DEFAULT_CLONE_TIMEOUT;
use crate::deploy::pipeline::PipelineOptions;
use crate::deploy::ports::PortRange;
use crate::deploy::proxy::ProxyPaths;
use crate::deploy::supervisor::SupervisorOptions;
use crate::workers::deployer;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Data directory holding deployments and the database
    pub data_dir: PathBuf,

    /// Database file path
    pub database_path: PathBuf,

    /// Platform domain; present and non-empty means production mode
    pub platform_domain: Option<String>,

    /// Enable the admission HTTP server
    pub enable_server: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Deployer worker options
    pub deployer: deployer::Options,

    /// Internal port scan range
    pub port_range: PortRange,

    /// UID owning build output trees
    pub container_uid: u32,

    /// Directory holding the platform default Dockerfiles
    pub default_dockerfiles_dir: PathBuf,

    /// Reverse proxy config directories
    pub proxy: ProxyPaths,

    /// Supervisor readiness settings
    pub supervisor: SupervisorOptions,

    /// Bound on a blocking clone
    pub clone_timeout: Duration,

    /// Extra supervisor start attempts after a failure
    pub supervise_retries: u32,
}

impl Default for AppOptions {
    fn default() -> Self {
        let data_dir = default_data_dir();
        let database_path = data_dir.join("catalyst.db");
        Self {
            lifecycle: LifecycleOptions::default(),
            data_dir,
            database_path,
            platform_domain: None,
            enable_server: true,
            server: ServerOptions::default(),
            deployer: deployer::Options::default(),
            port_range: PortRange::default(),
            container_uid: 1001,
            default_dockerfiles_dir: PathBuf::from("assets"),
            proxy: ProxyPaths::default(),
            supervisor: SupervisorOptions::default(),
            clone_timeout: DEFAULT_CLONE_TIMEOUT,
            supervise_retries: 2,
        }
    }
}

impl AppOptions {
    /// Build options from the recognized environment variables.
    pub fn from_env() -> Self {
        let mut options = Self::default();

        // Unset or empty means development mode.
        options.platform_domain = env_string("YOUR_PLATFORM_URL");

        if let Some(max) = env_parse::<usize>("MAX_CONCURRENT_DEPLOYMENTS") {
            options.deployer.max_concurrent = max;
        }
        if let Some(start) = env_parse::<u16>("DEPLOYMENT_PORT_RANGE_START") {
            options.port_range.start = start;
        }
        if let Some(end) = env_parse::<u16>("DEPLOYMENT_PORT_RANGE_END") {
            options.port_range.end = end;
        }

        if let Some(dir) = env_string("CATALYST_DATA_DIR") {
            options.data_dir = PathBuf::from(&dir);
            options.database_path = options.data_dir.join("catalyst.db");
        }
        if let Some(path) = env_string("CATALYST_DATABASE_PATH") {
            options.database_path = PathBuf::from(path);
        }
        if let Some(dir) = env_string("CATALYST_DOCKERFILES_DIR") {
            options.default_dockerfiles_dir = PathBuf::from(dir);
        }

        options
    }

    /// Derive the pipeline settings from the application options.
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            platform_domain: self.platform_domain.clone(),
            port_range: self.port_range,
            container_uid: self.container_uid,
            clone_timeout: self.clone_timeout,
            supervisor: self.supervisor.clone(),
            default_dockerfiles_dir: self.default_dockerfiles_dir.clone(),
            proxy_paths: self.proxy.clone(),
            supervise_retries: self.supervise_retries,
        }
    }

    /// Whether the orchestrator runs in production mode.
    pub fn is_production(&self) -> bool {
        self.platform_domain
            .as_deref()
            .map(|domain| !domain.is_empty())
            .unwrap_or(false)
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Admission HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7700,
        }
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/lib/catalyst")
    }

    #[cfg(not(target_os = "linux"))]
    {
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".catalyst")
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env_string(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparseable {}={}", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_reads_recognized_variables() {
        std::env::set_var("YOUR_PLATFORM_URL", "nextlivenow.app");
        std::env::set_var("MAX_CONCURRENT_DEPLOYMENTS", "3");
        std::env::set_var("DEPLOYMENT_PORT_RANGE_START", "5001");
        std::env::set_var("DEPLOYMENT_PORT_RANGE_END", "5099");

        let options = AppOptions::from_env();
        assert_eq!(options.platform_domain.as_deref(), Some("nextlivenow.app"));
        assert!(options.is_production());
        assert_eq!(options.deployer.max_concurrent, 3);
        assert_eq!(options.port_range.start, 5001);
        assert_eq!(options.port_range.end, 5099);

        // An empty platform URL counts as development mode.
        std::env::set_var("YOUR_PLATFORM_URL", "");
        let options = AppOptions::from_env();
        assert!(!options.is_production());

        std::env::remove_var("YOUR_PLATFORM_URL");
        std::env::remove_var("MAX_CONCURRENT_DEPLOYMENTS");
        std::env::remove_var("DEPLOYMENT_PORT_RANGE_START");
        std::env::remove_var("DEPLOYMENT_PORT_RANGE_END");
    }
}
