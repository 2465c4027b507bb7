//! Deployment state machine
//!
//! Drives a single deployment through clone, plan, build, extract, start,
//! and expose, persisting every status transition. This is the single
//! authority that maps component failures onto the terminal `failed` state.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::deploy::extract::extract_artifacts;
use crate::deploy::git::{FetchOutcome, GitFetcher, DEFAULT_CLONE_TIMEOUT};
use crate::deploy::image::build_image;
use crate::deploy::logsink::LogSink;
use crate::deploy::planner::{BuildPlan, BuildPlanner};
use crate::deploy::ports::{PortAllocator, PortRange};
use crate::deploy::privileged::PrivilegedOps;
use crate::deploy::proxy::{ProxyConfigurator, ProxyPaths};
use crate::deploy::supervisor::{AppSupervisor, SupervisorOptions};
use crate::deploy::url::UrlMinter;
use crate::errors::OrchestratorError;
use crate::filesys::dir::Dir;
use crate::filesys::layout::DeploymentLayout;
use crate::store::models::{DeploymentRecord, DeploymentStatus, DockerfileSource};
use crate::store::Store;

const SECTION_WORKSPACE: &str = "Workspace Setup";
const SECTION_CLONE: &str = "Repository Clone";
const SECTION_PLAN: &str = "Build Planning";
const SECTION_BUILD: &str = "Image Build";
const SECTION_EXTRACT: &str = "Artifact Extraction";
const SECTION_START: &str = "Application Start";
const SECTION_PROXY: &str = "Proxy Configuration";

/// Pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Platform domain; present and non-empty means production mode
    pub platform_domain: Option<String>,

    /// Internal port scan range
    pub port_range: PortRange,

    /// UID owning build output trees (the container's runtime user)
    pub container_uid: u32,

    /// Bound on a blocking clone
    pub clone_timeout: Duration,

    /// Supervisor readiness settings
    pub supervisor: SupervisorOptions,

    /// Directory holding the platform default Dockerfiles
    pub default_dockerfiles_dir: PathBuf,

    /// Reverse proxy config directories
    pub proxy_paths: ProxyPaths,

    /// Extra supervisor start attempts after a failure
    pub supervise_retries: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            platform_domain: None,
            port_range: PortRange::default(),
            container_uid: 1001,
            clone_timeout: DEFAULT_CLONE_TIMEOUT,
            supervisor: SupervisorOptions::default(),
            default_dockerfiles_dir: PathBuf::from("assets"),
            proxy_paths: ProxyPaths::default(),
            supervise_retries: 2,
        }
    }
}

/// How far a failed deployment got, for compensating cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Progress {
    Admitted,
    Cloned,
    Built,
    Extracted,
    Started,
    Proxied,
}

struct SuccessOutcome {
    deployment_url: String,
    internal_port: u16,
    build_output_path: String,
    dockerfile_used: DockerfileSource,
}

/// Drives deployments end to end.
pub struct DeploymentPipeline {
    store: Arc<Store>,
    layout: DeploymentLayout,
    options: PipelineOptions,
    privileged: Arc<dyn PrivilegedOps>,
    fetcher: GitFetcher,
    planner: BuildPlanner,
    supervisor: AppSupervisor,
    minter: UrlMinter,
    proxy: ProxyConfigurator,
}

impl DeploymentPipeline {
    pub fn new(
        store: Arc<Store>,
        layout: DeploymentLayout,
        options: PipelineOptions,
        privileged: Arc<dyn PrivilegedOps>,
    ) -> Self {
        let fetcher = GitFetcher::new(store.clone(), layout.clone(), options.clone_timeout);
        let planner = BuildPlanner::new(options.default_dockerfiles_dir.clone());
        let supervisor = AppSupervisor::new(options.supervisor.clone());
        let minter = UrlMinter::new(store.clone());
        let proxy = ProxyConfigurator::new(options.proxy_paths.clone(), privileged.clone());

        Self {
            store,
            layout,
            options,
            privileged,
            fetcher,
            planner,
            supervisor,
            minter,
            proxy,
        }
    }

    /// Run one deployment to a terminal state.
    ///
    /// A deployment that is already terminal is skipped without touching its
    /// row; one that is currently deploying is left to its owning worker.
    pub async fn deploy(&self, deployment_id: &str) -> Result<(), OrchestratorError> {
        let record = self
            .store
            .get_deployment(deployment_id)
            .await?
            .ok_or_else(|| {
                OrchestratorError::NotFound(format!("deployment {}", deployment_id))
            })?;

        match record.deployment_status() {
            DeploymentStatus::Pending => {}
            DeploymentStatus::Deploying => {
                warn!("Deployment {} is already in flight, skipping", deployment_id);
                return Ok(());
            }
            status => {
                info!(
                    "Deployment {} is already {}, skipping",
                    deployment_id,
                    status.as_str()
                );
                return Ok(());
            }
        }

        let log_path = self.layout.log_file(deployment_id);

        // The guarded pending->deploying update doubles as the admission
        // lock: exactly one worker wins it.
        if let Err(e) = self
            .store
            .mark_deploying(deployment_id, &log_path.to_string_lossy())
            .await
        {
            info!("Deployment {} lost admission: {}", deployment_id, e);
            return Ok(());
        }

        info!("Deployment {} entering pipeline", deployment_id);

        match self.run_steps(&record, &log_path).await {
            Ok(outcome) => {
                if let Err(e) = self
                    .store
                    .mark_success(
                        deployment_id,
                        &outcome.deployment_url,
                        outcome.internal_port,
                        &outcome.build_output_path,
                        outcome.dockerfile_used,
                    )
                    .await
                {
                    error!(
                        "FATAL: deployment {} finished but its success could not be persisted; \
                         operator reconciliation required: {}",
                        deployment_id, e
                    );
                    return Err(e);
                }

                info!(
                    "Deployment {} succeeded at {}",
                    deployment_id, outcome.deployment_url
                );
                Ok(())
            }
            Err((progress, err)) => {
                error!("Deployment {} failed: {}", deployment_id, err);

                let mut sink = LogSink::open(&log_path).await;
                sink.write_line(&format!("Deployment failed: {}", err)).await;
                sink.close().await;

                if let Err(db_err) = self.store.mark_failed(deployment_id, &err.to_string()).await
                {
                    error!(
                        "FATAL: deployment {} failed and the failure could not be persisted; \
                         operator reconciliation required: {}",
                        deployment_id, db_err
                    );
                }

                self.cleanup_after_failure(deployment_id, progress);
                Err(err)
            }
        }
    }

    async fn run_steps(
        &self,
        record: &DeploymentRecord,
        log_path: &Path,
    ) -> Result<SuccessOutcome, (Progress, OrchestratorError)> {
        let id = record.id.as_str();
        let mut progress = Progress::Admitted;

        // Workspace preparation
        let build_output = self.layout.build_output_dir(id);
        {
            let mut sink = LogSink::open(log_path).await;
            sink.section_started(SECTION_WORKSPACE).await;
            let result = self.prepare_workspace(&build_output, &mut sink).await;
            close_section(sink, SECTION_WORKSPACE, result.is_ok()).await;
            result.map_err(|e| (progress, e))?;
        }

        let project = self
            .store
            .get_project(record.project_id)
            .await
            .map_err(|e| (progress, e))?
            .ok_or_else(|| {
                (
                    progress,
                    OrchestratorError::StateError(format!(
                        "project {} not found for deployment {}",
                        record.project_id, id
                    )),
                )
            })?;

        // Clone
        let fetch: FetchOutcome = {
            let mut sink = LogSink::open(log_path).await;
            sink.section_started(SECTION_CLONE).await;
            let result = self
                .fetcher
                .fetch(&project.git_repo_url, id, &project.owner_id, &mut sink)
                .await;
            close_section(sink, SECTION_CLONE, result.is_ok()).await;
            result.map_err(|e| (progress, e))?
        };
        progress = Progress::Cloned;

        if let Some(commit) = &fetch.commit {
            if let Err(e) = self.store.set_version(id, commit).await {
                warn!("Could not record version for deployment {}: {}", id, e);
            }
        }

        // Build planning
        let plan: BuildPlan = {
            let mut sink = LogSink::open(log_path).await;
            sink.section_started(SECTION_PLAN).await;
            let result = self.planner.plan(&fetch.repo_dir).await;
            if let Ok(plan) = &result {
                sink.write_line(&format!(
                    "Selected {} ({})",
                    plan.dockerfile_path.display(),
                    plan.source.as_str()
                ))
                .await;
            }
            close_section(sink, SECTION_PLAN, result.is_ok()).await;
            result.map_err(|e| (progress, e))?
        };

        if let Err(e) = self.store.set_dockerfile_used(id, plan.source).await {
            warn!("Could not record dockerfile source for {}: {}", id, e);
        }

        // Image build
        let tag = image_tag(id);
        {
            let mut sink = LogSink::open(log_path).await;
            sink.section_started(SECTION_BUILD).await;
            let result = build_image(&fetch.repo_dir, &plan.dockerfile_path, &tag, &[], &mut sink)
                .await;
            close_section(sink, SECTION_BUILD, result.is_ok()).await;
            result.map_err(|e| (progress, e))?;
        }
        progress = Progress::Built;

        // Artifact extraction
        {
            let mut sink = LogSink::open(log_path).await;
            sink.section_started(SECTION_EXTRACT).await;
            let result = extract_artifacts(&tag, build_output.path(), &mut sink).await;
            close_section(sink, SECTION_EXTRACT, result.is_ok()).await;
            result.map_err(|e| (progress, e))?;
        }
        progress = Progress::Extracted;

        // The clone tree has served its purpose once artifacts exist.
        if let Err(e) = self.layout.clone_root_dir(id).delete().await {
            warn!("Could not remove clone tree for {}: {}", id, e);
        }

        // Application start, with port re-allocation on supervisor failure
        let build_type = plan.source.build_type();
        let allocator = PortAllocator::new(self.options.port_range);
        let mut attempt: u32 = 0;
        let port = loop {
            let port = allocator.allocate().await.map_err(|e| (progress, e))?;

            let mut sink = LogSink::open(log_path).await;
            sink.section_started(SECTION_START).await;
            let result = self
                .supervisor
                .start(build_output.path(), id, build_type, port, &mut sink)
                .await;
            close_section(sink, SECTION_START, result.is_ok()).await;

            match result {
                Ok(()) => break port,
                Err(e)
                    if e.is_retriable_supervise()
                        && attempt < self.options.supervise_retries =>
                {
                    attempt += 1;
                    warn!(
                        "Supervisor start for {} failed (attempt {}), retrying with a fresh \
                         port: {}",
                        id, attempt, e
                    );
                }
                Err(e) => return Err((progress, e)),
            }
        };
        progress = Progress::Started;

        // Public exposure
        let build_output_path = build_output.path().display().to_string();
        let deployment_url = match self.platform_domain() {
            Some(domain) => {
                let url = self
                    .minter
                    .mint(&project.name, domain, id)
                    .await
                    .map_err(|e| (progress, e))?;

                // Persist while still deploying so concurrent minters see it.
                self.store
                    .set_deployment_url(id, &url)
                    .await
                    .map_err(|e| (progress, e))?;

                let mut sink = LogSink::open(log_path).await;
                sink.section_started(SECTION_PROXY).await;
                let result = self
                    .proxy
                    .configure(&url, port, id, &build_output_path, true, &mut sink)
                    .await;
                close_section(sink, SECTION_PROXY, result.is_ok()).await;
                result.map_err(|e| (progress, e))?;

                progress = Progress::Proxied;
                url
            }
            None => format!("http://localhost:{}", port),
        };

        tracing::debug!("Deployment {} pipeline complete ({:?})", id, progress);

        Ok(SuccessOutcome {
            deployment_url,
            internal_port: port,
            build_output_path,
            dockerfile_used: plan.source,
        })
    }

    async fn prepare_workspace(
        &self,
        build_output: &Dir,
        sink: &mut LogSink,
    ) -> Result<(), OrchestratorError> {
        build_output.create().await?;

        let out = self
            .privileged
            .chown_recursive(build_output.path(), self.options.container_uid)
            .await?;
        sink.write_line(&out).await;

        Ok(())
    }

    fn platform_domain(&self) -> Option<&str> {
        self.options
            .platform_domain
            .as_deref()
            .filter(|domain| !domain.is_empty())
    }

    /// Fire-and-forget compensation after a failure.
    ///
    /// Compensations run in reverse order of the progress reached. The log
    /// file is owned by the sink and deliberately survives.
    fn cleanup_after_failure(&self, deployment_id: &str, progress: Progress) {
        let layout = self.layout.clone();
        let id = deployment_id.to_string();

        // An installed proxy config stays in place; the next successful
        // deployment for the project supersedes it at the proxy layer.
        tokio::spawn(async move {
            if progress >= Progress::Started {
                // TODO: deregister the supervised process `deploy-<id>` once
                // a garbage collection policy for orphaned processes exists.
            }
            if progress >= Progress::Built {
                // TODO: remove the built image `deploy-<id>` once an image
                // retention policy exists.
            }

            if let Err(e) = layout.build_output_dir(&id).delete().await {
                warn!("Cleanup: could not remove build output for {}: {}", id, e);
            }
            if let Err(e) = layout.clone_root_dir(&id).delete().await {
                warn!("Cleanup: could not remove clone tree for {}: {}", id, e);
            }
        });
    }
}

fn image_tag(deployment_id: &str) -> String {
    format!("deploy-{}", deployment_id)
}

async fn close_section(mut sink: LogSink, section: &str, ok: bool) {
    if ok {
        sink.section_finished(section).await;
    } else {
        sink.section_failed(section).await;
    }
    sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_tag_uses_deployment_id() {
        assert_eq!(image_tag("42"), "deploy-42");
    }

    #[test]
    fn test_progress_ordering_for_compensation() {
        assert!(Progress::Proxied > Progress::Started);
        assert!(Progress::Started > Progress::Extracted);
        assert!(Progress::Extracted > Progress::Built);
        assert!(Progress::Built > Progress::Cloned);
        assert!(Progress::Cloned > Progress::Admitted);
    }
}
