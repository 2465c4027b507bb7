//! Pipeline unit tests
//!
//! These exercise the state machine against the in-memory store and the
//! in-memory privileged fake. Paths that would need a container runtime are
//! covered up to the step that fails, which is enough to verify admission,
//! status transitions, failure recording, and log framing.

use std::sync::Arc;
use std::time::Duration;

use catalystd::deploy::pipeline::{DeploymentPipeline, PipelineOptions};
use catalystd::deploy::privileged::MemoryPrivilegedOps;
use catalystd::filesys::layout::DeploymentLayout;
use catalystd::store::models::DeploymentStatus;
use catalystd::store::Store;

struct Harness {
    store: Arc<Store>,
    pipeline: DeploymentPipeline,
    privileged: Arc<MemoryPrivilegedOps>,
    layout: DeploymentLayout,
    _data_dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    let data_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::in_memory().await.unwrap());
    let layout = DeploymentLayout::new(data_dir.path());
    let privileged = Arc::new(MemoryPrivilegedOps::default());

    let options = PipelineOptions {
        clone_timeout: Duration::from_secs(10),
        ..Default::default()
    };

    let pipeline = DeploymentPipeline::new(
        store.clone(),
        layout.clone(),
        options,
        privileged.clone(),
    );

    Harness {
        store,
        pipeline,
        privileged,
        layout,
        _data_dir: data_dir,
    }
}

async fn seeded_deployment(store: &Store, repo_url: &str) -> String {
    let user = store.create_user("alice").await.unwrap();
    let project = store
        .create_project(&user.id, "widgets", repo_url)
        .await
        .unwrap();
    store.create_deployment(project.id).await.unwrap().id
}

#[tokio::test]
async fn test_unknown_deployment_is_an_error() {
    let h = harness().await;
    let err = h.pipeline.deploy("no-such-id").await.unwrap_err();
    assert!(err.to_string().contains("Not found"));
}

#[tokio::test]
async fn test_terminal_deployment_short_circuits() {
    let h = harness().await;
    let id = seeded_deployment(&h.store, "https://github.com/acme/widgets.git").await;

    h.store.mark_deploying(&id, "/logs/d.log").await.unwrap();
    h.store.mark_failed(&id, "earlier failure").await.unwrap();
    let before = h.store.get_deployment(&id).await.unwrap().unwrap();

    // Re-running a terminal deployment must not mutate its row.
    h.pipeline.deploy(&id).await.unwrap();

    let after = h.store.get_deployment(&id).await.unwrap().unwrap();
    assert_eq!(after.status, before.status);
    assert_eq!(after.error_message, before.error_message);
    assert_eq!(after.updated_at, before.updated_at);
}

#[tokio::test]
async fn test_in_flight_deployment_is_left_alone() {
    let h = harness().await;
    let id = seeded_deployment(&h.store, "https://github.com/acme/widgets.git").await;

    h.store.mark_deploying(&id, "/logs/d.log").await.unwrap();

    h.pipeline.deploy(&id).await.unwrap();

    let row = h.store.get_deployment(&id).await.unwrap().unwrap();
    assert_eq!(row.deployment_status(), DeploymentStatus::Deploying);
}

#[tokio::test]
async fn test_clone_failure_reaches_failed_with_observable_log() {
    let h = harness().await;
    // A local path that does not exist: the clone step fails without any
    // network access.
    let id = seeded_deployment(&h.store, "/nonexistent/repository/path").await;

    let result = h.pipeline.deploy(&id).await;
    assert!(result.is_err());

    let row = h.store.get_deployment(&id).await.unwrap().unwrap();
    assert_eq!(row.deployment_status(), DeploymentStatus::Failed);
    assert!(!row.error_message.clone().unwrap_or_default().is_empty());

    // The log file path was stamped at admission and the sink framed the
    // workspace section before the failure.
    let log_path = row.log_file_path.expect("log path must be stamped");
    let contents = tokio::fs::read_to_string(&log_path).await.unwrap();
    assert!(contents.contains("--- Workspace Setup Started:"));
    assert!(contents.contains("--- Workspace Setup Finished:"));
    assert!(contents.contains("Deployment failed:"));

    // Workspace preparation chowned the build output tree for the runtime.
    let state = h.privileged.state.lock().unwrap();
    assert_eq!(state.chowns.len(), 1);
    assert_eq!(state.chowns[0].0, h.layout.build_output_dir(&id).path());
}

#[tokio::test]
async fn test_missing_project_fails_the_deployment() {
    let h = harness().await;
    let user = h.store.create_user("carol").await.unwrap();
    let project = h
        .store
        .create_project(&user.id, "ghost", "https://github.com/acme/ghost.git")
        .await
        .unwrap();
    let id = h.store.create_deployment(project.id).await.unwrap().id;

    // Simulate the project row vanishing between admission and lookup by
    // pointing the deployment at a project id that is never created.
    let orphan = h.store.create_deployment(project.id + 1000).await;

    // SQLite enforces the project reference only when the row exists; an
    // orphan insert may be rejected outright, which is equally acceptable.
    if let Ok(orphan) = orphan {
        let result = h.pipeline.deploy(&orphan.id).await;
        assert!(result.is_err());
        let row = h.store.get_deployment(&orphan.id).await.unwrap().unwrap();
        assert_eq!(row.deployment_status(), DeploymentStatus::Failed);
    }

    // The healthy deployment is unaffected by the orphan's fate.
    let row = h.store.get_deployment(&id).await.unwrap().unwrap();
    assert_eq!(row.deployment_status(), DeploymentStatus::Pending);
}
