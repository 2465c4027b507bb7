//! Store unit tests

use catalystd::deploy::url::UrlMinter;
use catalystd::store::models::{DeploymentStatus, DockerfileSource};
use catalystd::store::Store;
use std::sync::Arc;

async fn store_with_project() -> (Store, i64) {
    let store = Store::in_memory().await.unwrap();
    let user = store.create_user("alice").await.unwrap();
    let project = store
        .create_project(&user.id, "widgets", "https://github.com/acme/widgets.git")
        .await
        .unwrap();
    (store, project.id)
}

#[tokio::test]
async fn test_create_deployment_defaults() {
    let (store, project_id) = store_with_project().await;

    let record = store.create_deployment(project_id).await.unwrap();
    assert_eq!(record.deployment_status(), DeploymentStatus::Pending);
    assert_eq!(record.version, "TBD");
    assert_eq!(record.dockerfile_source(), DockerfileSource::Unknown);
    assert!(record.deployment_url.is_none());
    assert!(record.internal_port.is_none());
    assert!(record.error_message.is_none());
    assert!(record.log_file_path.is_none());
}

#[tokio::test]
async fn test_mark_deploying_stamps_log_path_once() {
    let (store, project_id) = store_with_project().await;
    let record = store.create_deployment(project_id).await.unwrap();

    store.mark_deploying(&record.id, "/logs/d.log").await.unwrap();

    let row = store.get_deployment(&record.id).await.unwrap().unwrap();
    assert_eq!(row.deployment_status(), DeploymentStatus::Deploying);
    assert_eq!(row.log_file_path.as_deref(), Some("/logs/d.log"));

    // A second admission attempt must lose.
    assert!(store.mark_deploying(&record.id, "/logs/other.log").await.is_err());
    let row = store.get_deployment(&record.id).await.unwrap().unwrap();
    assert_eq!(row.log_file_path.as_deref(), Some("/logs/d.log"));
}

#[tokio::test]
async fn test_mark_failed_requires_deploying() {
    let (store, project_id) = store_with_project().await;
    let record = store.create_deployment(project_id).await.unwrap();

    // pending -> failed is not an edge of the DAG
    assert!(store.mark_failed(&record.id, "boom").await.is_err());

    store.mark_deploying(&record.id, "/logs/d.log").await.unwrap();
    store.mark_failed(&record.id, "boom").await.unwrap();

    let row = store.get_deployment(&record.id).await.unwrap().unwrap();
    assert_eq!(row.deployment_status(), DeploymentStatus::Failed);
    assert_eq!(row.error_message.as_deref(), Some("boom"));
}

#[tokio::test]
async fn test_error_message_is_end_trimmed() {
    let (store, project_id) = store_with_project().await;
    let record = store.create_deployment(project_id).await.unwrap();
    store.mark_deploying(&record.id, "/logs/d.log").await.unwrap();

    let long_message = "x".repeat(5000);
    store.mark_failed(&record.id, &long_message).await.unwrap();

    let row = store.get_deployment(&record.id).await.unwrap().unwrap();
    assert_eq!(row.error_message.unwrap().len(), 1000);
}

#[tokio::test]
async fn test_mark_success_sets_terminal_fields() {
    let (store, project_id) = store_with_project().await;
    let record = store.create_deployment(project_id).await.unwrap();
    store.mark_deploying(&record.id, "/logs/d.log").await.unwrap();

    store
        .mark_success(
            &record.id,
            "https://widgets-ab12c.nextlivenow.app",
            4001,
            "/data/deployments/d/build-output",
            DockerfileSource::DefaultStandalone,
        )
        .await
        .unwrap();

    let row = store.get_deployment(&record.id).await.unwrap().unwrap();
    assert_eq!(row.deployment_status(), DeploymentStatus::Success);
    assert_eq!(
        row.deployment_url.as_deref(),
        Some("https://widgets-ab12c.nextlivenow.app")
    );
    assert_eq!(row.internal_port, Some(4001));
    assert_eq!(
        row.build_output_path.as_deref(),
        Some("/data/deployments/d/build-output")
    );
    assert_eq!(row.dockerfile_source(), DockerfileSource::DefaultStandalone);
    assert!(row.error_message.is_none());
}

#[tokio::test]
async fn test_terminal_rows_are_immutable() {
    let (store, project_id) = store_with_project().await;
    let record = store.create_deployment(project_id).await.unwrap();
    store.mark_deploying(&record.id, "/logs/d.log").await.unwrap();
    store.mark_failed(&record.id, "boom").await.unwrap();

    assert!(store.mark_deploying(&record.id, "/logs/again.log").await.is_err());
    assert!(store
        .mark_success(&record.id, "https://x.app", 4001, "/out", DockerfileSource::User)
        .await
        .is_err());

    let row = store.get_deployment(&record.id).await.unwrap().unwrap();
    assert_eq!(row.deployment_status(), DeploymentStatus::Failed);
}

#[tokio::test]
async fn test_count_active_by_url_ignores_terminal_failures() {
    let (store, project_id) = store_with_project().await;
    let url = "https://widgets-ab12c.nextlivenow.app";

    // A failed deployment never holds a URL claim.
    let failed = store.create_deployment(project_id).await.unwrap();
    store.mark_deploying(&failed.id, "/logs/f.log").await.unwrap();
    store.set_deployment_url(&failed.id, url).await.unwrap();
    store.mark_failed(&failed.id, "boom").await.unwrap();
    assert_eq!(store.count_active_by_url(url).await.unwrap(), 0);

    // A deploying row does.
    let active = store.create_deployment(project_id).await.unwrap();
    store.mark_deploying(&active.id, "/logs/a.log").await.unwrap();
    store.set_deployment_url(&active.id, url).await.unwrap();
    assert_eq!(store.count_active_by_url(url).await.unwrap(), 1);
}

#[tokio::test]
async fn test_git_account_upsert_and_lookup() {
    let store = Store::in_memory().await.unwrap();
    let user = store.create_user("bob").await.unwrap();

    assert!(store
        .get_git_account(&user.id, "github")
        .await
        .unwrap()
        .is_none());

    store
        .upsert_git_account(&user.id, "github", "9001", "tok-old")
        .await
        .unwrap();
    store
        .upsert_git_account(&user.id, "github", "9001", "tok-new")
        .await
        .unwrap();

    let account = store
        .get_git_account(&user.id, "github")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.access_token, "tok-new");
}

#[tokio::test]
async fn test_get_project_missing_is_none() {
    let store = Store::in_memory().await.unwrap();
    assert!(store.get_project(12345).await.unwrap().is_none());
}

#[tokio::test]
async fn test_minter_produces_project_scoped_url() {
    let (store, _project_id) = store_with_project().await;
    let store = Arc::new(store);
    let minter = UrlMinter::new(store.clone());

    let url = minter.mint("My Widgets", "nextlivenow.app", "d1").await.unwrap();
    assert!(url.starts_with("https://my-widgets-"));
    assert!(url.ends_with(".nextlivenow.app"));

    let host = url
        .strip_prefix("https://")
        .and_then(|rest| rest.strip_suffix(".nextlivenow.app"))
        .unwrap();
    let suffix = host.strip_prefix("my-widgets-").unwrap();
    assert_eq!(suffix.len(), 5);
    assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
}

#[tokio::test]
async fn test_minter_falls_back_for_unusable_names() {
    let (store, _project_id) = store_with_project().await;
    let minter = UrlMinter::new(Arc::new(store));

    let url = minter.mint("!!!", "nextlivenow.app", "d-42").await.unwrap();
    assert_eq!(url, "https://deploy-d-42.nextlivenow.app");
}

#[tokio::test]
async fn test_minter_fails_when_fallback_collides() {
    let (store, project_id) = store_with_project().await;
    let store = Arc::new(store);

    let occupying = store.create_deployment(project_id).await.unwrap();
    store.mark_deploying(&occupying.id, "/logs/o.log").await.unwrap();
    store
        .set_deployment_url(&occupying.id, "https://deploy-d-42.nextlivenow.app")
        .await
        .unwrap();

    let minter = UrlMinter::new(store);
    let err = minter.mint("!!!", "nextlivenow.app", "d-42").await.unwrap_err();
    assert!(err.to_string().contains("URL minting failed"));
}
