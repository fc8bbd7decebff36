//! Separate orchestrators sharing one state directory, as concurrent
//! `strata` invocations do

use std::path::Path;
use std::sync::Arc;
use strata_engine::LocalEngine;
use strata_orchestrator::Orchestrator;
use strata_store::FileParameterStore;
use strata_test_utils::{context, test_config};
use strata_units::UnitKind;

async fn open(dir: &Path) -> Orchestrator {
    let store = Arc::new(FileParameterStore::new(dir.join("parameters.json")));
    let engine = Arc::new(LocalEngine::open(dir.join("engine.json")).await.unwrap());
    Orchestrator::new(&test_config(), store, engine).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_units_on_one_state_dir_are_both_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&test_config(), "dev");
    open(dir.path())
        .await
        .apply(&ctx, UnitKind::Network)
        .await
        .unwrap();

    let roles = open(dir.path()).await;
    let artifacts = open(dir.path()).await;
    let (roles_report, artifacts_report) = tokio::join!(
        roles.apply(&ctx, UnitKind::AccessRoles),
        artifacts.apply(&ctx, UnitKind::ArtifactRepository),
    );
    roles_report.unwrap();
    artifacts_report.unwrap();

    let fresh = open(dir.path()).await;
    let statuses = fresh.status(&ctx).await.unwrap();
    for unit in [
        UnitKind::Network,
        UnitKind::AccessRoles,
        UnitKind::ArtifactRepository,
    ] {
        let status = statuses.iter().find(|s| s.unit == unit).unwrap();
        assert!(status.deployed.is_some(), "{unit} stack record lost");
    }
    assert_eq!(fresh.published_keys(&ctx).await.unwrap().len(), 6);

    fresh.apply(&ctx, UnitKind::Cluster).await.unwrap();
    assert!(matches!(
        artifacts.teardown(&ctx, UnitKind::Network, false).await,
        Err(strata_orchestrator::ProvisionError::DependentsStillApplied { .. })
    ));
}
