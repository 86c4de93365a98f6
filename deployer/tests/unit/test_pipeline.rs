//! Pipeline orchestration tests

use futures::future::join_all;

use deployer::deploy::pipeline::Admission;
use deployer::models::deployment::{Deployment, DeploymentMode, DeploymentStatus};
use deployer::models::pipeline::PipelineConfiguration;
use deployer::store::DeploymentStore;

use crate::common::{configuration, fixture, tick, DEPLOYER, SERVER};

fn pipeline_of(product: &str) -> PipelineConfiguration {
    configuration().pipeline(product).cloned().unwrap()
}

async fn find(store: &dyn DeploymentStore, deployment: &Deployment) -> Deployment {
    store.find(deployment.id).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_second_trigger_is_queued_while_running() {
    let f = fixture();

    let first = f.pipeline.admit(&pipeline_of(SERVER), "first").await.unwrap();
    let Admission::Granted(ticket) = first else {
        panic!("first trigger should get the slot");
    };
    assert!(f.pipeline.admission().is_occupied());

    let second = f.pipeline.admit(&pipeline_of(SERVER), "second").await.unwrap();
    let Admission::Queued(queued) = second else {
        panic!("second trigger should be queued");
    };
    assert_eq!(queued.status, DeploymentStatus::Queued);
    assert_eq!(ticket.deployment().status, DeploymentStatus::Running);

    // nothing ran a stage yet
    assert!(f.executor.calls().is_empty());
}

#[tokio::test]
async fn test_concurrent_triggers_get_one_slot() {
    let f = fixture();
    let config = pipeline_of(SERVER);

    let admissions =
        join_all((0..8).map(|i| f.pipeline.admit(&config, format!("push {}", i)))).await;

    let granted = admissions
        .iter()
        .filter(|a| matches!(a, Ok(Admission::Granted(_))))
        .count();
    let queued = admissions
        .iter()
        .filter(|a| matches!(a, Ok(Admission::Queued(_))))
        .count();

    assert_eq!(granted, 1);
    assert_eq!(queued, 7);
    assert_eq!(f.store.queued().await.unwrap().len(), 7);
}

#[tokio::test]
async fn test_latest_queued_push_wins() {
    let f = fixture();

    let Admission::Granted(ticket) = f.pipeline.admit(&pipeline_of(SERVER), "one").await.unwrap()
    else {
        panic!("expected slot");
    };
    let first = ticket.deployment().clone();
    tick().await;
    let Admission::Queued(second) = f.pipeline.admit(&pipeline_of(SERVER), "two").await.unwrap()
    else {
        panic!("expected queue");
    };
    tick().await;
    let Admission::Queued(third) = f.pipeline.admit(&pipeline_of(SERVER), "three").await.unwrap()
    else {
        panic!("expected queue");
    };

    f.pipeline.execute(ticket).await;

    let store = f.store.as_ref();
    assert_eq!(find(store, &first).await.status, DeploymentStatus::Success);
    assert_eq!(find(store, &second).await.status, DeploymentStatus::Queued);

    let third = find(store, &third).await;
    assert_eq!(third.status, DeploymentStatus::Deployed);
    assert!(third.is_current);

    assert_eq!(f.executor.calls_of("pull").len(), 2);
    assert_eq!(f.executor.calls_of("restart"), vec!["restart:server"]);
    assert!(!f.pipeline.admission().is_occupied());
}

#[tokio::test]
async fn test_self_deploy_defers_restart_behind_other_product() {
    let f = fixture();

    let Admission::Granted(ticket) = f
        .pipeline
        .admit(&pipeline_of(DEPLOYER), "deployer change")
        .await
        .unwrap()
    else {
        panic!("expected slot");
    };
    let own = ticket.deployment().clone();
    tick().await;
    let Admission::Queued(server) = f
        .pipeline
        .admit(&pipeline_of(SERVER), "server change")
        .await
        .unwrap()
    else {
        panic!("expected queue");
    };

    f.pipeline.execute(ticket).await;

    let store = f.store.as_ref();
    let server = find(store, &server).await;
    assert_eq!(server.status, DeploymentStatus::Deployed);
    assert!(server.is_current);

    // the first deployer record was built but never restarted on its own
    assert_eq!(find(store, &own).await.status, DeploymentStatus::Success);

    let deployer_records = store.list(DEPLOYER).await.unwrap();
    assert_eq!(deployer_records.len(), 2);
    let deferred = &deployer_records[0];
    assert_eq!(deferred.mode, DeploymentMode::RestartOnly);
    assert_eq!(deferred.message, "deployer change");
    assert_eq!(deferred.status, DeploymentStatus::Deployed);
    assert!(deferred.is_current);

    // the deployer restarts itself last
    assert_eq!(
        f.executor.calls_of("restart"),
        vec!["restart:server", "restart:deployer"]
    );
    assert_eq!(f.executor.calls_of("pull"), vec!["pull:deployer", "pull:server"]);
}

#[tokio::test]
async fn test_stale_restart_only_record_does_not_block_deferral() {
    let f = fixture();

    let stale = Deployment::new(
        DEPLOYER,
        DeploymentStatus::Queued,
        "old restart",
        DeploymentMode::RestartOnly,
    );
    f.store.save(&stale).await.unwrap();
    tick().await;

    let Admission::Granted(ticket) = f
        .pipeline
        .admit(&pipeline_of(DEPLOYER), "fresh")
        .await
        .unwrap()
    else {
        panic!("expected slot");
    };
    tick().await;
    f.pipeline
        .admit(&pipeline_of(SERVER), "server change")
        .await
        .unwrap();

    f.pipeline.execute(ticket).await;

    let restarts = f.executor.calls_of("restart");
    assert_eq!(restarts.last().map(String::as_str), Some("restart:deployer"));

    let current = f.store.current(DEPLOYER).await.unwrap().unwrap();
    assert_eq!(current.message, "fresh");
    assert_eq!(current.mode, DeploymentMode::RestartOnly);
}

#[tokio::test]
async fn test_failed_stage_releases_slot_and_runs_queued_work() {
    let f = fixture();
    f.executor.fail_on("build", SERVER);

    let Admission::Granted(ticket) = f.pipeline.admit(&pipeline_of(SERVER), "broken").await.unwrap()
    else {
        panic!("expected slot");
    };
    let broken = ticket.deployment().clone();
    tick().await;
    let Admission::Queued(own) = f
        .pipeline
        .admit(&pipeline_of(DEPLOYER), "deployer change")
        .await
        .unwrap()
    else {
        panic!("expected queue");
    };

    f.pipeline.execute(ticket).await;

    let store = f.store.as_ref();
    let broken = find(store, &broken).await;
    assert_eq!(broken.status, DeploymentStatus::Failed);
    assert!(!broken.is_current);
    assert!(broken
        .error_message
        .as_deref()
        .unwrap()
        .contains("build:server failed"));
    assert!(broken.finished_at.is_some());

    assert!(f.executor.calls_of("install").iter().all(|c| c != "install:server"));
    assert_eq!(find(store, &own).await.status, DeploymentStatus::Deployed);
    assert!(store.current(SERVER).await.unwrap().is_none());
    assert!(!f.pipeline.admission().is_occupied());
}

#[tokio::test]
async fn test_new_promotion_demotes_previous_current() {
    let f = fixture();
    let config = pipeline_of(SERVER);

    f.pipeline.deploy(&config, "first").await.unwrap();
    tick().await;
    f.pipeline.deploy(&config, "second").await.unwrap();

    let records = f.store.list(SERVER).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records.iter().filter(|d| d.is_current).count(), 1);

    assert_eq!(records[0].message, "second");
    assert_eq!(records[0].status, DeploymentStatus::Deployed);
    assert_eq!(records[1].status, DeploymentStatus::Success);
    assert!(!records[1].is_current);
}

#[tokio::test]
async fn test_restart_failure_keeps_record_deployed() {
    let f = fixture();
    f.executor.fail_on("restart", SERVER);

    f.pipeline.deploy(&pipeline_of(SERVER), "change").await.unwrap();

    let current = f.store.current(SERVER).await.unwrap().unwrap();
    assert_eq!(current.status, DeploymentStatus::Deployed);
    assert!(current
        .error_message
        .as_deref()
        .unwrap()
        .contains("restart:server failed"));
}

#[tokio::test]
async fn test_superseded_queued_record_is_skipped() {
    let f = fixture();

    let old = Deployment::queued(SERVER, "old");
    f.store.save(&old).await.unwrap();
    tick().await;

    // a later server deployment already went live
    f.pipeline.deploy(&pipeline_of(SERVER), "live").await.unwrap();
    tick().await;

    f.pipeline.deploy(&pipeline_of(DEPLOYER), "deployer change").await.unwrap();

    assert_eq!(find(f.store.as_ref(), &old).await.status, DeploymentStatus::Queued);
    assert_eq!(f.executor.calls_of("pull"), vec!["pull:server", "pull:deployer"]);
}

#[tokio::test]
async fn test_queued_record_of_unknown_product_fails_and_loop_continues() {
    let f = fixture();

    let Admission::Granted(ticket) = f
        .pipeline
        .admit(&pipeline_of(SERVER), "server change")
        .await
        .unwrap()
    else {
        panic!("expected slot");
    };
    let server = ticket.deployment().clone();
    tick().await;

    // left behind by a product that was renamed in the settings
    let stray = Deployment::queued("renamed", "old product");
    f.store.save(&stray).await.unwrap();
    tick().await;
    let Admission::Queued(own) = f
        .pipeline
        .admit(&pipeline_of(DEPLOYER), "deployer change")
        .await
        .unwrap()
    else {
        panic!("expected queue");
    };

    f.pipeline.execute(ticket).await;

    let store = f.store.as_ref();
    let stray = find(store, &stray).await;
    assert_eq!(stray.status, DeploymentStatus::Failed);
    assert!(stray
        .error_message
        .as_deref()
        .unwrap()
        .contains("no pipeline configured for product 'renamed'"));

    assert_eq!(find(store, &server).await.status, DeploymentStatus::Deployed);
    assert_eq!(find(store, &own).await.status, DeploymentStatus::Deployed);
    assert_eq!(f.executor.calls_of("pull"), vec!["pull:server", "pull:deployer"]);
    assert!(!f.pipeline.admission().is_occupied());
}
