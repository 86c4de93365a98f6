//! Deploy worker tests

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use uuid::Uuid;

use deployer::app::options::AppOptions;
use deployer::app::state::AppState;
use deployer::errors::DeployerError;
use deployer::models::deployment::DeploymentStatus;
use deployer::storage::settings::Settings;
use deployer::store::{DeploymentStore, MemoryStore};
use deployer::workers::deployer::{run as run_worker, Submission};

use crate::common::{configuration, RecordingExecutor, SERVER};

fn options() -> AppOptions {
    let config = configuration();
    let settings = Settings {
        deployer: config.deployer,
        server: config.server,
        ..Default::default()
    };
    AppOptions::from_settings(&settings)
}

async fn wait_for_status(store: &MemoryStore, id: Uuid, status: DeploymentStatus) {
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(d) = store.find(id).await.unwrap() {
                if d.status == status {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "deployment {} never reached {}", id, status);
}

#[tokio::test]
async fn test_submitted_trigger_runs_on_worker() {
    let store = Arc::new(MemoryStore::new());
    let executor = RecordingExecutor::new();
    let (state, rx) = AppState::with_parts(&options(), store.clone(), executor.clone());

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let worker = tokio::spawn(run_worker(
        state.pipeline.clone(),
        rx,
        Box::pin(async move {
            let _ = stop_rx.await;
        }),
    ));

    let Submission::Started(id) = state.queue.submit(SERVER, "push").await.unwrap() else {
        panic!("slot should be free");
    };
    wait_for_status(&store, id, DeploymentStatus::Deployed).await;

    assert_eq!(
        executor.calls(),
        vec!["pull:server", "build:server", "install:server", "restart:server"]
    );
    assert!(!state.pipeline.admission().is_occupied());

    let _ = stop_tx.send(());
    worker.await.unwrap();
}

#[tokio::test]
async fn test_unknown_product_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let (state, _rx) = AppState::with_parts(&options(), store.clone(), RecordingExecutor::new());

    let result = state.queue.submit("nope", "push").await;

    assert!(matches!(result, Err(DeployerError::NotFound(_))));
    assert!(store.is_empty().await);
    assert!(!state.pipeline.admission().is_occupied());
}

#[tokio::test]
async fn test_submit_without_worker_fails_record_and_frees_slot() {
    let store = Arc::new(MemoryStore::new());
    let (state, rx) = AppState::with_parts(&options(), store.clone(), RecordingExecutor::new());
    drop(rx);

    let result = state.queue.submit(SERVER, "push").await;
    assert!(matches!(result, Err(DeployerError::Internal(_))));

    let records = store.list(SERVER).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, DeploymentStatus::Failed);
    assert!(!state.pipeline.admission().is_occupied());
}
