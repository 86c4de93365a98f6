//! Lifecycle tests against a real listener and shell stages

use std::path::Path;
use std::time::Duration;

use tokio::sync::oneshot;

use deployer::app::options::AppOptions;
use deployer::app::run::run;
use deployer::models::deployment::DeploymentStatus;
use deployer::models::pipeline::PipelineConfiguration;
use deployer::server::handlers::DEPLOY_SECRET_HEADER;
use deployer::storage::settings::Settings;
use deployer::storage::variables::DeployerVariables;
use deployer::store::{DeploymentStore, SqliteStore};

use crate::common::{DEPLOYER, SERVER};

const DEPLOY_SECRET: &str = "deploy-secret";

fn shell_pipeline(root: &Path, product: &str, restart_command: &str) -> PipelineConfiguration {
    let working_directory = root.join(product);
    std::fs::create_dir_all(&working_directory).unwrap();

    let mut config =
        PipelineConfiguration::new(product, working_directory, format!("/push/{}", product));
    config.pull_command = Some("true".to_string());
    config.build_command = Some(format!(
        "mkdir -p target/release && echo fresh > target/release/{}",
        product
    ));
    config.restart_command = Some(restart_command.to_string());
    config
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_file(path: &Path) -> bool {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !path.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .is_ok()
}

#[tokio::test]
async fn test_shutdown_completes_while_self_restart_waits_for_exit() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port();

    // like `supervisorctl restart`, the command only returns once the old
    // process is gone
    let deployer_dir = dir.path().join(DEPLOYER);
    let restart = "touch restart-started; while [ ! -f released ]; do sleep 0.05; done";
    let settings = Settings {
        port,
        db_file: dir.path().join("deployer.db"),
        max_shutdown_delay_secs: 30,
        worker_shutdown_delay_secs: 1,
        deployer: shell_pipeline(dir.path(), DEPLOYER, restart),
        server: shell_pipeline(dir.path(), SERVER, "true"),
        ..Default::default()
    };
    let options = AppOptions::from_settings(&settings);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let app = tokio::spawn(run(
        options,
        DeployerVariables::new("webhook-secret", DEPLOY_SECRET),
        async move {
            let _ = stop_rx.await;
        },
    ));

    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/{}/deploy", port, DEPLOYER);
    let response = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match client
                .post(&url)
                .header(DEPLOY_SECRET_HEADER, DEPLOY_SECRET)
                .send()
                .await
            {
                Ok(response) => return response,
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    drop(client);

    assert!(wait_for_file(&deployer_dir.join("restart-started")).await);

    stop_tx.send(()).unwrap();
    let finished = tokio::time::timeout(Duration::from_secs(5), app).await;

    // let the restart command exit
    std::fs::write(deployer_dir.join("released"), "").unwrap();

    let result = finished.expect("run() kept waiting on the self-restart");
    assert!(result.unwrap().is_ok());

    let store = SqliteStore::open(dir.path().join("deployer.db")).unwrap();
    let current = store.current(DEPLOYER).await.unwrap().unwrap();
    assert_eq!(current.status, DeploymentStatus::Deployed);
    assert_eq!(current.message, format!("[CLI] {}", DEPLOYER));
}
