//! Shared fixtures

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use deployer::deploy::admission::AdmissionManager;
use deployer::deploy::executor::StageExecutor;
use deployer::deploy::pipeline::DeploymentPipeline;
use deployer::errors::PipelineError;
use deployer::models::pipeline::{DeployerConfiguration, PipelineConfiguration};
use deployer::store::{DeploymentStore, MemoryStore};

pub const DEPLOYER: &str = "deployer";
pub const SERVER: &str = "server";

pub fn configuration() -> DeployerConfiguration {
    DeployerConfiguration {
        deployer: PipelineConfiguration::new(DEPLOYER, "/srv/deployer", "/push/deployer"),
        server: PipelineConfiguration::new(SERVER, "/srv/server", "/push/server"),
    }
}

/// Records every stage call as `"<stage>:<product>"` and fails the ones it
/// was told to
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<String>>,
    failing: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_on(&self, stage: &str, product: &str) {
        self.failing
            .lock()
            .unwrap()
            .push(format!("{}:{}", stage, product));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, stage: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with(&format!("{}:", stage)))
            .collect()
    }

    fn record(&self, stage: &str, config: &PipelineConfiguration) -> Result<(), PipelineError> {
        let call = format!("{}:{}", stage, config.product_name);
        self.calls.lock().unwrap().push(call.clone());

        if self.failing.lock().unwrap().contains(&call) {
            return Err(PipelineError::ExecuteError(format!("{} failed", call)));
        }
        Ok(())
    }
}

#[async_trait]
impl StageExecutor for RecordingExecutor {
    async fn pull(&self, config: &PipelineConfiguration) -> Result<(), PipelineError> {
        self.record("pull", config)
    }

    async fn build(&self, config: &PipelineConfiguration) -> Result<(), PipelineError> {
        self.record("build", config)
    }

    async fn install(&self, config: &PipelineConfiguration) -> Result<(), PipelineError> {
        self.record("install", config)
    }

    async fn restart(&self, config: &PipelineConfiguration) -> Result<(), PipelineError> {
        self.record("restart", config)
    }
}

pub struct Fixture {
    pub pipeline: Arc<DeploymentPipeline>,
    pub store: Arc<MemoryStore>,
    pub executor: Arc<RecordingExecutor>,
}

pub fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let executor = RecordingExecutor::new();

    let pipeline = Arc::new(DeploymentPipeline::new(
        Arc::new(configuration()),
        store.clone() as Arc<dyn DeploymentStore>,
        Arc::new(AdmissionManager::new()),
        executor.clone() as Arc<dyn StageExecutor>,
    ));

    Fixture {
        pipeline,
        store,
        executor,
    }
}

/// Keeps consecutive records apart on the clock
pub async fn tick() {
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
}
