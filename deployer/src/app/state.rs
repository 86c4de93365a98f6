//! Application state management

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::deploy::admission::AdmissionManager;
use crate::deploy::executor::{ShellExecutor, StageExecutor};
use crate::deploy::pipeline::{DeploymentPipeline, Ticket};
use crate::errors::DeployerError;
use crate::store::{DeploymentStore, SqliteStore};
use crate::workers::deployer::{self, DeployQueue};

/// Main application state
pub struct AppState {
    /// Pipeline orchestrator
    pub pipeline: Arc<DeploymentPipeline>,

    /// Producer side of the deploy worker queue
    pub queue: DeployQueue,
}

impl AppState {
    /// Open the record store and wire the pipeline. The returned receiver
    /// feeds the deploy worker.
    pub async fn init(
        options: &AppOptions,
    ) -> Result<(Self, mpsc::Receiver<Ticket>), DeployerError> {
        info!("Initializing application state...");

        if let Some(parent) = options.db_file.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let store: Arc<dyn DeploymentStore> = Arc::new(SqliteStore::open(&options.db_file)?);

        Ok(Self::with_parts(
            options,
            store,
            Arc::new(ShellExecutor::new()),
        ))
    }

    /// Wire the state around a given store and executor
    pub fn with_parts(
        options: &AppOptions,
        store: Arc<dyn DeploymentStore>,
        executor: Arc<dyn StageExecutor>,
    ) -> (Self, mpsc::Receiver<Ticket>) {
        let pipeline = Arc::new(DeploymentPipeline::new(
            Arc::new(options.pipelines.clone()),
            store,
            Arc::new(AdmissionManager::new()),
            executor,
        ));
        let (queue, rx) = deployer::channel(&options.deployer, pipeline.clone());

        (Self { pipeline, queue }, rx)
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), DeployerError> {
        info!("Shutting down application state...");
        if self.pipeline.admission().is_occupied() {
            warn!("Shutting down while a pipeline holds the admission slot");
        }
        Ok(())
    }
}
