//! Pipeline stage executor

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::deploy::artifact::{install_artifact, ArtifactFs, ArtifactPaths, StdFs};
use crate::deploy::runner::ProcessRunner;
use crate::errors::PipelineError;
use crate::models::pipeline::PipelineConfiguration;

/// The four stages a pipeline is made of
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Fetch the latest source into the working directory
    async fn pull(&self, config: &PipelineConfiguration) -> Result<(), PipelineError>;

    /// Compile the product with its configured profile
    async fn build(&self, config: &PipelineConfiguration) -> Result<(), PipelineError>;

    /// Swap the fresh artifact in as the live binary
    async fn install(&self, config: &PipelineConfiguration) -> Result<(), PipelineError>;

    /// Ask the process supervisor to restart the product
    async fn restart(&self, config: &PipelineConfiguration) -> Result<(), PipelineError>;
}

/// Executes stages as shell commands and swaps binaries on disk
pub struct ShellExecutor {
    fs: Arc<dyn ArtifactFs>,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::with_fs(Arc::new(StdFs))
    }

    pub fn with_fs(fs: Arc<dyn ArtifactFs>) -> Self {
        Self { fs }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StageExecutor for ShellExecutor {
    async fn pull(&self, config: &PipelineConfiguration) -> Result<(), PipelineError> {
        ProcessRunner::new(&config.working_directory)
            .execute(&config.pull_command())
            .await
    }

    async fn build(&self, config: &PipelineConfiguration) -> Result<(), PipelineError> {
        ProcessRunner::new(&config.working_directory)
            .execute(&config.build_command())
            .await
    }

    async fn install(&self, config: &PipelineConfiguration) -> Result<(), PipelineError> {
        let fs = self.fs.clone();
        let paths = ArtifactPaths::from(config);
        info!("Installing {} into {}", paths.artifact.display(), paths.live.display());

        tokio::task::spawn_blocking(move || install_artifact(fs.as_ref(), &paths))
            .await
            .map_err(|e| PipelineError::MoveError(format!("Install task failed: {}", e)))?
    }

    async fn restart(&self, config: &PipelineConfiguration) -> Result<(), PipelineError> {
        ProcessRunner::new(&config.working_directory)
            .execute(&config.restart_command())
            .await
    }
}
