//! Server state

use std::sync::Arc;

use crate::deploy::pipeline::DeploymentPipeline;
use crate::storage::variables::DeployerVariables;
use crate::workers::deployer::DeployQueue;

/// Server state shared across handlers
pub struct ServerState {
    pub queue: DeployQueue,
    pub variables: DeployerVariables,
}

impl ServerState {
    pub fn new(queue: DeployQueue, variables: DeployerVariables) -> Self {
        Self { queue, variables }
    }

    pub fn pipeline(&self) -> &Arc<DeploymentPipeline> {
        self.queue.pipeline()
    }
}
