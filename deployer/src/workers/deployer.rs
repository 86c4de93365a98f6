//! Deploy worker: the single consumer of admitted pipeline runs

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use crate::deploy::pipeline::{Admission, DeploymentPipeline, Ticket};
use crate::errors::DeployerError;

/// Deploy worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Capacity of the ticket channel
    pub queue_capacity: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self { queue_capacity: 4 }
    }
}

/// What happened to a submitted trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Handed to the worker
    Started(Uuid),

    /// Recorded as queued behind the running pipeline
    Queued(Uuid),
}

/// Producer side used by request handlers
#[derive(Clone)]
pub struct DeployQueue {
    pipeline: Arc<DeploymentPipeline>,
    tx: mpsc::Sender<Ticket>,
}

/// Create the queue and the receiver the worker consumes
pub fn channel(
    options: &Options,
    pipeline: Arc<DeploymentPipeline>,
) -> (DeployQueue, mpsc::Receiver<Ticket>) {
    let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
    (DeployQueue { pipeline, tx }, rx)
}

impl DeployQueue {
    pub fn pipeline(&self) -> &Arc<DeploymentPipeline> {
        &self.pipeline
    }

    /// Admit a trigger for `product_name` without waiting for the pipeline
    pub async fn submit(
        &self,
        product_name: &str,
        message: impl Into<String>,
    ) -> Result<Submission, DeployerError> {
        let pipeline_config = self
            .pipeline
            .config()
            .pipeline(product_name)
            .cloned()
            .ok_or_else(|| DeployerError::NotFound(format!("unknown product '{}'", product_name)))?;

        match self.pipeline.admit(&pipeline_config, message).await? {
            Admission::Queued(deployment) => Ok(Submission::Queued(deployment.id)),
            Admission::Granted(ticket) => {
                let id = ticket.deployment().id;
                if let Err(e) = self.tx.try_send(ticket) {
                    let ticket = match e {
                        mpsc::error::TrySendError::Full(ticket) => ticket,
                        mpsc::error::TrySendError::Closed(ticket) => ticket,
                    };
                    self.pipeline
                        .abandon(ticket, "deploy worker is not accepting work")
                        .await;
                    return Err(DeployerError::Internal(
                        "deploy worker is not accepting work".to_string(),
                    ));
                }
                Ok(Submission::Started(id))
            }
        }
    }
}

/// Run the deploy worker
pub async fn run(
    pipeline: Arc<DeploymentPipeline>,
    mut rx: mpsc::Receiver<Ticket>,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!("Deploy worker starting...");

    loop {
        let ticket = tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Deploy worker shutting down...");
                break;
            }
            ticket = rx.recv() => match ticket {
                Some(ticket) => ticket,
                None => {
                    info!("Deploy queue closed");
                    break;
                }
            },
        };

        pipeline.execute(ticket).await;
    }

    rx.close();
    while let Ok(ticket) = rx.try_recv() {
        error!(
            "[{}] Dropping deployment {} on shutdown",
            ticket.deployment().product_name,
            ticket.deployment().short_id()
        );
        pipeline.abandon(ticket, "deployer shut down before the pipeline ran").await;
    }
}
