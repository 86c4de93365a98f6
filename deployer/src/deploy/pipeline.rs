//! Deployment pipeline orchestration

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::deploy::admission::{AdmissionManager, SlotGuard};
use crate::deploy::executor::StageExecutor;
use crate::deploy::fsm::DeploymentEvent;
use crate::deploy::resolver::find_next_deployment;
use crate::errors::DeployerError;
use crate::models::deployment::{Deployment, DeploymentMode, DeploymentStatus};
use crate::models::pipeline::{DeployerConfiguration, PipelineConfiguration};
use crate::store::DeploymentStore;

/// Outcome of asking for a pipeline run
#[derive(Debug)]
pub enum Admission {
    /// Slot busy; the request was recorded as queued
    Queued(Deployment),

    /// Slot granted; the ticket must be executed
    Granted(Ticket),
}

/// A running record together with the admission slot it holds
#[derive(Debug)]
pub struct Ticket {
    deployment: Deployment,
    guard: SlotGuard,
}

impl Ticket {
    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }
}

/// Runs pull, build, install and restart for the configured products, one
/// pipeline at a time, and decides what queued work runs afterwards.
pub struct DeploymentPipeline {
    config: Arc<DeployerConfiguration>,
    store: Arc<dyn DeploymentStore>,
    admission: Arc<AdmissionManager>,
    executor: Arc<dyn StageExecutor>,
}

impl DeploymentPipeline {
    pub fn new(
        config: Arc<DeployerConfiguration>,
        store: Arc<dyn DeploymentStore>,
        admission: Arc<AdmissionManager>,
        executor: Arc<dyn StageExecutor>,
    ) -> Self {
        Self {
            config,
            store,
            admission,
            executor,
        }
    }

    pub fn config(&self) -> &DeployerConfiguration {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DeploymentStore> {
        &self.store
    }

    pub fn admission(&self) -> &Arc<AdmissionManager> {
        &self.admission
    }

    /// Admit and, if the slot was granted, run the pipeline to completion
    pub async fn deploy(
        &self,
        pipeline: &PipelineConfiguration,
        message: impl Into<String>,
    ) -> Result<(), DeployerError> {
        if let Admission::Granted(ticket) = self.admit(pipeline, message).await? {
            self.execute(ticket).await;
        }
        Ok(())
    }

    /// Take the admission slot for a new run, or queue the request when the
    /// slot is busy. Never waits for a running pipeline.
    pub async fn admit(
        &self,
        pipeline: &PipelineConfiguration,
        message: impl Into<String>,
    ) -> Result<Admission, DeployerError> {
        let message = message.into();

        let Some(guard) = self.admission.try_acquire() else {
            let deployment = Deployment::queued(&pipeline.product_name, message);
            self.store.save(&deployment).await?;
            info!(
                "[{}] Pipeline busy, queued deployment {}",
                pipeline.product_name,
                deployment.short_id()
            );
            return Ok(Admission::Queued(deployment));
        };

        let deployment = Deployment::running(&pipeline.product_name, message);
        self.store.save(&deployment).await?;
        info!(
            "[{}] Starting deployment {}",
            pipeline.product_name,
            deployment.short_id()
        );

        Ok(Admission::Granted(Ticket { deployment, guard }))
    }

    /// Run a granted ticket, then keep resuming whatever queued work the
    /// resolver selects until nothing is left or the slot is taken elsewhere.
    pub async fn execute(&self, ticket: Ticket) {
        let mut ticket = ticket;

        loop {
            let product = ticket.deployment.product_name.clone();

            let next = match self.run(ticket).await {
                Ok(Some(next)) => next,
                Ok(None) => return,
                Err(e) => {
                    error!("[{}] Pipeline bookkeeping failed: {}", product, e);
                    return;
                }
            };

            ticket = match self.resume(next).await {
                Ok(Some(resumed)) => resumed,
                Ok(None) => return,
                Err(e) => {
                    error!("[{}] Could not resume queued deployment: {}", product, e);
                    return;
                }
            };
        }
    }

    /// Execute one record and return the queued record to resume next
    async fn run(&self, ticket: Ticket) -> Result<Option<Deployment>, DeployerError> {
        let Ticket {
            mut deployment,
            guard,
        } = ticket;
        let own_product = self.config.own_product().to_string();

        let pipeline = match self.run_stages(&deployment).await {
            Ok(pipeline) => pipeline,
            Err(e) => {
                self.fail(&mut deployment, guard, e.to_string()).await;
                return find_next_deployment(self.store.as_ref(), &deployment, &own_product).await;
            }
        };

        deployment.apply(DeploymentEvent::Succeed)?;
        self.store.save(&deployment).await?;
        guard.release();
        info!(
            "[{}] Deployment {} succeeded",
            deployment.product_name,
            deployment.short_id()
        );

        let Some(next) =
            find_next_deployment(self.store.as_ref(), &deployment, &own_product).await?
        else {
            self.promote(deployment, &pipeline).await?;
            return Ok(None);
        };

        self.handle_next(deployment, &pipeline, &next).await?;
        Ok(Some(next))
    }

    /// Pull, build and install for standard records; restart-only records
    /// have no stages
    async fn run_stages(
        &self,
        deployment: &Deployment,
    ) -> Result<PipelineConfiguration, DeployerError> {
        let pipeline = self
            .config
            .pipeline(&deployment.product_name)
            .cloned()
            .ok_or_else(|| {
                DeployerError::NotFound(format!(
                    "no pipeline configured for product '{}'",
                    deployment.product_name
                ))
            })?;

        if deployment.mode == DeploymentMode::Standard {
            self.executor.pull(&pipeline).await?;
            self.executor.build(&pipeline).await?;
            self.executor.install(&pipeline).await?;
        }

        Ok(pipeline)
    }

    /// Give up on a granted ticket without running it
    pub async fn abandon(&self, ticket: Ticket, reason: &str) {
        let Ticket {
            mut deployment,
            guard,
        } = ticket;
        self.fail(&mut deployment, guard, reason.to_string()).await;
    }

    async fn fail(&self, deployment: &mut Deployment, guard: SlotGuard, message: String) {
        error!(
            "[{}] Deployment {} failed: {}",
            deployment.product_name,
            deployment.short_id(),
            message
        );

        if let Err(e) = deployment.apply(DeploymentEvent::Fail(message)) {
            error!("[{}] {}", deployment.product_name, e);
        }
        if let Err(e) = self.store.save(deployment).await {
            error!("[{}] Could not persist failure: {}", deployment.product_name, e);
        }

        guard.release();
    }

    /// Mark the record live and restart its service
    async fn promote(
        &self,
        mut deployment: Deployment,
        pipeline: &PipelineConfiguration,
    ) -> Result<(), DeployerError> {
        deployment.apply(DeploymentEvent::Promote)?;
        self.store.set_current(&deployment).await?;
        info!(
            "[{}] Deployment {} is now current, restarting",
            deployment.product_name,
            deployment.short_id()
        );

        if let Err(e) = self.executor.restart(pipeline).await {
            error!("[{}] Restart failed: {}", deployment.product_name, e);
            deployment.error_message = Some(e.to_string());
            self.store.save(&deployment).await?;
        }

        Ok(())
    }

    async fn handle_next(
        &self,
        finished: Deployment,
        pipeline: &PipelineConfiguration,
        next: &Deployment,
    ) -> Result<(), DeployerError> {
        let own_product = self.config.own_product();
        let is_own = finished.product_name == own_product;
        let is_same_product = finished.product_name == next.product_name;

        if is_own && !is_same_product {
            // the deployer restarts itself only after the other product went
            // through, so make sure that restart stays queued
            let pending = self
                .store
                .has_queued_restart(own_product, finished.started_at)
                .await?;

            if !pending {
                let deferred = Deployment::new(
                    own_product,
                    DeploymentStatus::Queued,
                    finished.message.clone(),
                    DeploymentMode::RestartOnly,
                );
                self.store.save(&deferred).await?;
                info!(
                    "[{}] Deferred restart as {} behind {}",
                    own_product,
                    deferred.short_id(),
                    next.product_name
                );
            }
        } else if !is_same_product {
            self.promote(finished, pipeline).await?;
        }

        Ok(())
    }

    /// Re-take the slot for a queued record. If another request holds the
    /// slot the record stays queued and that run picks it up later.
    async fn resume(&self, mut deployment: Deployment) -> Result<Option<Ticket>, DeployerError> {
        let Some(guard) = self.admission.try_acquire() else {
            warn!(
                "[{}] Slot taken before {} could resume, leaving it queued",
                deployment.product_name,
                deployment.short_id()
            );
            return Ok(None);
        };

        deployment.apply(DeploymentEvent::Start)?;
        self.store.save(&deployment).await?;
        info!(
            "[{}] Resuming deployment {}",
            deployment.product_name,
            deployment.short_id()
        );

        Ok(Some(Ticket { deployment, guard }))
    }
}
