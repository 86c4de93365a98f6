//! Persisted deployment records

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::DeployerError;
use crate::deploy::fsm::DeploymentEvent;
use crate::models::deployment::Deployment;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Record store the pipeline persists deployment history into.
///
/// Implementations serialize their own writes; callers never hold a lock
/// across calls.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Insert or update a record
    async fn save(&self, deployment: &Deployment) -> Result<(), DeployerError>;

    async fn find(&self, id: Uuid) -> Result<Option<Deployment>, DeployerError>;

    /// Delete a record, returning whether it existed
    async fn delete(&self, id: Uuid) -> Result<bool, DeployerError>;

    /// All records of a product, newest first
    async fn list(&self, product_name: &str) -> Result<Vec<Deployment>, DeployerError>;

    /// All queued records, newest first
    async fn queued(&self) -> Result<Vec<Deployment>, DeployerError>;

    /// The live record of a product
    async fn current(&self, product_name: &str) -> Result<Option<Deployment>, DeployerError>;

    /// Persist `deployment` as the live record of its product and demote
    /// every other live record of that product to `success`, atomically.
    ///
    /// The caller has already applied the promote event to `deployment`.
    async fn set_current(&self, deployment: &Deployment) -> Result<(), DeployerError>;

    /// Whether a record of the product started after `after` reached
    /// `success` or `deployed`
    async fn has_delivered_after(
        &self,
        product_name: &str,
        after: DateTime<Utc>,
    ) -> Result<bool, DeployerError>;

    /// Whether a queued restart-only record of the product started after
    /// `after` exists
    async fn has_queued_restart(
        &self,
        product_name: &str,
        after: DateTime<Utc>,
    ) -> Result<bool, DeployerError>;
}

/// Clear the live flag of a record displaced by a newer promotion
pub(crate) fn demote(deployment: &mut Deployment) {
    if deployment.apply(DeploymentEvent::Demote).is_err() {
        deployment.is_current = false;
    }
}
