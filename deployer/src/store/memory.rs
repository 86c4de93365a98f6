//! In-memory deployment store

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::DeployerError;
use crate::models::deployment::{Deployment, DeploymentMode, DeploymentStatus};
use crate::store::{demote, DeploymentStore};

/// Store keeping records in a map; nothing survives a restart
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, Deployment>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn filtered<F>(&self, predicate: F) -> Vec<Deployment>
    where
        F: Fn(&Deployment) -> bool,
    {
        let records = self.records.read().await;
        let mut matching: Vec<Deployment> =
            records.values().filter(|d| predicate(d)).cloned().collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        matching
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn save(&self, deployment: &Deployment) -> Result<(), DeployerError> {
        self.records
            .write()
            .await
            .insert(deployment.id, deployment.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Deployment>, DeployerError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DeployerError> {
        Ok(self.records.write().await.remove(&id).is_some())
    }

    async fn list(&self, product_name: &str) -> Result<Vec<Deployment>, DeployerError> {
        Ok(self.filtered(|d| d.product_name == product_name).await)
    }

    async fn queued(&self) -> Result<Vec<Deployment>, DeployerError> {
        Ok(self
            .filtered(|d| d.status == DeploymentStatus::Queued)
            .await)
    }

    async fn current(&self, product_name: &str) -> Result<Option<Deployment>, DeployerError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|d| d.is_current && d.product_name == product_name)
            .cloned())
    }

    async fn set_current(&self, deployment: &Deployment) -> Result<(), DeployerError> {
        let mut records = self.records.write().await;

        for other in records.values_mut() {
            if other.is_current
                && other.product_name == deployment.product_name
                && other.id != deployment.id
            {
                demote(other);
            }
        }

        records.insert(deployment.id, deployment.clone());
        Ok(())
    }

    async fn has_delivered_after(
        &self,
        product_name: &str,
        after: DateTime<Utc>,
    ) -> Result<bool, DeployerError> {
        let records = self.records.read().await;
        Ok(records.values().any(|d| {
            d.product_name == product_name && d.started_at > after && d.status.is_delivered()
        }))
    }

    async fn has_queued_restart(
        &self,
        product_name: &str,
        after: DateTime<Utc>,
    ) -> Result<bool, DeployerError> {
        let records = self.records.read().await;
        Ok(records.values().any(|d| {
            d.product_name == product_name
                && d.started_at > after
                && d.status == DeploymentStatus::Queued
                && d.mode == DeploymentMode::RestartOnly
        }))
    }
}
