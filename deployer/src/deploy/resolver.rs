//! Picks the queued deployment to run once a pipeline finishes

use std::collections::HashMap;

use tracing::debug;

use crate::errors::DeployerError;
use crate::models::deployment::Deployment;
use crate::store::DeploymentStore;

/// Choose the next queued record after `finished` completed.
///
/// Only the newest queued record of each product is a candidate. Preference:
/// a newer push for the same product, then the newest push of any other
/// product except the deployer itself, then the deployer's own queued record.
/// Superseded candidates are skipped.
pub async fn find_next_deployment(
    store: &dyn DeploymentStore,
    finished: &Deployment,
    own_product: &str,
) -> Result<Option<Deployment>, DeployerError> {
    let queued = store.queued().await?;

    // queued() is newest first, so the first record seen per product wins
    let mut newest_by_product: HashMap<String, Deployment> = HashMap::new();
    for deployment in queued {
        newest_by_product
            .entry(deployment.product_name.clone())
            .or_insert(deployment);
    }

    if let Some(same_product) = newest_by_product.get(&finished.product_name) {
        if same_product.started_at > finished.started_at
            && !is_superseded(store, same_product).await?
        {
            debug!("Next deployment: newer push for {}", same_product.product_name);
            return Ok(Some(same_product.clone()));
        }
    }

    let mut other_products: Vec<&Deployment> = newest_by_product
        .values()
        .filter(|d| d.product_name != own_product && d.product_name != finished.product_name)
        .collect();
    other_products.sort_by(|a, b| b.started_at.cmp(&a.started_at));

    for candidate in other_products {
        if !is_superseded(store, candidate).await? {
            debug!("Next deployment: queued push for {}", candidate.product_name);
            return Ok(Some(candidate.clone()));
        }
    }

    if let Some(own) = newest_by_product.get(own_product) {
        if !is_superseded(store, own).await? {
            debug!("Next deployment: queued deployer record");
            return Ok(Some(own.clone()));
        }
    }

    Ok(None)
}

/// A queued record is stale when its product already went live with
/// something at least as new, or a later record already delivered.
pub async fn is_superseded(
    store: &dyn DeploymentStore,
    candidate: &Deployment,
) -> Result<bool, DeployerError> {
    if let Some(current) = store.current(&candidate.product_name).await? {
        if current.started_at >= candidate.started_at {
            return Ok(true);
        }
    }

    store
        .has_delivered_after(&candidate.product_name, candidate.started_at)
        .await
}
