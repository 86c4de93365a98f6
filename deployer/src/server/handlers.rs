//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::deploy::signature::{verify_signature, SIGNATURE_HEADER};
use crate::errors::DeployerError;
use crate::models::deployment::{DeploymentStatus, DeploymentView};
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Header carrying the shared secret of the manual trigger
pub const DEPLOY_SECRET_HEADER: &str = "X-Deploy-Secret";

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub pipeline_busy: bool,
}

/// Health check handler
pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "deployer".to_string(),
        version: version.version,
        pipeline_busy: state.pipeline().admission().is_occupied(),
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

#[derive(Debug, Deserialize)]
struct PushEvent {
    head_commit: Option<HeadCommit>,
}

#[derive(Debug, Deserialize)]
struct HeadCommit {
    message: String,
}

fn commit_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<PushEvent>(body)
        .ok()?
        .head_commit
        .map(|commit| commit.message)
}

/// Push notification for one product. The pipeline runs on the deploy
/// worker; the response only says whether the signature was accepted.
pub async fn push_handler(
    state: Arc<ServerState>,
    product_name: String,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let secret = state.variables.webhook_secret.expose_secret().as_bytes();

    if !verify_signature(secret, signature, &body) {
        warn!("[{}] Push event with invalid signature", product_name);
        return (
            StatusCode::FORBIDDEN,
            format!("[{}] Push event denied.", product_name),
        );
    }

    let message = commit_message(&body).unwrap_or_else(|| format!("[Push] {}", product_name));
    info!("[{}] Push event accepted", product_name);

    if let Err(e) = state.queue.submit(&product_name, message).await {
        error!("[{}] Could not start deployment: {}", product_name, e);
    }

    (
        StatusCode::OK,
        format!("[{}] Push event accepted.", product_name),
    )
}

fn has_deploy_secret(state: &ServerState, headers: &HeaderMap) -> bool {
    let Some(provided) = headers.get(DEPLOY_SECRET_HEADER) else {
        return false;
    };
    let expected = state.variables.deploy_secret.expose_secret().as_bytes();
    provided.as_bytes().ct_eq(expected).into()
}

/// Manual trigger for one product, used by `--deploy`
pub async fn deploy_handler(
    state: Arc<ServerState>,
    product_name: String,
    headers: HeaderMap,
) -> Result<&'static str, StatusCode> {
    if !has_deploy_secret(&state, &headers) {
        warn!("[{}] Manual deploy with missing or wrong secret", product_name);
        return Err(StatusCode::UNAUTHORIZED);
    }

    state
        .queue
        .submit(&product_name, format!("[CLI] {}", product_name))
        .await
        .map_err(|e| {
            error!("[{}] Could not start deployment: {}", product_name, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok("Started deployment pipeline")
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub product: Option<String>,
}

/// Records of one product, or of every configured product, newest first
pub async fn list_deployments_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<DeploymentView>>, StatusCode> {
    let store = state.pipeline().store();

    let products: Vec<String> = match query.product {
        Some(product) => vec![product],
        None => state
            .pipeline()
            .config()
            .pipelines()
            .iter()
            .map(|p| p.product_name.clone())
            .collect(),
    };

    let mut deployments = Vec::new();
    for product in &products {
        deployments.extend(store.list(product).await.map_err(internal_error)?);
    }
    deployments.sort_by(|a, b| b.started_at.cmp(&a.started_at));

    Ok(Json(deployments.into_iter().map(DeploymentView::from).collect()))
}

/// The live record of a product
pub async fn current_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(product): Path<String>,
) -> Result<Json<DeploymentView>, StatusCode> {
    let current = state
        .pipeline()
        .store()
        .current(&product)
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(current.into()))
}

/// Remove a record. Needs the deploy secret; running records cannot be
/// removed.
pub async fn delete_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<StatusCode, StatusCode> {
    if !has_deploy_secret(&state, &headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let store = state.pipeline().store();
    let deployment = store
        .find(id)
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)?;

    if deployment.status == DeploymentStatus::Running {
        return Err(StatusCode::CONFLICT);
    }

    if !store.delete(id).await.map_err(internal_error)? {
        return Err(StatusCode::NOT_FOUND);
    }

    info!(
        "[{}] Deleted deployment {}",
        deployment.product_name,
        deployment.short_id()
    );
    Ok(StatusCode::NO_CONTENT)
}

fn internal_error(e: DeployerError) -> StatusCode {
    error!("Request failed: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}
