//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::DeployerError;
use crate::server::handlers::{
    current_deployment_handler, delete_deployment_handler, deploy_handler, health_handler,
    list_deployments_handler, push_handler, version_handler,
};
use crate::server::state::ServerState;

/// Build the router: one push route and one manual trigger per configured
/// product, plus the admin API
pub fn router(state: Arc<ServerState>) -> Router {
    let mut app = Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Deployment records
        .route("/deployments", get(list_deployments_handler))
        .route(
            "/deployments/current/{product}",
            get(current_deployment_handler),
        )
        .route("/deployments/{id}", delete(delete_deployment_handler));

    let pipelines: Vec<_> = state
        .pipeline()
        .config()
        .pipelines()
        .into_iter()
        .cloned()
        .collect();

    for pipeline in pipelines {
        let product = pipeline.product_name.clone();
        app = app.route(
            &pipeline.push_path,
            post(
                move |State(state): State<Arc<ServerState>>, headers: HeaderMap, body: Bytes| {
                    push_handler(state, product, headers, body)
                },
            ),
        );

        let product = pipeline.product_name.clone();
        app = app.route(
            &format!("/{}/deploy", pipeline.product_name),
            post(
                move |State(state): State<Arc<ServerState>>, headers: HeaderMap| {
                    deploy_handler(state, product, headers)
                },
            ),
        );
    }

    app.with_state(state).layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), DeployerError>>, DeployerError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DeployerError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| DeployerError::ServerError(e.to_string()))
    });

    Ok(handle)
}
