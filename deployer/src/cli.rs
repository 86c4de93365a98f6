//! Client side of the manual deploy trigger

use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};

use crate::server::handlers::DEPLOY_SECRET_HEADER;
use crate::storage::settings::Settings;

/// URL of the manual trigger of `product_name` on the local service
pub fn deploy_url(settings: &Settings, product_name: &str) -> String {
    let host = match settings.host.as_str() {
        "0.0.0.0" | "::" | "" => "127.0.0.1",
        host => host,
    };
    format!("http://{}:{}/{}/deploy", host, settings.port, product_name)
}

/// Ask the running service to deploy `product_name`
pub async fn trigger_deploy(
    settings: &Settings,
    product_name: &str,
    secret: &SecretString,
) -> anyhow::Result<(StatusCode, String)> {
    let url = deploy_url(settings, product_name);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build HTTP client")?;

    let response = client
        .post(&url)
        .header(DEPLOY_SECRET_HEADER, secret.expose_secret())
        .send()
        .await
        .with_context(|| format!("could not reach {}", url))?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Ok((status, body))
}
