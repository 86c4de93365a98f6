//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::models::pipeline::DeployerConfiguration;
use crate::storage::settings::Settings;
use crate::workers::deployer;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// SQLite database with the deployment records
    pub db_file: PathBuf,

    /// Pipelines of the deployer and the served product
    pub pipelines: DeployerConfiguration,

    /// Server configuration
    pub server: ServerOptions,

    /// Deploy worker options
    pub deployer: deployer::Options,
}

impl AppOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: Duration::from_secs(settings.max_shutdown_delay_secs),
                max_worker_wait: Duration::from_secs(settings.worker_shutdown_delay_secs),
            },
            db_file: settings.db_file.clone(),
            pipelines: settings.deployer_configuration(),
            server: ServerOptions {
                host: settings.host.clone(),
                port: settings.port,
            },
            deployer: deployer::Options {
                queue_capacity: settings.queue_capacity,
            },
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Upper bound on a graceful shutdown before the process exits anyway
    pub max_shutdown_delay: Duration,

    /// How long shutdown waits on a running pipeline before abandoning it.
    /// A self-restart blocks until this process exits, so it never finishes.
    pub max_worker_wait: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
            max_worker_wait: Duration::from_secs(5),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8081,
        }
    }
}
