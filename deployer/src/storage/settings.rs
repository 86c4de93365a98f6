//! Settings file management

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::DeployerError;
use crate::filesys::file::File;
use crate::logs::LogLevel;
use crate::models::pipeline::{DeployerConfiguration, PipelineConfiguration};

const ROUTE_METACHARACTERS: [char; 4] = ['/', '{', '}', '*'];

/// Admin routes the router registers before any push route
fn is_reserved_path(path: &str) -> bool {
    matches!(path, "/health" | "/version" | "/deployments")
        || path.starts_with("/deployments/")
}

/// Deployer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON logs on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Directory for daily rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Host the HTTP server binds to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the HTTP server listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// SQLite database holding the deployment records
    #[serde(default = "default_db_file")]
    pub db_file: PathBuf,

    /// Capacity of the deploy worker queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Seconds to wait for a clean shutdown
    #[serde(default = "default_max_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,

    /// Seconds shutdown waits on a running pipeline
    #[serde(default = "default_worker_shutdown_delay")]
    pub worker_shutdown_delay_secs: u64,

    /// Pipeline of the deployer itself
    #[serde(default = "default_deployer_pipeline")]
    pub deployer: PipelineConfiguration,

    /// Pipeline of the served product
    #[serde(default = "default_server_pipeline")]
    pub server: PipelineConfiguration,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_db_file() -> PathBuf {
    PathBuf::from("deploy/deployer.db")
}

fn default_queue_capacity() -> usize {
    4
}

fn default_max_shutdown_delay() -> u64 {
    30
}

fn default_worker_shutdown_delay() -> u64 {
    5
}

fn default_deployer_pipeline() -> PipelineConfiguration {
    PipelineConfiguration {
        supervisor_job: Some("mottzi-deployer".to_string()),
        build_mode: "dev".to_string(),
        ..PipelineConfiguration::new(
            "Mottzi-deployer",
            "/var/www/mottzi-deployer",
            "/pushevent/mottzi-deployer",
        )
    }
}

fn default_server_pipeline() -> PipelineConfiguration {
    PipelineConfiguration {
        supervisor_job: Some("mottzi".to_string()),
        build_mode: "dev".to_string(),
        ..PipelineConfiguration::new("Mottzi", "/var/www/mottzi", "/pushevent/mottzi")
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            host: default_host(),
            port: default_port(),
            db_file: default_db_file(),
            queue_capacity: default_queue_capacity(),
            max_shutdown_delay_secs: default_max_shutdown_delay(),
            worker_shutdown_delay_secs: default_worker_shutdown_delay(),
            deployer: default_deployer_pipeline(),
            server: default_server_pipeline(),
        }
    }
}

impl Settings {
    /// Read the settings file, falling back to defaults when it does not exist
    pub async fn load(file: &File) -> Result<Self, DeployerError> {
        if !file.exists().await {
            return Ok(Self::default());
        }

        let settings: Settings = file.read_json().await?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), DeployerError> {
        if self.deployer.product_name == self.server.product_name {
            return Err(DeployerError::ConfigError(format!(
                "deployer and server share the product name '{}'",
                self.server.product_name
            )));
        }
        if self.deployer.push_path == self.server.push_path {
            return Err(DeployerError::ConfigError(format!(
                "deployer and server share the push path '{}'",
                self.server.push_path
            )));
        }
        let pipelines = [&self.deployer, &self.server];
        for pipeline in pipelines {
            let name = &pipeline.product_name;
            if name.is_empty() || name.contains(ROUTE_METACHARACTERS) {
                return Err(DeployerError::ConfigError(format!(
                    "product name '{}' must be non-empty and free of '/', '{{', '}}' and '*'",
                    name
                )));
            }

            let push_path = &pipeline.push_path;
            if !push_path.starts_with('/') {
                return Err(DeployerError::ConfigError(format!(
                    "push path '{}' must start with '/'",
                    push_path
                )));
            }
            if push_path.contains(['{', '}', '*']) {
                return Err(DeployerError::ConfigError(format!(
                    "push path '{}' must not contain route parameters",
                    push_path
                )));
            }
            if is_reserved_path(push_path) {
                return Err(DeployerError::ConfigError(format!(
                    "push path '{}' is already served by the deployer",
                    push_path
                )));
            }
            if let Some(other) = pipelines
                .iter()
                .find(|p| *push_path == format!("/{}/deploy", p.product_name))
            {
                return Err(DeployerError::ConfigError(format!(
                    "push path '{}' collides with the manual trigger of '{}'",
                    push_path, other.product_name
                )));
            }
        }
        Ok(())
    }

    pub fn deployer_configuration(&self) -> DeployerConfiguration {
        DeployerConfiguration {
            deployer: self.deployer.clone(),
            server: self.server.clone(),
        }
    }
}
