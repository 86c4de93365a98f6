//! Pipeline configuration models

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration of one deployable product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfiguration {
    /// Product name, also the artifact and live binary file name
    pub product_name: String,

    /// Process supervisor job name, defaults to the product name
    #[serde(default)]
    pub supervisor_job: Option<String>,

    /// Checkout the pipeline runs in
    pub working_directory: PathBuf,

    /// Cargo profile used for the build
    #[serde(default = "default_build_mode")]
    pub build_mode: String,

    /// Route receiving the push webhook
    pub push_path: String,

    /// Build output folder, relative to the working directory
    #[serde(default = "default_build_dir")]
    pub build_dir: String,

    #[serde(default)]
    pub pull_command: Option<String>,

    #[serde(default)]
    pub build_command: Option<String>,

    #[serde(default)]
    pub restart_command: Option<String>,
}

fn default_build_mode() -> String {
    "release".to_string()
}

fn default_build_dir() -> String {
    "target".to_string()
}

impl PipelineConfiguration {
    pub fn new(
        product_name: impl Into<String>,
        working_directory: impl Into<PathBuf>,
        push_path: impl Into<String>,
    ) -> Self {
        Self {
            product_name: product_name.into(),
            supervisor_job: None,
            working_directory: working_directory.into(),
            build_mode: default_build_mode(),
            push_path: push_path.into(),
            build_dir: default_build_dir(),
            pull_command: None,
            build_command: None,
            restart_command: None,
        }
    }

    pub fn supervisor_job(&self) -> &str {
        self.supervisor_job.as_deref().unwrap_or(&self.product_name)
    }

    pub fn pull_command(&self) -> String {
        self.pull_command
            .clone()
            .unwrap_or_else(|| "git pull".to_string())
    }

    pub fn build_command(&self) -> String {
        self.build_command
            .clone()
            .unwrap_or_else(|| format!("cargo build --profile {}", self.build_mode))
    }

    pub fn restart_command(&self) -> String {
        self.restart_command
            .clone()
            .unwrap_or_else(|| format!("supervisorctl restart {}", self.supervisor_job()))
    }

    /// Output folder of the configured profile; cargo writes `dev` to `debug`
    fn profile_dir(&self) -> &str {
        match self.build_mode.as_str() {
            "dev" => "debug",
            mode => mode,
        }
    }

    /// Where the build leaves the fresh artifact
    pub fn artifact_path(&self) -> PathBuf {
        self.working_directory
            .join(&self.build_dir)
            .join(self.profile_dir())
            .join(&self.product_name)
    }

    pub fn deploy_dir(&self) -> PathBuf {
        self.working_directory.join("deploy")
    }

    /// The binary the supervisor runs
    pub fn live_path(&self) -> PathBuf {
        self.deploy_dir().join(&self.product_name)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.deploy_dir().join(format!("{}.old", self.product_name))
    }
}

/// The two pipelines every deployer runs: its own and the target service's
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployerConfiguration {
    pub deployer: PipelineConfiguration,
    pub server: PipelineConfiguration,
}

impl DeployerConfiguration {
    /// Name of the product that is the deployer itself
    pub fn own_product(&self) -> &str {
        &self.deployer.product_name
    }

    pub fn pipelines(&self) -> [&PipelineConfiguration; 2] {
        [&self.deployer, &self.server]
    }

    /// Look up the pipeline of a product
    pub fn pipeline(&self, product_name: &str) -> Option<&PipelineConfiguration> {
        self.pipelines()
            .into_iter()
            .find(|p| p.product_name == product_name)
    }
}
