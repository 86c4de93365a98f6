//! Shell stage execution

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::PipelineError;

/// Runs pipeline commands through `bash -c` inside a working directory
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    working_directory: PathBuf,
}

impl ProcessRunner {
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: working_directory.into(),
        }
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    /// Run `command` to completion.
    ///
    /// A command that cannot be spawned is an `InitiateError`; a non-zero exit
    /// is an `ExecuteError` carrying stdout followed by stderr.
    pub async fn execute(&self, command: &str) -> Result<(), PipelineError> {
        info!("Running '{}' in {}", command, self.working_directory.display());

        let output = Command::new("bash")
            .current_dir(&self.working_directory)
            .args(["-c", command])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                PipelineError::InitiateError(format!("Start of '{}' failed: {}", command, e))
            })?;

        if output.status.success() {
            debug!("'{}' finished successfully", command);
            return Ok(());
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        if combined.trim().is_empty() {
            combined = "NO OUTPUT".to_string();
        }

        Err(PipelineError::ExecuteError(format!(
            "Execution of '{}' failed ({}) with output:\n\n{}",
            command, output.status, combined
        )))
    }
}
