//! Atomic installation of a freshly built binary

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::errors::PipelineError;
use crate::models::pipeline::PipelineConfiguration;

/// Filesystem operations the install step needs
pub trait ArtifactFs: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// The real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFs;

impl ArtifactFs for StdFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }
}

/// Paths involved in swapping one product's binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Fresh build output
    pub artifact: PathBuf,
    pub deploy_dir: PathBuf,
    /// Binary the supervisor runs
    pub live: PathBuf,
    pub backup: PathBuf,
}

impl From<&PipelineConfiguration> for ArtifactPaths {
    fn from(config: &PipelineConfiguration) -> Self {
        Self {
            artifact: config.artifact_path(),
            deploy_dir: config.deploy_dir(),
            live: config.live_path(),
            backup: config.backup_path(),
        }
    }
}

fn move_error(context: &str, path: &Path, err: io::Error) -> PipelineError {
    PipelineError::MoveError(format!("{} {}: {}", context, path.display(), err))
}

/// Replace the live binary with the fresh artifact.
///
/// The previous binary is kept as a backup until the new one is in place. If
/// the final rename fails the backup is restored, and the error reports both
/// the install failure and the rollback outcome.
pub fn install_artifact(fs: &dyn ArtifactFs, paths: &ArtifactPaths) -> Result<(), PipelineError> {
    fs.create_dir_all(&paths.deploy_dir)
        .map_err(|e| move_error("Could not create deploy directory", &paths.deploy_dir, e))?;

    if !fs.exists(&paths.artifact) {
        return Err(PipelineError::MoveError(format!(
            "New binary not found at {}",
            paths.artifact.display()
        )));
    }

    if fs.exists(&paths.backup) {
        fs.remove_file(&paths.backup)
            .map_err(|e| move_error("Could not remove stale backup", &paths.backup, e))?;
    }

    if fs.exists(&paths.live) {
        fs.rename(&paths.live, &paths.backup)
            .map_err(|e| move_error("Could not back up live binary", &paths.live, e))?;
    }

    let install_err = match fs.rename(&paths.artifact, &paths.live) {
        Ok(()) => {
            if fs.exists(&paths.backup) {
                if let Err(e) = fs.remove_file(&paths.backup) {
                    warn!("Could not remove backup {}: {}", paths.backup.display(), e);
                }
            }
            info!("Installed {}", paths.live.display());
            return Ok(());
        }
        Err(e) => e,
    };

    if !fs.exists(&paths.backup) {
        return Err(PipelineError::MoveError(format!(
            "Deployment failed: '{}'. No previous binary to restore.",
            install_err
        )));
    }

    match rollback(fs, paths) {
        Ok(()) => {
            warn!("Install failed, restored previous binary at {}", paths.live.display());
            Err(PipelineError::MoveError(format!(
                "Deployment failed: '{}'. Rollback successful.",
                install_err
            )))
        }
        Err(rollback_err) => Err(PipelineError::MoveError(format!(
            "Deployment failed: '{}'. Rollback failed: '{}'.",
            install_err, rollback_err
        ))),
    }
}

fn rollback(fs: &dyn ArtifactFs, paths: &ArtifactPaths) -> io::Result<()> {
    if fs.exists(&paths.live) {
        fs.remove_file(&paths.live)?;
    }
    fs.rename(&paths.backup, &paths.live)
}
