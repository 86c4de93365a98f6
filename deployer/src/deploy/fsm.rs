//! Finite state machine for deployment record status

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Waiting for the admission slot, not yet run
    Queued,

    /// Pipeline in progress
    Running,

    /// Pipeline finished, artifact installed
    Success,

    /// Pipeline failed
    Failed,

    /// Live version of its product
    Deployed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Queued => "queued",
            DeploymentStatus::Running => "running",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Deployed => "deployed",
        }
    }

    /// Whether a record in this status has delivered its artifact
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeploymentStatus::Success | DeploymentStatus::Deployed)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            // "canceled" is how older databases spell queued
            "queued" | "canceled" => Ok(DeploymentStatus::Queued),
            "running" => Ok(DeploymentStatus::Running),
            "success" => Ok(DeploymentStatus::Success),
            "failed" => Ok(DeploymentStatus::Failed),
            "deployed" => Ok(DeploymentStatus::Deployed),
            _ => Err(format!("Invalid deployment status: {}", s)),
        }
    }
}

/// Deployment event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentEvent {
    /// Slot granted, pipeline starts
    Start,

    /// All stages completed
    Succeed,

    /// A stage failed
    Fail(String),

    /// Marked as the live version
    Promote,

    /// A newer record for the same product was promoted
    Demote,
}

/// Compute the status reached by applying `event` in `state`
pub fn transition(
    state: DeploymentStatus,
    event: &DeploymentEvent,
) -> Result<DeploymentStatus, String> {
    let next = match (state, event) {
        (DeploymentStatus::Queued, DeploymentEvent::Start) => DeploymentStatus::Running,

        (DeploymentStatus::Running, DeploymentEvent::Succeed) => DeploymentStatus::Success,
        (DeploymentStatus::Running, DeploymentEvent::Fail(_)) => DeploymentStatus::Failed,

        (DeploymentStatus::Success, DeploymentEvent::Promote) => DeploymentStatus::Deployed,
        (DeploymentStatus::Deployed, DeploymentEvent::Demote) => DeploymentStatus::Success,

        (state, event) => {
            return Err(format!("{:?} -> {:?}", state, event));
        }
    };

    Ok(next)
}
