//! Deployment models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::deploy::fsm::{transition, DeploymentEvent};
use crate::errors::DeployerError;

pub use crate::deploy::fsm::DeploymentStatus;

/// Records running longer than this are displayed as stale
const STALE_AFTER_MINUTES: i64 = 30;

/// What a deployment record does when it runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    /// Pull, build, move and restart
    #[default]
    Standard,

    /// Placeholder that only defers a restart of its product
    RestartOnly,
}

impl DeploymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentMode::Standard => "standard",
            DeploymentMode::RestartOnly => "restart_only",
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(DeploymentMode::Standard),
            "restart_only" | "restartOnly" => Ok(DeploymentMode::RestartOnly),
            _ => Err(format!("Invalid deployment mode: {}", s)),
        }
    }
}

/// One pipeline attempt or queued deployment intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique deployment ID
    pub id: Uuid,

    /// Product this record deploys
    pub product_name: String,

    pub mode: DeploymentMode,

    pub status: DeploymentStatus,

    /// Trigger description (commit message or CLI tag)
    pub message: String,

    /// Marks the live version of the product
    pub is_current: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,
}

impl Deployment {
    /// Create a record stamped with the current time
    pub fn new(
        product_name: impl Into<String>,
        status: DeploymentStatus,
        message: impl Into<String>,
        mode: DeploymentMode,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_name: product_name.into(),
            mode,
            status,
            message: message.into(),
            is_current: false,
            error_message: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// A standard record waiting for the admission slot
    pub fn queued(product_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(product_name, DeploymentStatus::Queued, message, DeploymentMode::Standard)
    }

    /// A standard record that already holds the admission slot
    pub fn running(product_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(product_name, DeploymentStatus::Running, message, DeploymentMode::Standard)
    }

    /// Override the start timestamp
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// Apply a status event, updating the bookkeeping fields that go with it
    pub fn apply(&mut self, event: DeploymentEvent) -> Result<(), DeployerError> {
        let next = transition(self.status, &event).map_err(|e| {
            DeployerError::TransitionError(format!("deployment {}: {}", self.short_id(), e))
        })?;

        match event {
            DeploymentEvent::Start => {
                self.finished_at = None;
                self.error_message = None;
            }
            DeploymentEvent::Succeed => {
                self.finished_at = Some(Utc::now());
            }
            DeploymentEvent::Fail(message) => {
                self.finished_at = Some(Utc::now());
                self.error_message = Some(message);
            }
            DeploymentEvent::Promote => {
                self.is_current = true;
            }
            DeploymentEvent::Demote => {
                self.is_current = false;
            }
        }

        self.status = next;
        Ok(())
    }

    /// First eight characters of the ID
    pub fn short_id(&self) -> String {
        self.id.to_string().chars().take(8).collect()
    }

    /// Run time as `"12.3s"`, once finished
    pub fn duration_string(&self) -> Option<String> {
        let finished_at = self.finished_at?;
        let millis = (finished_at - self.started_at).num_milliseconds();
        Some(format!("{:.1}s", millis as f64 / 1000.0))
    }

    /// Status as shown to operators; long-running records show as `stale`
    pub fn display_status(&self, now: DateTime<Utc>) -> String {
        let stale = self.status == DeploymentStatus::Running
            && now - self.started_at > Duration::minutes(STALE_AFTER_MINUTES);

        if stale {
            "stale".to_string()
        } else {
            self.status.to_string()
        }
    }
}

/// Deployment record with display fields, as returned by the admin API
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentView {
    #[serde(flatten)]
    pub deployment: Deployment,
    pub short_id: String,
    pub display_status: String,
    pub duration: Option<String>,
}

impl From<Deployment> for DeploymentView {
    fn from(deployment: Deployment) -> Self {
        Self {
            short_id: deployment.short_id(),
            display_status: deployment.display_status(Utc::now()),
            duration: deployment.duration_string(),
            deployment,
        }
    }
}
