//! Secrets read from the environment

use secrecy::SecretString;

use crate::errors::DeployerError;

pub const WEBHOOK_SECRET_VAR: &str = "GITHUB_WEBHOOK_SECRET";
pub const DEPLOY_SECRET_VAR: &str = "DEPLOY_SECRET";

/// Shared secrets for the push and manual trigger endpoints
#[derive(Debug)]
pub struct DeployerVariables {
    pub webhook_secret: SecretString,
    pub deploy_secret: SecretString,
}

impl DeployerVariables {
    pub fn new(webhook_secret: impl Into<String>, deploy_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: SecretString::from(webhook_secret.into()),
            deploy_secret: SecretString::from(deploy_secret.into()),
        }
    }

    /// Read both secrets, failing when either is missing or empty
    pub fn from_env() -> Result<Self, DeployerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, DeployerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self::new(
            required(&lookup, WEBHOOK_SECRET_VAR)?,
            required(&lookup, DEPLOY_SECRET_VAR)?,
        ))
    }
}

/// The manual trigger secret alone, for the `--deploy` client
pub fn deploy_secret_from_env() -> Result<SecretString, DeployerError> {
    let secret = required(&|name: &str| std::env::var(name).ok(), DEPLOY_SECRET_VAR)?;
    Ok(SecretString::from(secret))
}

fn required<F>(lookup: &F, name: &str) -> Result<String, DeployerError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            DeployerError::ConfigError(format!("environment variable {} is not set", name))
        })
}
