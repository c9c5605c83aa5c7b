//! Provider trait and factory
//!
//! Each supported platform implements the same lifecycle operations. The
//! command layer picks one by name and never touches platform specifics.

use std::path::PathBuf;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use crate::config::{CredentialsStore, DeploymentConfig};
use crate::domain::{Deployment, Platform, ProviderStatus};
use crate::error::{AuthError, ConfigError, DeployError, ProviderError};
use crate::services::fly_provider::FlyProvider;
use crate::services::railway_provider::RailwayProvider;

/// Deployment lifecycle on one hosting platform
#[async_trait]
pub trait Provider: Send + Sync {
    fn platform(&self) -> Platform;

    async fn deploy(
        &self,
        cfg: &DeploymentConfig,
        cancel: &CancellationToken,
    ) -> Result<Deployment, DeployError>;

    async fn destroy(&self, name: &str) -> Result<(), ProviderError>;

    async fn status(&self, name: &str) -> Result<ProviderStatus, ProviderError>;

    async fn restart(&self, name: &str) -> Result<(), ProviderError>;

    /// Check a candidate token before it is stored
    async fn verify_access_token(&self, token: &SecretString) -> Result<(), AuthError>;
}

/// Inputs shared by every provider
pub struct ProviderOptions {
    /// Directory holding `.sol-cloud/`
    pub project_dir: PathBuf,
    /// Token given on the command line, ahead of env vars and the store
    pub access_token: Option<SecretString>,
    pub credentials: CredentialsStore,
}

/// Build the provider named `name` ("fly" or "railway", any case)
pub fn new_provider(name: &str, options: ProviderOptions) -> Result<Box<dyn Provider>, ConfigError> {
    let platform: Platform = name.parse()?;
    Ok(for_platform(platform, options))
}

pub fn for_platform(platform: Platform, options: ProviderOptions) -> Box<dyn Provider> {
    match platform {
        Platform::Fly => Box::new(FlyProvider::new(options)),
        Platform::Railway => Box::new(RailwayProvider::new(options)),
    }
}

/// Reject blank names before any remote call
pub(crate) fn require_name(name: &str) -> Result<&str, ProviderError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ProviderError::MissingName);
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(dir: &TempDir) -> ProviderOptions {
        ProviderOptions {
            project_dir: dir.path().to_path_buf(),
            access_token: None,
            credentials: CredentialsStore::at(dir.path().join("credentials.json")),
        }
    }

    #[test]
    fn test_factory_is_case_and_space_insensitive() {
        let dir = TempDir::new().unwrap();
        assert_eq!(new_provider(" Fly ", options(&dir)).unwrap().platform(), Platform::Fly);
        assert_eq!(
            new_provider("RAILWAY", options(&dir)).unwrap().platform(),
            Platform::Railway
        );
    }

    #[test]
    fn test_factory_rejects_unknown_provider() {
        let dir = TempDir::new().unwrap();
        let err = new_provider("heroku", options(&dir)).err().unwrap();
        assert!(matches!(err, ConfigError::UnsupportedProvider { .. }));
        assert!(err.to_string().contains("fly, railway"));
    }

    #[tokio::test]
    async fn test_blank_name_is_rejected_before_remote_calls() {
        let dir = TempDir::new().unwrap();
        let provider = new_provider("fly", options(&dir)).unwrap();
        assert!(matches!(
            provider.destroy("  ").await,
            Err(ProviderError::MissingName)
        ));
    }
}
