//! Deployment domain types
//!
//! Defines the supported platforms and the result of a deployment.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Hosting platforms a validator can be deployed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Fly.io (Machines API + flyctl remote builder)
    Fly,
    /// Railway (GraphQL API + railway CLI)
    Railway,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fly => "fly",
            Self::Railway => "railway",
        }
    }

    /// Human-readable platform name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Fly => "Fly.io",
            Self::Railway => "Railway",
        }
    }

    /// Public domain deployments are served from
    pub fn public_domain(&self) -> &'static str {
        match self {
            Self::Fly => "fly.dev",
            Self::Railway => "up.railway.app",
        }
    }

    /// Default public hostname when the platform didn't report one
    pub fn default_host(&self, name: &str) -> String {
        format!("{}.{}", name, self.public_domain())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fly" | "fly.io" | "flyio" => Ok(Self::Fly),
            "railway" => Ok(Self::Railway),
            _ => Err(ConfigError::UnsupportedProvider {
                name: s.to_string(),
            }),
        }
    }
}

/// A deployed (or, for dry runs, predicted) validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub name: String,
    pub platform: Platform,
    pub rpc_url: String,
    pub websocket_url: String,
    /// Local directory holding the rendered artifacts and deploy log
    pub artifacts_dir: PathBuf,
    pub dashboard_url: Option<String>,
}

impl Deployment {
    /// Build a deployment from the public hostname the validator answers on
    pub fn from_host(
        name: impl Into<String>,
        platform: Platform,
        host: &str,
        artifacts_dir: impl Into<PathBuf>,
    ) -> Self {
        let host = host
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        Self {
            name: name.into(),
            platform,
            rpc_url: format!("https://{host}"),
            websocket_url: format!("wss://{host}"),
            artifacts_dir: artifacts_dir.into(),
            dashboard_url: None,
        }
    }

    pub fn with_dashboard_url(mut self, url: Option<String>) -> Self {
        self.dashboard_url = url;
        self
    }
}

/// Platform-reported state of a deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderStatus {
    pub name: String,
    pub state: String,
}
