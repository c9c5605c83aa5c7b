//! # sol-cloud Configuration
//!
//! Three files feed a run:
//!
//! 1. **Project** (`.sol-cloud.yml` in the project directory)
//!    - Provider, app name, region, org, machine shape, validator flags
//!    - Missing file means defaults; CLI flags override every value
//!
//! 2. **Credentials** (`~/.config/sol-cloud/credentials.json`)
//!    - Per-provider access token, org/workspace, last verification time
//!
//! 3. **State** (`.sol-cloud/state.json` in the project directory)
//!    - Deployments created from this project, and which one was last
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let project = ProjectConfig::load(None, &project_dir)?;
//! let mut cfg = DeploymentConfig::new(name, project.platform()?, &project_dir);
//! project.apply_to(&mut cfg);
//! cfg.validate()?;
//! ```

mod credentials;
mod deployment;
mod state;

// Re-export all public types
pub use credentials::{
    primary_token_env_var, resolve_access_token, resolve_access_token_with, resolve_org,
    Credentials, CredentialsStore, ProviderCredentials, DEFAULT_FLY_ORG,
};
pub use deployment::{
    artifacts_dir, DeploymentConfig, HealthCheckConfig, ProgramDeployConfig, ResourceShape,
    ValidatorConfig, DEFAULT_HEALTH_INTERVAL, DEFAULT_HEALTH_TIMEOUT, DEFAULT_REGION,
};
pub use state::{DeploymentRecord, State, StateStore};

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::Platform;
use crate::error::ConfigError;

/// Project file name looked up in the project directory
pub const PROJECT_FILE: &str = ".sol-cloud.yml";

/// Model of `.sol-cloud.yml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub provider: Option<String>,

    #[serde(default)]
    pub app_name: Option<String>,

    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub org: Option<String>,

    #[serde(default)]
    pub resources: ResourceShape,

    #[serde(default)]
    pub validator: ValidatorConfig,
}

impl ProjectConfig {
    /// Load the project file
    ///
    /// An explicit path must exist. The default `.sol-cloud.yml` is optional.
    pub fn load(explicit: Option<&Path>, project_dir: &Path) -> Result<Self, ConfigError> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => (project_dir.join(PROJECT_FILE), false),
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound && !required => {
                tracing::debug!("No {} found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(err) => return Err(ConfigError::io(&path, err)),
        };

        Self::from_yaml(&content, &path)
    }

    pub fn from_yaml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Configured platform, `fly` when unset
    pub fn platform(&self) -> Result<Platform, ConfigError> {
        match self.provider.as_deref().map(str::trim) {
            None | Some("") => Ok(Platform::Fly),
            Some(name) => name.parse(),
        }
    }

    /// Copy file values onto a deployment config
    pub fn apply_to(&self, cfg: &mut DeploymentConfig) {
        if let Some(region) = self.region.as_deref().filter(|r| !r.trim().is_empty()) {
            cfg.region = region.trim().to_string();
        }
        if let Some(org) = self.org.as_deref().filter(|o| !o.trim().is_empty()) {
            cfg.org = Some(org.trim().to_string());
        }
        cfg.resources = self.resources.clone();
        cfg.validator = self.validator.clone();
    }
}

/// Write a file through a temp file and rename
pub(crate) fn write_atomic(path: &Path, payload: &[u8], mode: u32) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
    }

    let tmp_path = temp_path(path);
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options
        .open(&tmp_path)
        .map_err(|e| ConfigError::io(&tmp_path, e))?;
    file.write_all(payload)
        .and_then(|_| file.sync_all())
        .map_err(|e| ConfigError::io(&tmp_path, e))?;

    #[cfg(unix)]
    {
        // An existing temp file keeps its old mode through open()
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(mode))
            .map_err(|e| ConfigError::io(&tmp_path, e))?;
    }

    std::fs::rename(&tmp_path, path).map_err(|e| ConfigError::io(path, e))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
