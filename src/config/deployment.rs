//! Per-invocation deployment configuration.
//!
//! Built once by the command layer from the project file plus flags, then
//! validated before anything touches the network.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::naming::validate_deployment_name;
use crate::domain::Platform;
use crate::error::ConfigError;

pub const DEFAULT_REGION: &str = "ord";
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(180);
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_VOLUME_SIZE_GB: u32 = 10;

fn default_cpu_kind() -> String {
    "shared".to_string()
}

fn default_cpus() -> u32 {
    1
}

fn default_memory_mb() -> u32 {
    2048
}

fn default_volume_size_gb() -> u32 {
    DEFAULT_VOLUME_SIZE_GB
}

fn default_slots_per_epoch() -> u64 {
    432_000
}

fn default_compute_unit_limit() -> u64 {
    200_000
}

/// Machine shape and storage size
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceShape {
    #[serde(default = "default_cpu_kind")]
    pub cpu_kind: String,

    #[serde(default = "default_cpus")]
    pub cpus: u32,

    #[serde(default = "default_memory_mb")]
    pub memory_mb: u32,

    #[serde(default = "default_volume_size_gb")]
    pub volume_size_gb: u32,
}

impl Default for ResourceShape {
    fn default() -> Self {
        Self {
            cpu_kind: default_cpu_kind(),
            cpus: default_cpus(),
            memory_mb: default_memory_mb(),
            volume_size_gb: default_volume_size_gb(),
        }
    }
}

/// Program binary preloaded into the validator at startup
///
/// Either all three paths are set or none of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramDeployConfig {
    #[serde(default)]
    pub so_path: Option<PathBuf>,

    #[serde(default)]
    pub program_id_keypair: Option<PathBuf>,

    #[serde(default)]
    pub upgrade_authority: Option<PathBuf>,
}

impl ProgramDeployConfig {
    pub fn is_empty(&self) -> bool {
        self.so_path.is_none() && self.program_id_keypair.is_none() && self.upgrade_authority.is_none()
    }

    pub fn is_complete(&self) -> bool {
        self.so_path.is_some() && self.program_id_keypair.is_some() && self.upgrade_authority.is_some()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.is_empty() || self.is_complete() {
            return Ok(());
        }
        let missing: Vec<&str> = [
            ("so_path", self.so_path.is_none()),
            ("program_id_keypair", self.program_id_keypair.is_none()),
            ("upgrade_authority", self.upgrade_authority.is_none()),
        ]
        .into_iter()
        .filter_map(|(field, absent)| absent.then_some(field))
        .collect();
        Err(ConfigError::invalid(
            "validator.program_deploy",
            format!(
                "so_path, program_id_keypair and upgrade_authority must be set together (missing: {})",
                missing.join(", ")
            ),
        ))
    }
}

/// solana-test-validator runtime parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default = "default_slots_per_epoch")]
    pub slots_per_epoch: u64,

    #[serde(default)]
    pub ticks_per_slot: Option<u64>,

    #[serde(default = "default_compute_unit_limit")]
    pub compute_unit_limit: u64,

    #[serde(default)]
    pub ledger_limit_size: Option<u64>,

    /// Accounts cloned from mainnet at startup
    #[serde(default)]
    pub clone_accounts: Vec<String>,

    #[serde(default)]
    pub clone_upgradeable_programs: Vec<String>,

    #[serde(default)]
    pub program_deploy: ProgramDeployConfig,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            slots_per_epoch: default_slots_per_epoch(),
            ticks_per_slot: None,
            compute_unit_limit: default_compute_unit_limit(),
            ledger_limit_size: None,
            clone_accounts: Vec::new(),
            clone_upgradeable_programs: Vec::new(),
            program_deploy: ProgramDeployConfig::default(),
        }
    }
}

/// Post-deploy health check settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheckConfig {
    pub skip: bool,
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            skip: false,
            timeout: DEFAULT_HEALTH_TIMEOUT,
            interval: DEFAULT_HEALTH_INTERVAL,
        }
    }
}

/// Everything one `deploy` run needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentConfig {
    pub name: String,
    pub platform: Platform,
    pub region: String,
    /// Fly organization slug or Railway workspace id
    pub org: Option<String>,
    /// Directory holding `.sol-cloud/`
    pub project_dir: PathBuf,
    pub resources: ResourceShape,
    pub validator: ValidatorConfig,
    pub dry_run: bool,
    pub skip_volume: bool,
    pub health: HealthCheckConfig,
}

impl DeploymentConfig {
    pub fn new(name: impl Into<String>, platform: Platform, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            platform,
            region: DEFAULT_REGION.to_string(),
            org: None,
            project_dir: project_dir.into(),
            resources: ResourceShape::default(),
            validator: ValidatorConfig::default(),
            dry_run: false,
            skip_volume: false,
            health: HealthCheckConfig::default(),
        }
    }

    /// Check every field before any remote call is made
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_deployment_name(&self.name)?;

        if self.region.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "region".to_string(),
            });
        }
        if self.project_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingField {
                field: "project_dir".to_string(),
            });
        }
        if self.resources.cpus == 0 {
            return Err(ConfigError::invalid("resources.cpus", "must be at least 1"));
        }
        if self.resources.memory_mb < 256 {
            return Err(ConfigError::invalid(
                "resources.memory_mb",
                format!("{} (must be at least 256)", self.resources.memory_mb),
            ));
        }
        if !self.skip_volume && self.resources.volume_size_gb == 0 {
            return Err(ConfigError::invalid(
                "resources.volume_size_gb",
                "must be at least 1",
            ));
        }
        if !self.health.skip {
            if self.health.timeout.is_zero() {
                return Err(ConfigError::invalid("health_timeout", "must be greater than zero"));
            }
            if self.health.interval.is_zero() {
                return Err(ConfigError::invalid("health_interval", "must be greater than zero"));
            }
        }
        if self.validator.slots_per_epoch == 0 {
            return Err(ConfigError::invalid("validator.slots_per_epoch", "must be greater than zero"));
        }
        self.validator.program_deploy.validate()
    }

    /// Local artifacts directory for this deployment
    pub fn artifacts_dir(&self) -> PathBuf {
        artifacts_dir(&self.project_dir, &self.name)
    }
}

/// `<project>/.sol-cloud/deployments/<name>`
pub fn artifacts_dir(project_dir: &Path, name: &str) -> PathBuf {
    project_dir.join(".sol-cloud").join("deployments").join(name)
}
