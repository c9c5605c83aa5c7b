//! Deployment orchestrator
//!
//! Drives one deploy from a validated config to a running validator:
//!
//! 1. Validate the config
//! 2. Render artifacts (and stage program files)
//! 3. Stop with predicted URLs on a dry run
//! 4. Resolve the access token
//! 5. Let the platform provisioner ensure its resources and push the build
//! 6. Write the deploy log, success or not
//! 7. Wait for the RPC endpoint to report healthy
//!
//! Nothing is rolled back. A failed health check after a successful push is
//! reported as `DeployError::Unhealthy` carrying the deployment.

use std::fmt::{self, Display};
use std::path::Path;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::DeploymentConfig;
use crate::domain::{Deployment, Platform};
use crate::error::{AuthError, DeployError};
use crate::infrastructure::artifacts::{self, Artifacts};
use crate::infrastructure::RpcClient;
use crate::services::health::{wait_healthy, HealthProbe};

/// What the platform reported after a successful push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    /// Public hostname without scheme
    pub host: String,
    pub dashboard_url: Option<String>,
}

/// Platform-specific part of a deploy
#[async_trait]
pub trait Provisioner: Send + Sync {
    fn platform(&self) -> Platform;

    fn resolve_token(&self) -> Result<SecretString, AuthError>;

    /// Ensure remote resources exist and push the rendered build
    ///
    /// Everything worth diagnosing goes into `log`, which is written to disk
    /// whether or not this succeeds.
    async fn provision(
        &self,
        token: &SecretString,
        cfg: &DeploymentConfig,
        artifacts: &Artifacts,
        log: &mut DeployLog,
    ) -> Result<Provisioned, DeployError>;
}

/// Captured progress and command output for `deploy.log`
#[derive(Debug, Default)]
pub struct DeployLog {
    buf: String,
}

impl DeployLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, line: impl Display) {
        use std::fmt::Write as _;
        let _ = writeln!(self.buf, "{line}");
    }

    /// A titled block of command output
    pub fn section(&mut self, title: &str, body: &str) {
        self.buf.push('\n');
        self.line(format_args!("[{title}]"));
        self.buf.push_str(body);
        if !body.ends_with('\n') {
            self.buf.push('\n');
        }
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.trim().is_empty()
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.buf.as_bytes())
    }
}

impl fmt::Display for DeployLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.buf)
    }
}

/// Deploy with the validator's own `getHealth` as the readiness probe
pub async fn deploy(
    provisioner: &dyn Provisioner,
    cfg: &DeploymentConfig,
    cancel: &CancellationToken,
) -> Result<Deployment, DeployError> {
    deploy_with_probe(provisioner, cfg, cancel, |url| {
        Box::new(RpcClient::new(url)) as Box<dyn HealthProbe>
    })
    .await
}

/// Deploy, building the readiness probe for the resolved RPC URL with `probe_for`
pub async fn deploy_with_probe<F>(
    provisioner: &dyn Provisioner,
    cfg: &DeploymentConfig,
    cancel: &CancellationToken,
    probe_for: F,
) -> Result<Deployment, DeployError>
where
    F: FnOnce(&str) -> Box<dyn HealthProbe>,
{
    cfg.validate()?;
    let platform = provisioner.platform();

    let artifacts = artifacts::prepare(cfg)?;
    info!("📦 Rendered artifacts in {}", artifacts.dir.display());

    if cfg.dry_run {
        info!("🧪 Dry run: skipping all remote calls");
        return Ok(Deployment::from_host(
            &cfg.name,
            platform,
            &platform.default_host(&cfg.name),
            &artifacts.dir,
        ));
    }

    let token = provisioner.resolve_token()?;

    let mut log = DeployLog::new();
    let outcome = tokio::select! {
        _ = cancel.cancelled() => Err(DeployError::Cancelled),
        result = provisioner.provision(&token, cfg, &artifacts, &mut log) => result,
    };

    let log_path = artifacts.log_path();
    let log_written = if log.is_empty() {
        false
    } else {
        match log.write_to(&log_path) {
            Ok(()) => true,
            Err(e) => {
                warn!("⚠️  Failed to write deploy log {}: {}", log_path.display(), e);
                false
            }
        }
    };

    let provisioned = match outcome {
        Ok(provisioned) => provisioned,
        Err(err) if log_written => return Err(err.with_log_path(log_path)),
        Err(err) => return Err(err),
    };

    let deployment = Deployment::from_host(&cfg.name, platform, &provisioned.host, &artifacts.dir)
        .with_dashboard_url(provisioned.dashboard_url);
    info!("🚀 {} deployed to {}", cfg.name, deployment.rpc_url);

    if cfg.health.skip {
        return Ok(deployment);
    }

    info!(
        "⏳ Waiting up to {} for {} to report healthy",
        humantime::format_duration(cfg.health.timeout),
        deployment.rpc_url
    );
    let probe = probe_for(&deployment.rpc_url);
    match wait_healthy(probe.as_ref(), cfg.health.timeout, cfg.health.interval, cancel).await {
        Ok(()) => {
            info!("✅ RPC is healthy");
            Ok(deployment)
        }
        Err(source) => Err(DeployError::Unhealthy {
            deployment: Box::new(deployment),
            source,
        }),
    }
}
