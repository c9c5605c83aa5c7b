//! Fly.io provider
//!
//! Deploy order: app, public IPs, ledger volume, then `flyctl deploy`.
//! Every step tolerates resources left over from an earlier run.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{resolve_access_token, resolve_org, DeploymentConfig};
use crate::domain::naming::{extract_host, volume_name};
use crate::domain::{Deployment, Platform, ProviderStatus};
use crate::error::{AuthError, DeployError, ProviderError};
use crate::infrastructure::artifacts::Artifacts;
use crate::infrastructure::fly::{self, FlyApi};
use crate::infrastructure::process;
use crate::services::orchestrator::{self, DeployLog, Provisioned, Provisioner};
use crate::services::provider::{require_name, Provider, ProviderOptions};
use crate::services::token_verification::verify_fly_token;
use crate::tools::{self, tools as tool_names};

const PUSH_STAGE: &str = "fly remote deploy";

pub struct FlyProvider {
    options: ProviderOptions,
    machines_url: String,
    graphql_url: String,
    /// Explicit flyctl binary, skipping PATH lookup
    flyctl: Option<String>,
    push_timeout: Duration,
}

impl FlyProvider {
    pub fn new(options: ProviderOptions) -> Self {
        Self {
            options,
            machines_url: fly::MACHINES_API_URL.to_string(),
            graphql_url: fly::GRAPHQL_URL.to_string(),
            flyctl: None,
            push_timeout: fly::PUSH_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub fn with_endpoints(mut self, machines_url: impl Into<String>, graphql_url: impl Into<String>) -> Self {
        self.machines_url = machines_url.into();
        self.graphql_url = graphql_url.into();
        self
    }

    #[cfg(test)]
    pub fn with_flyctl(mut self, path: impl Into<String>) -> Self {
        self.flyctl = Some(path.into());
        self
    }

    #[cfg(test)]
    pub fn with_push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = timeout;
        self
    }

    fn api(&self, token: SecretString) -> FlyApi {
        FlyApi::with_endpoints(token, &self.machines_url, &self.graphql_url)
    }

    fn token(&self) -> Result<SecretString, AuthError> {
        resolve_access_token(
            Platform::Fly,
            self.options.access_token.as_ref(),
            &self.options.credentials,
        )
    }

    fn authed_api(&self) -> Result<FlyApi, ProviderError> {
        Ok(self.api(self.token()?))
    }

    /// Explicit org, `SOL_CLOUD_FLY_ORG`, stored org, then `personal`
    fn org(&self, explicit: Option<&str>) -> Option<String> {
        let stored = match self.options.credentials.load() {
            Ok(creds) => creds.fly.org,
            Err(e) => {
                warn!("⚠️  Could not read stored Fly org: {}", e);
                None
            }
        };
        resolve_org(
            Platform::Fly,
            explicit,
            |key| std::env::var(key).ok(),
            stored.as_deref(),
        )
    }

    fn flyctl(&self) -> Result<String, DeployError> {
        match &self.flyctl {
            Some(path) => Ok(path.clone()),
            None => tools::require_tool(tool_names::FLYCTL).map_err(|e| DeployError::stage(PUSH_STAGE, e)),
        }
    }
}

#[async_trait]
impl Provisioner for FlyProvider {
    fn platform(&self) -> Platform {
        Platform::Fly
    }

    fn resolve_token(&self) -> Result<SecretString, AuthError> {
        self.token()
    }

    async fn provision(
        &self,
        token: &SecretString,
        cfg: &DeploymentConfig,
        artifacts: &Artifacts,
        log: &mut DeployLog,
    ) -> Result<Provisioned, DeployError> {
        let flyctl = self.flyctl()?;
        let org = self.org(cfg.org.as_deref());
        let api = self.api(SecretString::from(token.expose_secret().to_string()));

        log.line("api deploy started");
        log.line(format_args!(
            "app={} org={} region={}",
            cfg.name,
            org.as_deref().unwrap_or("-"),
            cfg.region
        ));

        let app = api
            .ensure_app(&cfg.name, org.as_deref())
            .await
            .map_err(|e| DeployError::stage("fly app create", e))?;
        log.line(format_args!("app {}", app.describe()));
        info!("✅ App {} {}", cfg.name, app.describe());

        for ip_type in fly::IP_TYPES {
            let ip = api
                .ensure_ip(&cfg.name, ip_type)
                .await
                .map_err(|e| DeployError::stage(format!("fly {ip_type} ip allocation"), e))?;
            log.line(format_args!("{ip_type} address {}", ip.describe()));
        }
        info!("✅ Public addresses allocated");

        if cfg.skip_volume {
            log.line("volume skipped, ledger storage is ephemeral");
        } else {
            let volume = volume_name(&cfg.name);
            match api
                .ensure_volume(&cfg.name, &volume, &cfg.region, cfg.resources.volume_size_gb)
                .await
            {
                Ok(ensured) => {
                    log.line(format_args!("volume {} {}", volume, ensured.describe()));
                    info!("✅ Volume {} {}", volume, ensured.describe());
                }
                Err(e) => {
                    // The validator still runs, on ephemeral storage; the next deploy retries
                    log.line(format_args!("warning: could not create volume {volume}: {e}"));
                    warn!("⚠️  Could not create volume {}: {}", volume, e);
                }
            }
        }

        let spec = fly::push_command(&flyctl, &cfg.name, token, org.as_deref(), &artifacts.dir)
            .timeout(self.push_timeout);
        info!("🚀 Running {}", spec.describe());
        let output = match process::run(&spec).await {
            Ok(output) => output,
            Err(e) => {
                let partial = e.output().unwrap_or_default();
                log.section("flyctl deploy --remote-only", partial);
                return Err(DeployError::stage_with_output(PUSH_STAGE, &e, partial));
            }
        };
        log.section("flyctl deploy --remote-only", &output.combined);
        if !output.success() {
            return Err(DeployError::stage_with_output(
                PUSH_STAGE,
                output.status,
                &output.combined,
            ));
        }

        let host = extract_host(&output.combined, Platform::Fly).unwrap_or_else(|| {
            log.line("hostname not found in flyctl output, using default");
            Platform::Fly.default_host(&cfg.name)
        });
        log.line(format_args!("host={host}"));

        Ok(Provisioned {
            host,
            dashboard_url: Some(format!("https://fly.io/apps/{}", cfg.name)),
        })
    }
}

#[async_trait]
impl Provider for FlyProvider {
    fn platform(&self) -> Platform {
        Platform::Fly
    }

    async fn deploy(
        &self,
        cfg: &DeploymentConfig,
        cancel: &CancellationToken,
    ) -> Result<Deployment, DeployError> {
        orchestrator::deploy(self, cfg, cancel).await
    }

    async fn destroy(&self, name: &str) -> Result<(), ProviderError> {
        let name = require_name(name)?;
        let api = self.authed_api()?;
        api.delete_app(name).await?;
        info!("🗑️  Deleted Fly app {}", name);
        Ok(())
    }

    async fn status(&self, name: &str) -> Result<ProviderStatus, ProviderError> {
        let name = require_name(name)?;
        let machines = self.authed_api()?.list_machines(name).await?;
        Ok(ProviderStatus {
            name: name.to_string(),
            state: fly::machine_state(&machines),
        })
    }

    async fn restart(&self, name: &str) -> Result<(), ProviderError> {
        let name = require_name(name)?;
        let api = self.authed_api()?;
        let machines = api.list_machines(name).await?;
        if machines.is_empty() {
            return Err(ProviderError::NoMachines {
                app: name.to_string(),
            });
        }
        for machine in &machines {
            api.restart_machine(name, &machine.id).await?;
            info!("🔄 Restarted machine {}", machine.id);
        }
        Ok(())
    }

    async fn verify_access_token(&self, token: &SecretString) -> Result<(), AuthError> {
        let api = self.api(SecretString::from(token.expose_secret().to_string()));
        verify_fly_token(&api).await
    }
}
