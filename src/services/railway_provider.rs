//! Railway provider
//!
//! Deploy order: project, `validator` service, environment, public domain,
//! ledger volume, then `railway up`. Resource ids are written to
//! `railway-ids.json` so later commands can find the project again.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{artifacts_dir, resolve_access_token, resolve_org, DeploymentConfig};
use crate::domain::naming::extract_host;
use crate::domain::{Deployment, Platform, ProviderStatus};
use crate::error::{AuthError, DeployError, ProviderError};
use crate::infrastructure::artifacts::Artifacts;
use crate::infrastructure::railway::{self, RailwayApi, RailwayIds};
use crate::infrastructure::process;
use crate::services::orchestrator::{self, DeployLog, Provisioned, Provisioner};
use crate::services::provider::{require_name, Provider, ProviderOptions};
use crate::services::token_verification::verify_railway_token;
use crate::tools::{self, tools as tool_names};

const PUSH_STAGE: &str = "railway up";
const PROJECT_STAGE: &str = "railway project";

pub struct RailwayProvider {
    options: ProviderOptions,
    graphql_url: String,
    /// Explicit railway binary, skipping PATH lookup
    railway: Option<String>,
    push_timeout: Duration,
}

impl RailwayProvider {
    pub fn new(options: ProviderOptions) -> Self {
        Self {
            options,
            graphql_url: railway::GRAPHQL_URL.to_string(),
            railway: None,
            push_timeout: railway::PUSH_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub fn with_endpoint(mut self, graphql_url: impl Into<String>) -> Self {
        self.graphql_url = graphql_url.into();
        self
    }

    #[cfg(test)]
    pub fn with_railway(mut self, path: impl Into<String>) -> Self {
        self.railway = Some(path.into());
        self
    }

    #[cfg(test)]
    pub fn with_push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = timeout;
        self
    }

    fn api(&self, token: SecretString) -> RailwayApi {
        RailwayApi::with_endpoint(token, &self.graphql_url)
    }

    fn token(&self) -> Result<SecretString, AuthError> {
        resolve_access_token(
            Platform::Railway,
            self.options.access_token.as_ref(),
            &self.options.credentials,
        )
    }

    fn authed_api(&self) -> Result<RailwayApi, ProviderError> {
        Ok(self.api(self.token()?))
    }

    fn ids(&self, name: &str) -> Result<RailwayIds, ProviderError> {
        RailwayIds::load(&artifacts_dir(&self.options.project_dir, name))
    }

    fn railway(&self) -> Result<String, DeployError> {
        match &self.railway {
            Some(path) => Ok(path.clone()),
            None => tools::require_tool(tool_names::RAILWAY).map_err(|e| DeployError::stage(PUSH_STAGE, e)),
        }
    }

    /// Explicit workspace, `SOL_CLOUD_RAILWAY_WORKSPACE`, stored, then discovered
    async fn workspace(&self, api: &RailwayApi, explicit: Option<&str>) -> Option<String> {
        let stored = match self.options.credentials.load() {
            Ok(creds) => creds.railway.org,
            Err(e) => {
                warn!("⚠️  Could not read stored Railway workspace: {}", e);
                None
            }
        };
        if let Some(workspace) = resolve_org(
            Platform::Railway,
            explicit,
            |key| std::env::var(key).ok(),
            stored.as_deref(),
        ) {
            return Some(workspace);
        }
        api.list_workspaces().await.into_iter().next().map(|w| w.id)
    }

    /// Find the project by name, creating it in the resolved workspace if absent
    async fn ensure_project(
        &self,
        api: &RailwayApi,
        cfg: &DeploymentConfig,
        log: &mut DeployLog,
    ) -> Result<String, DeployError> {
        let stage = |e| DeployError::stage(PROJECT_STAGE, e);

        if let Some(id) = api.find_project(&cfg.name).await.map_err(stage)? {
            log.line(format_args!("project {id} already present"));
            return Ok(id);
        }

        let workspace = self.workspace(api, cfg.org.as_deref()).await.ok_or_else(|| {
            DeployError::stage(
                PROJECT_STAGE,
                "could not resolve Railway workspace; run `sol-cloud auth railway` or pass --org",
            )
        })?;
        log.line(format_args!("workspace={workspace}"));

        match api.create_project(&cfg.name, &workspace).await {
            Ok(id) => {
                log.line(format_args!("project {id} created"));
                Ok(id)
            }
            Err(err) if railway::is_project_conflict(&err) => {
                debug!("Project {} reported as existing, listing again", cfg.name);
                let id = api.find_project(&cfg.name).await.map_err(stage)?.ok_or_else(|| {
                    DeployError::stage(PROJECT_STAGE, format!("{err}; project not visible to this token"))
                })?;
                log.line(format_args!("project {id} already present"));
                Ok(id)
            }
            Err(err) => Err(stage(err)),
        }
    }
}

#[async_trait]
impl Provisioner for RailwayProvider {
    fn platform(&self) -> Platform {
        Platform::Railway
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
        let railway_bin = self.railway()?;
        let api = self.api(SecretString::from(token.expose_secret().to_string()));
        log.line("api deploy started");
        log.line(format_args!("project={} region={}", cfg.name, cfg.region));

        let project_id = self.ensure_project(&api, cfg, log).await?;
        info!("✅ Project {} ready", cfg.name);

        let (service_id, service) = api
            .ensure_service(&project_id, railway::SERVICE_NAME)
            .await
            .map_err(|e| DeployError::stage("railway service", e))?;
        log.line(format_args!("service {service_id} {}", service.describe()));

        let environment_id = api
            .resolve_environment(&project_id)
            .await
            .map_err(|e| DeployError::stage("railway environment", e))?
            .ok_or_else(|| {
                DeployError::stage(
                    "railway environment",
                    format!("no environments found for project {project_id}"),
                )
            })?;
        log.line(format_args!("environment={environment_id}"));

        let mut ids = RailwayIds {
            project_id,
            service_id,
            environment_id,
            domain: String::new(),
        };
        // Saved before the push so destroy can clean up after a failed upload
        if let Err(e) = ids.save(&artifacts.dir) {
            warn!("⚠️  Could not save Railway ids: {}", e);
        }

        let (domain, ensured) = api
            .ensure_domain(&ids.project_id, &ids.service_id, &ids.environment_id)
            .await
            .map_err(|e| DeployError::stage("railway domain", e))?;
        match &domain {
            Some(domain) => log.line(format_args!("domain {domain} {}", ensured.describe())),
            None => log.line("domain not assigned yet"),
        }

        if cfg.skip_volume {
            log.line("volume skipped, ledger storage is ephemeral");
        } else {
            match api
                .ensure_volume(&ids.project_id, &ids.service_id, &ids.environment_id)
                .await
            {
                Ok(ensured) => log.line(format_args!("volume {}", ensured.describe())),
                Err(e) => {
                    log.line(format_args!("warning: could not attach volume: {e}"));
                    warn!("⚠️  Could not attach ledger volume: {}", e);
                }
            }
        }

        let push_token = match api
            .create_project_token(&ids.project_id, &ids.environment_id)
            .await
        {
            Ok(project_token) => project_token,
            Err(e) => {
                log.line(format_args!("warning: project token unavailable, using account token: {e}"));
                warn!("⚠️  Project token unavailable, pushing with the account token: {}", e);
                SecretString::from(token.expose_secret().to_string())
            }
        };

        let spec = railway::push_command(&railway_bin, &push_token, &ids, &artifacts.dir)
            .timeout(self.push_timeout);
        info!("🚀 Running {}", spec.describe());
        let output = match process::run(&spec).await {
            Ok(output) => output,
            Err(e) => {
                let partial = e.output().unwrap_or_default();
                log.section("railway up --ci", partial);
                return Err(DeployError::stage_with_output(PUSH_STAGE, &e, partial));
            }
        };
        log.section("railway up --ci", &output.combined);
        if !output.success() {
            return Err(DeployError::stage_with_output(
                PUSH_STAGE,
                output.status,
                &output.combined,
            ));
        }

        let host = domain
            .or_else(|| extract_host(&output.combined, Platform::Railway))
            .unwrap_or_else(|| {
                log.line("domain not found, using default");
                Platform::Railway.default_host(&cfg.name)
            });
        log.line(format_args!("host={host}"));

        ids.domain = host.clone();
        ids.save(&artifacts.dir)
            .map_err(|e| DeployError::stage("railway metadata", e))?;

        Ok(Provisioned {
            host,
            dashboard_url: Some(railway::dashboard_url(&ids.project_id)),
        })
    }
}

#[async_trait]
impl Provider for RailwayProvider {
    fn platform(&self) -> Platform {
        Platform::Railway
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
        let ids = self.ids(name)?;
        self.authed_api()?.delete_project(&ids.project_id).await?;
        info!("🗑️  Deleted Railway project {}", ids.project_id);
        Ok(())
    }

    async fn status(&self, name: &str) -> Result<ProviderStatus, ProviderError> {
        let name = require_name(name)?;
        let ids = self.ids(name)?;
        let state = self
            .authed_api()?
            .deployment_state(&ids.project_id, &ids.service_id)
            .await?;
        Ok(ProviderStatus {
            name: name.to_string(),
            state,
        })
    }

    async fn restart(&self, name: &str) -> Result<(), ProviderError> {
        let name = require_name(name)?;
        let ids = self.ids(name)?;
        let api = self.authed_api()?;
        let environment_id = if ids.environment_id.is_empty() {
            api.resolve_environment(&ids.project_id)
                .await?
                .ok_or_else(|| ProviderError::NoEnvironment {
                    project: ids.project_id.clone(),
                })?
        } else {
            ids.environment_id.clone()
        };
        api.redeploy(&environment_id, &ids.service_id).await?;
        info!("🔄 Redeployed Railway service {}", ids.service_id);
        Ok(())
    }

    async fn verify_access_token(&self, token: &SecretString) -> Result<(), AuthError> {
        let api = self.api(SecretString::from(token.expose_secret().to_string()));
        verify_railway_token(&api).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::CredentialsStore;
    use crate::test_support::serve;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::os::unix::fs::PermissionsExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Fake Railway API: projects appear once created, everything else is static
    #[derive(Clone, Default)]
    struct FakeRailway {
        project_created: Arc<AtomicBool>,
        /// `projectCreate` answers "already exists" and the project shows up on the next listing
        create_conflicts: bool,
        redeployed: Arc<Mutex<Option<Value>>>,
    }

    impl FakeRailway {
        fn router(self) -> Router {
            Router::new().route(
                "/graphql",
                post(move |Json(request): Json<Value>| {
                    let fake = self.clone();
                    async move { Json(fake.answer(&request)) }
                }),
            )
        }

        fn answer(&self, request: &Value) -> Value {
            let query = request["query"].as_str().unwrap_or_default();
            if query.contains("teamId") {
                let edges = if self.project_created.load(Ordering::SeqCst) {
                    json!([{"node": {"id": "proj-1", "name": "demo-validator", "teamId": "ws-1"}}])
                } else {
                    json!([])
                };
                return json!({"data": {"projects": {"edges": edges}}});
            }
            if query.contains("projectCreate") {
                self.project_created.store(true, Ordering::SeqCst);
                if self.create_conflicts {
                    return json!({"data": null, "errors": [{"message": "Project already exists"}]});
                }
                return json!({"data": {"projectCreate": {"id": "proj-1"}}});
            }
            if query.contains("serviceInstanceRedeploy") {
                *self.redeployed.lock().unwrap() = Some(request["variables"].clone());
                return json!({"data": {"serviceInstanceRedeploy": true}});
            }
            let routes: [(&str, Value); 8] = [
                (
                    "services { edges",
                    json!({"data": {"project": {"services": {"edges": [{"node": {"id": "svc-1", "name": "validator"}}]}}}}),
                ),
                (
                    "environments",
                    json!({"data": {"project": {"environments": {"edges": [{"node": {"id": "env-1", "name": "production"}}]}}}}),
                ),
                (
                    "serviceDomains",
                    json!({"data": {"domains": {"serviceDomains": [{"domain": "demo-validator-production.up.railway.app"}]}}}),
                ),
                (
                    "volumeInstances",
                    json!({"data": {"project": {"volumes": {"edges": []}}}}),
                ),
                ("volumeCreate", json!({"data": {"volumeCreate": {"id": "vol-1"}}})),
                ("projectTokenCreate", json!({"data": {"projectTokenCreate": "project-token"}})),
                (
                    "deployments(",
                    json!({"data": {"deployments": {"edges": [{"node": {"status": "SUCCESS"}}]}}}),
                ),
                ("projectDelete", json!({"data": {"projectDelete": true}})),
            ];
            routes
                .into_iter()
                .find(|(fragment, _)| query.contains(fragment))
                .map(|(_, response)| response)
                .unwrap_or_else(|| json!({"errors": [{"message": format!("unexpected query {query}")}]}))
        }
    }

    fn fake_railway_cli(dir: &TempDir) -> String {
        let bin_dir = dir.path().join("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();
        let path = bin_dir.join("railway");
        std::fs::write(
            &path,
            "#!/bin/sh\necho \"Uploading service $RAILWAY_SERVICE_ID\"\necho \"Deploy complete\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    async fn provider(dir: &TempDir, fake: FakeRailway) -> RailwayProvider {
        let base = serve(fake.router()).await;
        RailwayProvider::new(ProviderOptions {
            project_dir: dir.path().to_path_buf(),
            access_token: Some(SecretString::from("railway-token".to_string())),
            credentials: CredentialsStore::at(dir.path().join("credentials.json")),
        })
        .with_endpoint(format!("{base}/graphql"))
        .with_railway(fake_railway_cli(dir))
    }

    fn config(dir: &TempDir) -> DeploymentConfig {
        let mut cfg = DeploymentConfig::new("demo-validator", Platform::Railway, dir.path());
        cfg.org = Some("ws-1".to_string());
        cfg.health.skip = true;
        cfg
    }

    #[tokio::test]
    async fn test_deploy_persists_ids_for_later_commands() {
        let dir = TempDir::new().unwrap();
        let fake = FakeRailway::default();
        let redeployed = fake.redeployed.clone();
        let provider = provider(&dir, fake).await;
        let cfg = config(&dir);

        let deployment = provider
            .deploy(&cfg, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            deployment.rpc_url,
            "https://demo-validator-production.up.railway.app"
        );
        assert_eq!(
            deployment.dashboard_url.as_deref(),
            Some("https://railway.app/project/proj-1")
        );

        let ids = RailwayIds::load(&cfg.artifacts_dir()).unwrap();
        assert_eq!(ids.project_id, "proj-1");
        assert_eq!(ids.environment_id, "env-1");
        assert_eq!(ids.domain, "demo-validator-production.up.railway.app");

        let log = std::fs::read_to_string(cfg.artifacts_dir().join("deploy.log")).unwrap();
        assert!(log.contains("project proj-1 created"));
        assert!(log.contains("Uploading service svc-1"));

        let status = provider.status("demo-validator").await.unwrap();
        assert_eq!(status.state, "running");

        provider.restart("demo-validator").await.unwrap();
        let variables = redeployed.lock().unwrap().clone().unwrap();
        assert_eq!(variables["environmentId"], "env-1");
        assert_eq!(variables["serviceId"], "svc-1");

        provider.destroy("demo-validator").await.unwrap();
    }

    #[tokio::test]
    async fn test_project_conflict_adopts_existing_project() {
        let dir = TempDir::new().unwrap();
        let provider = provider(
            &dir,
            FakeRailway {
                create_conflicts: true,
                ..FakeRailway::default()
            },
        )
        .await;
        let cfg = config(&dir);

        provider
            .deploy(&cfg, &CancellationToken::new())
            .await
            .unwrap();
        let ids = RailwayIds::load(&cfg.artifacts_dir()).unwrap();
        assert_eq!(ids.project_id, "proj-1");
    }

    #[tokio::test]
    async fn test_commands_without_ids_report_missing_metadata() {
        let dir = TempDir::new().unwrap();
        let provider = provider(&dir, FakeRailway::default()).await;

        let err = provider.status("never-deployed").await.unwrap_err();
        assert!(matches!(err, ProviderError::Metadata { .. }));
    }
}
