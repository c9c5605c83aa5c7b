//! Railway platform adapter
//!
//! Everything goes through the GraphQL API except the build itself, which is
//! uploaded with `railway up`. Resource ids are written to
//! `railway-ids.json` beside the artifacts so destroy, status and restart can
//! find the project again.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::api_client::{contains_any, ApiClient, Ensured};
use super::artifacts::LEDGER_DIR;
use super::process::CommandSpec;
use crate::config::write_atomic;
use crate::error::{ApiError, ConfigError, ProviderError};

pub const GRAPHQL_URL: &str = "https://backboard.railway.app/graphql/v2";

/// `projectCreate` error fragments meaning the project exists
pub const PROJECT_CONFLICT_MARKERS: &[&str] = &["already exists"];

/// `serviceDomainCreate` error fragments meaning a domain exists
pub const DOMAIN_CONFLICT_MARKERS: &[&str] = &["already"];

/// `volumeCreate` error fragments meaning a volume exists
pub const VOLUME_CONFLICT_MARKERS: &[&str] = &["already", "exist"];

/// `projectDelete` error fragments meaning the project is gone
pub const NOT_FOUND_MARKERS: &[&str] = &["not found", "does not exist"];

/// Service holding the validator inside the project
pub const SERVICE_NAME: &str = "validator";

/// Environment preferred when a project has several
pub const PREFERRED_ENVIRONMENT: &str = "production";

pub const IDS_FILE: &str = "railway-ids.json";

/// Deadline for `railway up`
pub const PUSH_TIMEOUT: Duration = Duration::from_secs(20 * 60);

const PROJECT_TOKEN_NAME: &str = "sol-cloud-deploy";

/// Resource ids kept for later destroy/status/restart calls
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RailwayIds {
    pub project_id: String,
    pub service_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub environment_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,
}

impl RailwayIds {
    pub fn path(artifacts_dir: &Path) -> PathBuf {
        artifacts_dir.join(IDS_FILE)
    }

    pub fn load(artifacts_dir: &Path) -> Result<Self, ProviderError> {
        let path = Self::path(artifacts_dir);
        let metadata_error = |message: String| ProviderError::Metadata {
            path: path.clone(),
            message,
        };
        let content = std::fs::read_to_string(&path).map_err(|e| metadata_error(e.to_string()))?;
        let ids: Self = serde_json::from_str(&content).map_err(|e| metadata_error(e.to_string()))?;
        if ids.project_id.trim().is_empty() || ids.service_id.trim().is_empty() {
            return Err(metadata_error("project_id and service_id are required".to_string()));
        }
        Ok(ids)
    }

    pub fn save(&self, artifacts_dir: &Path) -> Result<(), ConfigError> {
        let path = Self::path(artifacts_dir);
        let mut payload = serde_json::to_vec_pretty(self).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        payload.push(b'\n');
        write_atomic(&path, &payload, 0o644)
    }
}

/// A Railway workspace (called a team in parts of the API)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Workspace {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "teamId")]
    pub team_id: Option<String>,
}

#[derive(Deserialize)]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    edges: Vec<Edge<T>>,
}

#[derive(Deserialize)]
struct Edge<T> {
    node: T,
}

impl<T> Connection<T> {
    fn into_nodes(self) -> Vec<T> {
        self.edges.into_iter().map(|edge| edge.node).collect()
    }
}

#[derive(Deserialize)]
struct Named {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Deserialize)]
struct ProjectsData {
    projects: Connection<Project>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectResources {
    #[serde(default)]
    services: Option<Connection<Named>>,
    #[serde(default)]
    environments: Option<Connection<Named>>,
    #[serde(default)]
    volumes: Option<Connection<VolumeNode>>,
}

#[derive(Deserialize)]
struct ProjectData {
    project: ProjectResources,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeNode {
    volume_instances: Connection<VolumeInstance>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeInstance {
    #[serde(default)]
    service_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DomainsData {
    domains: ServiceDomains,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceDomains {
    #[serde(default)]
    service_domains: Vec<DomainNode>,
}

#[derive(Deserialize)]
struct DomainNode {
    #[serde(default)]
    domain: String,
}

#[derive(Deserialize)]
struct DeploymentNode {
    #[serde(default)]
    status: String,
}

/// Map Railway's latest deployment status onto the provider state names
pub fn map_deployment_status(status: &str) -> String {
    let status = status.trim().to_lowercase();
    match status.as_str() {
        "success" => "running".to_string(),
        "deploying" | "building" => "starting".to_string(),
        "failed" | "crashed" => "stopped".to_string(),
        "" => "unknown".to_string(),
        _ => status,
    }
}

fn first_message_matches(err: &ApiError, markers: &[&str]) -> bool {
    err.graphql_messages()
        .iter()
        .any(|message| contains_any(message, markers))
}

/// `projectCreate` failed because the project already exists
pub fn is_project_conflict(err: &ApiError) -> bool {
    first_message_matches(err, PROJECT_CONFLICT_MARKERS)
}

pub fn is_domain_conflict(err: &ApiError) -> bool {
    first_message_matches(err, DOMAIN_CONFLICT_MARKERS)
}

pub fn is_volume_conflict(err: &ApiError) -> bool {
    first_message_matches(err, VOLUME_CONFLICT_MARKERS)
}

pub fn is_not_found(err: &ApiError) -> bool {
    first_message_matches(err, NOT_FOUND_MARKERS)
}

/// GraphQL client for the Railway public API
pub struct RailwayApi {
    client: ApiClient,
}

impl RailwayApi {
    pub fn new(token: SecretString) -> Self {
        Self::with_endpoint(token, GRAPHQL_URL)
    }

    pub fn with_endpoint(token: SecretString, graphql_url: &str) -> Self {
        Self {
            client: ApiClient::new(token).with_graphql_url(graphql_url),
        }
    }

    async fn query<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T, ApiError> {
        self.client.graphql(query, variables).await
    }

    /// `query { me { id } }`
    pub async fn me_id(&self) -> Result<String, ApiError> {
        #[derive(Deserialize)]
        struct Me {
            me: Created,
        }
        let data: Me = self.query("query { me { id } }", json!({})).await?;
        Ok(data.me.id)
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
        let data: ProjectsData = self
            .query(
                "query { projects { edges { node { id name teamId } } } }",
                json!({}),
            )
            .await?;
        Ok(data.projects.into_nodes())
    }

    /// Minimal project listing used to verify project-scoped tokens
    pub async fn project_ids(&self) -> Result<Vec<String>, ApiError> {
        #[derive(Deserialize)]
        struct Data {
            projects: Connection<Created>,
        }
        let data: Data = self
            .query("query { projects { edges { node { id } } } }", json!({}))
            .await?;
        Ok(data.projects.into_nodes().into_iter().map(|p| p.id).collect())
    }

    pub async fn find_project(&self, name: &str) -> Result<Option<String>, ApiError> {
        let projects = self.list_projects().await?;
        Ok(projects.into_iter().find(|p| p.name == name).map(|p| p.id))
    }

    pub async fn create_project(&self, name: &str, workspace_id: &str) -> Result<String, ApiError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data {
            project_create: Created,
        }
        let data: Data = self
            .query(
                "mutation ProjectCreate($input: ProjectCreateInput!) { projectCreate(input: $input) { id } }",
                json!({ "input": { "name": name, "workspaceId": workspace_id } }),
            )
            .await?;
        non_empty_id(data.project_create.id, "projectCreate")
    }

    /// Workspaces visible to the token
    ///
    /// Tries `me { teams }`, then `me { workspaces }`, then the `teamId` of
    /// existing projects. Finding nothing is not an error.
    pub async fn list_workspaces(&self) -> Vec<Workspace> {
        for field in ["teams", "workspaces"] {
            match self.workspaces_via_me(field).await {
                Ok(found) if !found.is_empty() => return found,
                Ok(_) => {}
                Err(e) => tracing::debug!("Workspace lookup via me.{} failed: {}", field, e),
            }
        }

        match self.list_projects().await {
            Ok(projects) => projects
                .into_iter()
                .filter_map(|p| p.team_id.filter(|id| !id.is_empty()))
                .map(|id| Workspace {
                    id,
                    name: String::new(),
                })
                .take(1)
                .collect(),
            Err(e) => {
                tracing::debug!("Workspace lookup via projects failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn workspaces_via_me(&self, field: &str) -> Result<Vec<Workspace>, ApiError> {
        let query = format!("query {{ me {{ {field} {{ id name }} }} }}");
        let data: Value = self.query(&query, json!({})).await?;
        let items = data["me"][field].clone();
        if items.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(items).map_err(|e| ApiError::Decode {
            url: GRAPHQL_URL.to_string(),
            message: e.to_string(),
        })
    }

    async fn project_resources(&self, project_id: &str, selection: &str) -> Result<ProjectResources, ApiError> {
        let query = format!("query Project($id: String!) {{ project(id: $id) {{ {selection} }} }}");
        let data: ProjectData = self.query(&query, json!({ "id": project_id })).await?;
        Ok(data.project)
    }

    /// Find or create the named service in the project
    pub async fn ensure_service(&self, project_id: &str, name: &str) -> Result<(String, Ensured), ApiError> {
        let resources = self
            .project_resources(project_id, "services { edges { node { id name } } }")
            .await?;
        let existing = resources
            .services
            .map(Connection::into_nodes)
            .unwrap_or_default()
            .into_iter()
            .find(|s| s.name == name);
        if let Some(service) = existing {
            return Ok((service.id, Ensured::Existing));
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data {
            service_create: Created,
        }
        let data: Data = self
            .query(
                "mutation ServiceCreate($input: ServiceCreateInput!) { serviceCreate(input: $input) { id } }",
                json!({ "input": { "projectId": project_id, "name": name } }),
            )
            .await?;
        Ok((non_empty_id(data.service_create.id, "serviceCreate")?, Ensured::Created))
    }

    /// The `production` environment, else the first one
    pub async fn resolve_environment(&self, project_id: &str) -> Result<Option<String>, ApiError> {
        let resources = self
            .project_resources(project_id, "environments { edges { node { id name } } }")
            .await?;
        let environments = resources
            .environments
            .map(Connection::into_nodes)
            .unwrap_or_default();
        let preferred = environments
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(PREFERRED_ENVIRONMENT))
            .or_else(|| environments.first());
        Ok(preferred.map(|e| e.id.clone()))
    }

    /// The generated public domain of the service, if one exists
    pub async fn service_domain(
        &self,
        project_id: &str,
        service_id: &str,
        environment_id: &str,
    ) -> Result<Option<String>, ApiError> {
        let data: DomainsData = self
            .query(
                "query ServiceDomains($projectId: String!, $serviceId: String!, $environmentId: String!) { \
                 domains(projectId: $projectId, serviceId: $serviceId, environmentId: $environmentId) { \
                 serviceDomains { domain } } }",
                json!({
                    "projectId": project_id,
                    "serviceId": service_id,
                    "environmentId": environment_id,
                }),
            )
            .await?;
        Ok(data
            .domains
            .service_domains
            .into_iter()
            .map(|d| d.domain.trim().to_string())
            .find(|d| !d.is_empty()))
    }

    /// Existing domain, else a newly generated one
    pub async fn ensure_domain(
        &self,
        project_id: &str,
        service_id: &str,
        environment_id: &str,
    ) -> Result<(Option<String>, Ensured), ApiError> {
        if let Some(domain) = self.service_domain(project_id, service_id, environment_id).await? {
            return Ok((Some(domain), Ensured::Existing));
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data {
            service_domain_create: DomainNode,
        }
        let created: Result<Data, ApiError> = self
            .query(
                "mutation ServiceDomainCreate($input: ServiceDomainCreateInput!) { \
                 serviceDomainCreate(input: $input) { domain } }",
                json!({ "input": { "serviceId": service_id, "environmentId": environment_id } }),
            )
            .await;
        match created {
            Ok(data) => {
                let domain = data.service_domain_create.domain.trim().to_string();
                Ok(((!domain.is_empty()).then_some(domain), Ensured::Created))
            }
            Err(err) if is_domain_conflict(&err) => {
                let domain = self.service_domain(project_id, service_id, environment_id).await?;
                Ok((domain, Ensured::Existing))
            }
            Err(err) => Err(err),
        }
    }

    /// Attach a ledger volume to the service unless one is already attached
    pub async fn ensure_volume(
        &self,
        project_id: &str,
        service_id: &str,
        environment_id: &str,
    ) -> Result<Ensured, ApiError> {
        match self
            .project_resources(
                project_id,
                "volumes { edges { node { volumeInstances { edges { node { serviceId } } } } } }",
            )
            .await
        {
            Ok(resources) => {
                let attached = resources
                    .volumes
                    .map(Connection::into_nodes)
                    .unwrap_or_default()
                    .into_iter()
                    .flat_map(|v| v.volume_instances.into_nodes())
                    .any(|instance| instance.service_id == service_id);
                if attached {
                    return Ok(Ensured::Existing);
                }
            }
            Err(e) => tracing::debug!("Volume listing failed, trying create: {}", e),
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data {
            volume_create: Created,
        }
        let created: Result<Data, ApiError> = self
            .query(
                "mutation VolumeCreate($input: VolumeCreateInput!) { volumeCreate(input: $input) { id } }",
                json!({
                    "input": {
                        "projectId": project_id,
                        "mountPath": LEDGER_DIR,
                        "serviceId": service_id,
                        "environmentId": environment_id,
                    }
                }),
            )
            .await;
        match created {
            Ok(data) => {
                non_empty_id(data.volume_create.id, "volumeCreate")?;
                Ok(Ensured::Created)
            }
            Err(err) if is_volume_conflict(&err) => Ok(Ensured::Existing),
            Err(err) => Err(err),
        }
    }

    /// Project-scoped token for `railway up`
    pub async fn create_project_token(
        &self,
        project_id: &str,
        environment_id: &str,
    ) -> Result<SecretString, ApiError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data {
            project_token_create: String,
        }
        let data: Data = self
            .query(
                "mutation ProjectTokenCreate($input: ProjectTokenCreateInput!) { projectTokenCreate(input: $input) }",
                json!({
                    "input": {
                        "projectId": project_id,
                        "environmentId": environment_id,
                        "name": PROJECT_TOKEN_NAME,
                    }
                }),
            )
            .await?;
        let token = non_empty_id(data.project_token_create, "projectTokenCreate")?;
        Ok(SecretString::from(token))
    }

    /// Delete the project; a project that is already gone counts as deleted
    pub async fn delete_project(&self, project_id: &str) -> Result<(), ApiError> {
        let deleted: Result<Value, ApiError> = self
            .query(
                "mutation ProjectDelete($id: String!) { projectDelete(id: $id) }",
                json!({ "id": project_id }),
            )
            .await;
        match deleted {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => {
                tracing::debug!("Railway project {} was already deleted", project_id);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// State of the most recent deployment of the service
    pub async fn deployment_state(&self, project_id: &str, service_id: &str) -> Result<String, ApiError> {
        #[derive(Deserialize)]
        struct Data {
            deployments: Connection<DeploymentNode>,
        }
        let data: Data = self
            .query(
                "query Deployments($input: DeploymentListInput!) { \
                 deployments(input: $input) { edges { node { status } } } }",
                json!({ "input": { "projectId": project_id, "serviceId": service_id } }),
            )
            .await?;
        Ok(match data.deployments.into_nodes().first() {
            None => "stopped".to_string(),
            Some(latest) => map_deployment_status(&latest.status),
        })
    }

    pub async fn redeploy(&self, environment_id: &str, service_id: &str) -> Result<(), ApiError> {
        self.query::<Value>(
            "mutation ServiceInstanceRedeploy($environmentId: String!, $serviceId: String!) { \
             serviceInstanceRedeploy(environmentId: $environmentId, serviceId: $serviceId) }",
            json!({ "environmentId": environment_id, "serviceId": service_id }),
        )
        .await
        .map(|_| ())
    }
}

fn non_empty_id(id: String, operation: &str) -> Result<String, ApiError> {
    if id.trim().is_empty() {
        return Err(ApiError::Decode {
            url: GRAPHQL_URL.to_string(),
            message: format!("{operation} returned an empty id"),
        });
    }
    Ok(id)
}

/// `railway up` for the rendered artifacts directory
pub fn push_command(
    railway: &str,
    token: &SecretString,
    ids: &RailwayIds,
    artifacts_dir: &Path,
) -> CommandSpec {
    let mut spec = CommandSpec::new(railway)
        .args(["up", "--ci", "--service", ids.service_id.as_str()])
        .current_dir(artifacts_dir)
        .env("RAILWAY_TOKEN", token.expose_secret())
        .env("RAILWAY_PROJECT_ID", ids.project_id.as_str())
        .env("RAILWAY_SERVICE_ID", ids.service_id.as_str())
        .timeout(PUSH_TIMEOUT);
    if !ids.environment_id.is_empty() {
        spec = spec.env("RAILWAY_ENVIRONMENT_ID", ids.environment_id.as_str());
    }
    spec
}

/// Dashboard page of a project
pub fn dashboard_url(project_id: &str) -> String {
    format!("https://railway.app/project/{project_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use axum::routing::post;
    use axum::{Json, Router};
    use tempfile::TempDir;

    /// Fake GraphQL endpoint dispatching on a fragment of the query text
    fn graphql(routes: Vec<(&'static str, Value)>) -> Router {
        Router::new().route(
            "/graphql",
            post(move |Json(request): Json<Value>| {
                let routes = routes.clone();
                async move {
                    let query = request["query"].as_str().unwrap_or_default().to_string();
                    let response = routes
                        .iter()
                        .find(|(fragment, _)| query.contains(fragment))
                        .map(|(_, response)| response.clone())
                        .unwrap_or_else(|| json!({"errors": [{"message": format!("unexpected query {query}")}]}));
                    Json(response)
                }
            }),
        )
    }

    async fn api(routes: Vec<(&'static str, Value)>) -> RailwayApi {
        let base = serve(graphql(routes)).await;
        RailwayApi::with_endpoint(
            SecretString::from("railway-token".to_string()),
            &format!("{base}/graphql"),
        )
    }

    #[tokio::test]
    async fn test_environment_prefers_production() {
        let api = api(vec![(
            "environments",
            json!({"data": {"project": {"environments": {"edges": [
                {"node": {"id": "env-staging", "name": "staging"}},
                {"node": {"id": "env-prod", "name": "Production"}}
            ]}}}}),
        )])
        .await;

        let env = api.resolve_environment("p1").await.unwrap();
        assert_eq!(env.as_deref(), Some("env-prod"));
    }

    #[tokio::test]
    async fn test_existing_service_is_reused() {
        let api = api(vec![(
            "services",
            json!({"data": {"project": {"services": {"edges": [
                {"node": {"id": "svc-1", "name": "validator"}}
            ]}}}}),
        )])
        .await;

        let (id, ensured) = api.ensure_service("p1", SERVICE_NAME).await.unwrap();
        assert_eq!(id, "svc-1");
        assert_eq!(ensured, Ensured::Existing);
    }

    #[tokio::test]
    async fn test_domain_conflict_refetches_existing_domain() {
        // The first lookup finds nothing, creation then reports a conflict
        let lookups = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = lookups.clone();
        let router = Router::new().route(
            "/graphql",
            post(move |Json(request): Json<Value>| {
                let counter = counter.clone();
                async move {
                    let query = request["query"].as_str().unwrap_or_default();
                    if query.contains("serviceDomainCreate") {
                        return Json(json!({"errors": [{"message": "Service already has a domain"}]}));
                    }
                    let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    let domains = if n == 0 {
                        json!([])
                    } else {
                        json!([{"domain": "demo.up.railway.app"}])
                    };
                    Json(json!({"data": {"domains": {"serviceDomains": domains}}}))
                }
            }),
        );
        let base = serve(router).await;
        let api = RailwayApi::with_endpoint(
            SecretString::from("railway-token".to_string()),
            &format!("{base}/graphql"),
        );

        let (domain, ensured) = api.ensure_domain("p1", "svc-1", "env-1").await.unwrap();
        assert_eq!(domain.as_deref(), Some("demo.up.railway.app"));
        assert_eq!(ensured, Ensured::Existing);
    }

    #[tokio::test]
    async fn test_attached_volume_is_not_recreated() {
        let api = api(vec![(
            "volumeInstances",
            json!({"data": {"project": {"volumes": {"edges": [
                {"node": {"volumeInstances": {"edges": [{"node": {"serviceId": "svc-1"}}]}}}
            ]}}}}),
        )])
        .await;

        assert_eq!(
            api.ensure_volume("p1", "svc-1", "env-1").await.unwrap(),
            Ensured::Existing
        );
    }

    #[tokio::test]
    async fn test_delete_missing_project_is_success() {
        let api = api(vec![(
            "projectDelete",
            json!({"data": null, "errors": [{"message": "Project not found"}]}),
        )])
        .await;

        api.delete_project("p-gone").await.unwrap();
    }

    #[tokio::test]
    async fn test_workspaces_fall_back_to_project_team() {
        let api = api(vec![
            ("teams", json!({"errors": [{"message": "Cannot query field teams"}]})),
            ("workspaces", json!({"errors": [{"message": "Cannot query field workspaces"}]})),
            (
                "teamId",
                json!({"data": {"projects": {"edges": [
                    {"node": {"id": "p1", "name": "one", "teamId": "team-7"}}
                ]}}}),
            ),
        ])
        .await;

        let workspaces = api.list_workspaces().await;
        assert_eq!(workspaces.len(), 1);
        assert_eq!(workspaces[0].id, "team-7");
    }

    #[tokio::test]
    async fn test_deployment_state_maps_latest_status() {
        let api = api(vec![(
            "deployments",
            json!({"data": {"deployments": {"edges": [
                {"node": {"status": "BUILDING"}},
                {"node": {"status": "SUCCESS"}}
            ]}}}),
        )])
        .await;

        assert_eq!(api.deployment_state("p1", "svc-1").await.unwrap(), "starting");
    }

    #[test]
    fn test_map_deployment_status() {
        assert_eq!(map_deployment_status("SUCCESS"), "running");
        assert_eq!(map_deployment_status("DEPLOYING"), "starting");
        assert_eq!(map_deployment_status("CRASHED"), "stopped");
        assert_eq!(map_deployment_status("REMOVED"), "removed");
        assert_eq!(map_deployment_status(""), "unknown");
    }

    #[test]
    fn test_ids_round_trip_through_artifacts_dir() {
        let dir = TempDir::new().unwrap();
        let ids = RailwayIds {
            project_id: "p1".to_string(),
            service_id: "svc-1".to_string(),
            environment_id: "env-1".to_string(),
            domain: "demo.up.railway.app".to_string(),
        };
        ids.save(dir.path()).unwrap();
        assert_eq!(RailwayIds::load(dir.path()).unwrap(), ids);
    }

    #[test]
    fn test_missing_ids_file_is_metadata_error() {
        let dir = TempDir::new().unwrap();
        let err = RailwayIds::load(dir.path()).unwrap_err();
        assert!(matches!(err, ProviderError::Metadata { .. }));
    }

    #[test]
    fn test_push_command_targets_service() {
        let ids = RailwayIds {
            project_id: "p1".to_string(),
            service_id: "svc-1".to_string(),
            ..Default::default()
        };
        let token = SecretString::from("project-token".to_string());
        let spec = push_command("railway", &token, &ids, Path::new("/tmp"));
        assert_eq!(spec.describe(), "railway up --ci --service svc-1");
    }
}
