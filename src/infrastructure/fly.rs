//! Fly.io platform adapter
//!
//! Apps, volumes and machines go through the Machines REST API, IP
//! allocation and identity lookups through the GraphQL API. The image build
//! and release is delegated to `flyctl deploy --remote-only`.
//!
//! Every ensure-style call treats the platform's "already exists" answers as
//! success so a deploy can be re-run with the same name.

use std::path::Path;
use std::time::Duration;

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::api_client::{contains_any, ApiClient, Ensured, RawResponse};
use super::process::CommandSpec;
use crate::error::ApiError;

pub const MACHINES_API_URL: &str = "https://api.machines.dev/v1";
pub const GRAPHQL_URL: &str = "https://api.fly.io/graphql";

/// Body fragments of a 409/422 app-create response meaning the app exists
pub const APP_CONFLICT_MARKERS: &[&str] = &[
    "already exists",
    "already taken",
    "already been taken",
    "name is taken",
];

/// GraphQL error fragments meaning the address is already allocated
pub const IP_CONFLICT_MARKERS: &[&str] = &["already has", "already allocated"];

/// Address kinds allocated for every app
pub const IP_TYPES: [&str; 2] = ["shared_v4", "v6"];

/// Prefix of the app name used to probe token capabilities
pub const TOKEN_PROBE_PREFIX: &str = "sol-cloud-token-probe";

/// Deadline for `flyctl deploy`
pub const PUSH_TIMEOUT: Duration = Duration::from_secs(20 * 60);

const ALLOCATE_IP_MUTATION: &str =
    "mutation($input: AllocateIPAddressInput!) { allocateIpAddress(input: $input) { ipAddress { id } } }";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Machine {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Volume {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub size_gb: u32,
}

/// The machines list comes back either bare or wrapped
#[derive(Deserialize)]
#[serde(untagged)]
enum MachineList {
    Bare(Vec<Machine>),
    Wrapped { machines: Vec<Machine> },
}

#[derive(Serialize)]
struct CreateAppRequest<'a> {
    app_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    org_slug: Option<&'a str>,
}

#[derive(Serialize)]
struct CreateVolumeRequest<'a> {
    name: &'a str,
    region: &'a str,
    size_gb: u32,
}

#[derive(Deserialize)]
struct ViewerData {
    viewer: Viewer,
}

#[derive(Deserialize)]
struct Viewer {
    id: String,
}

/// A 409/422 app-create failure whose body says the name is already in use
pub fn is_app_conflict(err: &ApiError) -> bool {
    matches!(err.status(), Some(409 | 422))
        && err
            .body()
            .is_some_and(|body| contains_any(body, APP_CONFLICT_MARKERS))
}

/// A GraphQL allocation error saying the address already exists
pub fn is_ip_conflict(err: &ApiError) -> bool {
    err.graphql_messages()
        .iter()
        .any(|message| contains_any(message, IP_CONFLICT_MARKERS))
}

/// Summarise machine states: any started machine means running
pub fn machine_state(machines: &[Machine]) -> String {
    if machines.iter().any(|m| m.state.eq_ignore_ascii_case("started")) {
        return "running".to_string();
    }
    match machines.first() {
        None => "stopped".to_string(),
        Some(machine) if machine.state.trim().is_empty() => "unknown".to_string(),
        Some(machine) => machine.state.to_lowercase(),
    }
}

fn app_path(app: &str) -> String {
    format!("/apps/{}", urlencoding::encode(app))
}

/// Machines and GraphQL API client bound to one access token
pub struct FlyApi {
    client: ApiClient,
}

impl FlyApi {
    pub fn new(token: SecretString) -> Self {
        Self::with_endpoints(token, MACHINES_API_URL, GRAPHQL_URL)
    }

    pub fn with_endpoints(token: SecretString, machines_url: &str, graphql_url: &str) -> Self {
        Self {
            client: ApiClient::new(token)
                .with_rest_base(machines_url)
                .with_graphql_url(graphql_url),
        }
    }

    /// Create the app, treating a name conflict as success
    pub async fn ensure_app(&self, app: &str, org: Option<&str>) -> Result<Ensured, ApiError> {
        let request = CreateAppRequest {
            app_name: app,
            org_slug: org.map(str::trim).filter(|o| !o.is_empty()),
        };
        let body = serde_json::to_value(&request).map_err(|e| ApiError::Decode {
            url: self.client.rest_url("/apps"),
            message: e.to_string(),
        })?;

        match self
            .client
            .rest_no_content(Method::POST, "/apps", Some(&body))
            .await
        {
            Ok(()) => Ok(Ensured::Created),
            Err(err) if is_app_conflict(&err) => {
                tracing::debug!("App {} already exists", app);
                Ok(Ensured::Existing)
            }
            Err(err) => Err(err),
        }
    }

    /// Allocate one public address of `ip_type` (`shared_v4` or `v6`)
    pub async fn ensure_ip(&self, app: &str, ip_type: &str) -> Result<Ensured, ApiError> {
        let variables = json!({ "input": { "appId": app, "type": ip_type } });
        match self
            .client
            .graphql::<serde_json::Value>(ALLOCATE_IP_MUTATION, variables)
            .await
        {
            Ok(_) => Ok(Ensured::Created),
            Err(err) if is_ip_conflict(&err) => {
                tracing::debug!("App {} already has a {} address", app, ip_type);
                Ok(Ensured::Existing)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn list_volumes(&self, app: &str) -> Result<Vec<Volume>, ApiError> {
        let path = format!("{}/volumes", app_path(app));
        self.client.rest(Method::GET, &path, None).await
    }

    pub async fn create_volume(
        &self,
        app: &str,
        name: &str,
        region: &str,
        size_gb: u32,
    ) -> Result<Volume, ApiError> {
        let path = format!("{}/volumes", app_path(app));
        let request = CreateVolumeRequest {
            name,
            region,
            size_gb,
        };
        let body = serde_json::to_value(&request).map_err(|e| ApiError::Decode {
            url: self.client.rest_url(&path),
            message: e.to_string(),
        })?;
        self.client.rest(Method::POST, &path, Some(&body)).await
    }

    /// List first, create only when no volume carries `name`
    pub async fn ensure_volume(
        &self,
        app: &str,
        name: &str,
        region: &str,
        size_gb: u32,
    ) -> Result<Ensured, ApiError> {
        let volumes = self.list_volumes(app).await?;
        if volumes.iter().any(|v| v.name == name) {
            tracing::debug!("Volume {} already exists for {}", name, app);
            return Ok(Ensured::Existing);
        }
        self.create_volume(app, name, region, size_gb).await?;
        Ok(Ensured::Created)
    }

    pub async fn list_machines(&self, app: &str) -> Result<Vec<Machine>, ApiError> {
        let path = format!("{}/machines", app_path(app));
        let list: MachineList = self.client.rest(Method::GET, &path, None).await?;
        Ok(match list {
            MachineList::Bare(machines) => machines,
            MachineList::Wrapped { machines } => machines,
        })
    }

    pub async fn restart_machine(&self, app: &str, machine_id: &str) -> Result<(), ApiError> {
        let path = format!(
            "{}/machines/{}/restart",
            app_path(app),
            urlencoding::encode(machine_id)
        );
        self.client.rest_no_content(Method::POST, &path, None).await
    }

    /// Delete the app; an app that is already gone counts as deleted
    pub async fn delete_app(&self, app: &str) -> Result<(), ApiError> {
        match self
            .client
            .rest_no_content(Method::DELETE, &app_path(app), None)
            .await
        {
            Err(err) if err.status() == Some(404) => {
                tracing::debug!("App {} was already deleted", app);
                Ok(())
            }
            other => other,
        }
    }

    /// Look up an app name that cannot exist and hand back the raw answer
    pub async fn probe_app(&self, app: &str) -> Result<RawResponse, ApiError> {
        self.client.send_raw(Method::GET, &app_path(app), None).await
    }

    /// `query { viewer { id } }`
    pub async fn viewer_id(&self) -> Result<String, ApiError> {
        let data: ViewerData = self
            .client
            .graphql("query { viewer { id } }", json!({}))
            .await?;
        Ok(data.viewer.id)
    }
}

/// `flyctl deploy` for the rendered artifacts directory
pub fn push_command(
    flyctl: &str,
    app: &str,
    token: &SecretString,
    org: Option<&str>,
    artifacts_dir: &Path,
) -> CommandSpec {
    let mut spec = CommandSpec::new(flyctl)
        .args([
            "deploy",
            "--app",
            app,
            "--config",
            "fly.toml",
            "--remote-only",
            "--ha=false",
            "--wait-timeout=15m",
            "--yes",
        ])
        .current_dir(artifacts_dir)
        .env("FLY_ACCESS_TOKEN", token.expose_secret())
        .timeout(PUSH_TIMEOUT);
    if let Some(org) = org.map(str::trim).filter(|o| !o.is_empty()) {
        spec = spec.env("FLY_ORG", org);
    }
    spec
}
