//! Local deployment state (`.sol-cloud/state.json`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::write_atomic;
use crate::domain::{Deployment, Platform};
use crate::error::{ConfigError, StateError};

const STATE_DIR: &str = ".sol-cloud";
const STATE_FILE: &str = "state.json";

/// A deployed validator as remembered locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub name: String,
    pub provider: Platform,
    pub rpc_url: String,
    pub websocket_url: String,
    #[serde(default)]
    pub region: String,
    pub artifacts_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeploymentRecord {
    pub fn from_deployment(deployment: &Deployment, region: &str) -> Self {
        let now = Utc::now();
        Self {
            name: deployment.name.clone(),
            provider: deployment.platform,
            rpc_url: deployment.rpc_url.clone(),
            websocket_url: deployment.websocket_url.clone(),
            region: region.to_string(),
            artifacts_dir: deployment.artifacts_dir.clone(),
            dashboard_url: deployment.dashboard_url.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Known deployments for one project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deployment: Option<String>,
    #[serde(default)]
    pub deployments: BTreeMap<String, DeploymentRecord>,
}

impl State {
    /// Insert or replace a record, keeping the original creation time
    pub fn upsert(&mut self, mut record: DeploymentRecord) {
        let now = Utc::now();
        record.created_at = self
            .deployments
            .get(&record.name)
            .map(|existing| existing.created_at)
            .unwrap_or(record.created_at);
        record.updated_at = now;

        self.last_deployment = Some(record.name.clone());
        self.deployments.insert(record.name.clone(), record);
    }

    /// Drop a record; the last-deployment pointer moves to the most recently updated survivor
    pub fn remove(&mut self, name: &str) -> Option<DeploymentRecord> {
        let removed = self.deployments.remove(name.trim());
        if self.last_deployment.as_deref() == Some(name.trim()) {
            self.last_deployment = self
                .deployments
                .values()
                .max_by_key(|record| record.updated_at)
                .map(|record| record.name.clone());
        }
        removed
    }

    /// Look a deployment up by name, or fall back to the last one
    pub fn resolve(&self, name: Option<&str>) -> Result<&DeploymentRecord, StateError> {
        if self.deployments.is_empty() {
            return Err(StateError::NoDeployments);
        }

        let target = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => match &self.last_deployment {
                Some(last) => last.clone(),
                None if self.deployments.len() == 1 => {
                    self.deployments.keys().next().cloned().unwrap_or_default()
                }
                None => return Err(StateError::NameRequired),
            },
        };

        self.deployments
            .get(&target)
            .ok_or(StateError::NotFound(target))
    }
}

/// Reads and writes `state.json` under a project directory
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn for_project(project_dir: &Path) -> Self {
        Self {
            path: project_dir.join(STATE_DIR).join(STATE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load state; a missing or empty file is an empty state
    pub fn load(&self) -> Result<State, ConfigError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(State::default()),
            Err(err) => return Err(ConfigError::io(&self.path, err)),
        };
        if content.trim().is_empty() {
            return Ok(State::default());
        }
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn save(&self, state: &State) -> Result<(), ConfigError> {
        let mut payload = serde_json::to_vec_pretty(state).map_err(|e| ConfigError::ParseError {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        payload.push(b'\n');
        write_atomic(&self.path, &payload, 0o644)
    }

    /// Load, modify and save in one step
    pub fn update<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T, ConfigError> {
        let mut state = self.load()?;
        let result = f(&mut state);
        self.save(&state)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn record(name: &str) -> DeploymentRecord {
        let deployment = Deployment::from_host(
            name,
            Platform::Fly,
            &format!("{name}.fly.dev"),
            format!("/tmp/{name}"),
        );
        DeploymentRecord::from_deployment(&deployment, "ord")
    }

    #[test]
    fn test_missing_file_is_empty_state() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::for_project(dir.path());
        assert_eq!(store.load().unwrap(), State::default());
    }

    #[test]
    fn test_upsert_preserves_created_at() {
        let mut state = State::default();
        let mut first = record("alpha");
        first.created_at = Utc::now() - Duration::days(3);
        let created = first.created_at;
        state.upsert(first);

        state.upsert(record("alpha"));
        let stored = &state.deployments["alpha"];
        assert_eq!(stored.created_at, created);
        assert!(stored.updated_at > created);
        assert_eq!(state.last_deployment.as_deref(), Some("alpha"));
    }

    #[test]
    fn test_remove_repoints_last_deployment() {
        let mut state = State::default();
        state.upsert(record("alpha"));
        state.upsert(record("beta"));
        assert_eq!(state.last_deployment.as_deref(), Some("beta"));

        assert!(state.remove("beta").is_some());
        assert_eq!(state.last_deployment.as_deref(), Some("alpha"));

        state.remove("alpha");
        assert_eq!(state.last_deployment, None);
        assert_eq!(state.resolve(None), Err(StateError::NoDeployments));
    }

    #[test]
    fn test_resolve() {
        let mut state = State::default();
        state.upsert(record("alpha"));
        state.upsert(record("beta"));

        assert_eq!(state.resolve(None).unwrap().name, "beta");
        assert_eq!(state.resolve(Some("alpha")).unwrap().name, "alpha");
        assert_eq!(
            state.resolve(Some("gamma")),
            Err(StateError::NotFound("gamma".to_string()))
        );

        state.last_deployment = None;
        assert_eq!(state.resolve(None), Err(StateError::NameRequired));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::for_project(dir.path());
        store.update(|state| state.upsert(record("alpha"))).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.last_deployment.as_deref(), Some("alpha"));
        assert_eq!(loaded.deployments["alpha"].rpc_url, "https://alpha.fly.dev");
        assert!(store.path().ends_with(".sol-cloud/state.json"));
    }

    #[test]
    fn test_malformed_state_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::for_project(dir.path());
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();

        assert!(matches!(store.load(), Err(ConfigError::ParseError { .. })));
    }
}
