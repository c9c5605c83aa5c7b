//! Persisted provider credentials and access token resolution.
//!
//! Credentials live in `<config dir>/sol-cloud/credentials.json`, written
//! atomically with owner-only permissions.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::write_atomic;
use crate::domain::Platform;
use crate::error::{AuthError, ConfigError};

const CREDENTIALS_FILE: &str = "credentials.json";

/// Fly organization used when nothing else is configured
pub const DEFAULT_FLY_ORG: &str = "personal";

/// Token environment variables, highest priority first
pub fn token_env_vars(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Fly => &["SOL_CLOUD_FLY_TOKEN", "FLY_ACCESS_TOKEN", "FLY_API_TOKEN"],
        Platform::Railway => &["SOL_CLOUD_RAILWAY_TOKEN", "RAILWAY_TOKEN", "RAILWAY_API_TOKEN"],
    }
}

/// Native env var named in "token not found" errors
pub fn primary_token_env_var(platform: Platform) -> &'static str {
    match platform {
        Platform::Fly => "FLY_ACCESS_TOKEN",
        Platform::Railway => "RAILWAY_TOKEN",
    }
}

fn org_env_var(platform: Platform) -> &'static str {
    match platform {
        Platform::Fly => "SOL_CLOUD_FLY_ORG",
        Platform::Railway => "SOL_CLOUD_RAILWAY_WORKSPACE",
    }
}

/// Stored credentials for one provider
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredentials {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_token: String,

    /// Fly org slug or Railway workspace id
    #[serde(
        default,
        alias = "org_slug",
        alias = "workspace_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub org: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("access_token", &"[REDACTED]")
            .field("org", &self.org)
            .field("verified_at", &self.verified_at)
            .finish()
    }
}

impl ProviderCredentials {
    fn normalize(&mut self) {
        self.access_token = self.access_token.trim().to_string();
        self.org = self
            .org
            .take()
            .map(|org| org.trim().to_string())
            .filter(|org| !org.is_empty());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub fly: ProviderCredentials,

    #[serde(default)]
    pub railway: ProviderCredentials,
}

impl Credentials {
    pub fn provider(&self, platform: Platform) -> &ProviderCredentials {
        match platform {
            Platform::Fly => &self.fly,
            Platform::Railway => &self.railway,
        }
    }

    pub fn provider_mut(&mut self, platform: Platform) -> &mut ProviderCredentials {
        match platform {
            Platform::Fly => &mut self.fly,
            Platform::Railway => &mut self.railway,
        }
    }
}

/// Location of the credentials file
#[derive(Debug, Clone)]
pub struct CredentialsStore {
    path: PathBuf,
}

impl CredentialsStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$SOL_CLOUD_CONFIG_DIR`, then `$XDG_CONFIG_HOME`, then `~/.config`
    pub fn default_location() -> Result<Self, ConfigError> {
        let non_empty = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let base = non_empty("SOL_CLOUD_CONFIG_DIR")
            .or_else(|| non_empty("XDG_CONFIG_HOME"))
            .map(PathBuf::from)
            .or_else(|| non_empty("HOME").map(|home| Path::new(&home).join(".config")))
            .ok_or_else(|| ConfigError::MissingField {
                field: "HOME (needed to locate credentials)".to_string(),
            })?;
        Ok(Self::at(base.join("sol-cloud").join(CREDENTIALS_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load credentials; a missing or empty file yields empty credentials
    pub fn load(&self) -> Result<Credentials, ConfigError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Credentials::default())
            }
            Err(err) => return Err(ConfigError::io(&self.path, err)),
        };
        if content.trim().is_empty() {
            return Ok(Credentials::default());
        }

        let mut creds: Credentials =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;
        creds.fly.normalize();
        creds.railway.normalize();
        Ok(creds)
    }

    pub fn save(&self, creds: &Credentials) -> Result<(), ConfigError> {
        let mut creds = creds.clone();
        creds.fly.normalize();
        creds.railway.normalize();

        let mut payload = serde_json::to_vec_pretty(&creds).map_err(|e| ConfigError::ParseError {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        payload.push(b'\n');
        write_atomic(&self.path, &payload, 0o600)
    }
}

/// Pick the access token: explicit override, env vars, then the store
pub fn resolve_access_token(
    platform: Platform,
    explicit: Option<&SecretString>,
    store: &CredentialsStore,
) -> Result<SecretString, AuthError> {
    resolve_access_token_with(
        platform,
        explicit,
        |key| std::env::var(key).ok(),
        || store.load(),
    )
}

/// Token resolution with injectable lookups
pub fn resolve_access_token_with(
    platform: Platform,
    explicit: Option<&SecretString>,
    env: impl Fn(&str) -> Option<String>,
    stored: impl FnOnce() -> Result<Credentials, ConfigError>,
) -> Result<SecretString, AuthError> {
    if let Some(token) = explicit.filter(|t| !t.expose_secret().trim().is_empty()) {
        return Ok(SecretString::from(token.expose_secret().to_string()));
    }

    for key in token_env_vars(platform) {
        if let Some(value) = env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            tracing::debug!("Using {} token from {}", platform, key);
            return Ok(SecretString::from(value));
        }
    }

    let creds = stored()?;
    let token = &creds.provider(platform).access_token;
    if token.is_empty() {
        return Err(AuthError::TokenNotFound {
            provider: platform.as_str(),
            env_var: primary_token_env_var(platform),
        });
    }
    Ok(SecretString::from(token.clone()))
}

/// Org/workspace: explicit, env var, stored, then the Fly default
pub fn resolve_org(
    platform: Platform,
    explicit: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
    stored: Option<&str>,
) -> Option<String> {
    let clean = |value: &str| Some(value.trim().to_string()).filter(|v| !v.is_empty());

    explicit
        .and_then(clean)
        .or_else(|| env(org_env_var(platform)).as_deref().and_then(clean))
        .or_else(|| stored.and_then(clean))
        .or_else(|| (platform == Platform::Fly).then(|| DEFAULT_FLY_ORG.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn stored(token: &str) -> impl FnOnce() -> Result<Credentials, ConfigError> {
        let mut creds = Credentials::default();
        creds.fly.access_token = token.to_string();
        move || Ok(creds)
    }

    #[test]
    fn test_explicit_token_wins() {
        let explicit = SecretString::from("explicit".to_string());
        let token = resolve_access_token_with(
            Platform::Fly,
            Some(&explicit),
            env_from(&[("FLY_ACCESS_TOKEN", "env")]),
            stored("stored"),
        )
        .unwrap();
        assert_eq!(token.expose_secret(), "explicit");
    }

    #[test]
    fn test_sol_cloud_env_beats_native_env() {
        let token = resolve_access_token_with(
            Platform::Fly,
            None,
            env_from(&[("FLY_ACCESS_TOKEN", "native"), ("SOL_CLOUD_FLY_TOKEN", "ours")]),
            stored("stored"),
        )
        .unwrap();
        assert_eq!(token.expose_secret(), "ours");
    }

    #[test]
    fn test_store_is_last_resort() {
        let token =
            resolve_access_token_with(Platform::Fly, None, env_from(&[("FLY_ACCESS_TOKEN", "  ")]), stored("stored"))
                .unwrap();
        assert_eq!(token.expose_secret(), "stored");
    }

    #[test]
    fn test_missing_token_names_auth_command() {
        let err = resolve_access_token_with(Platform::Railway, None, env_from(&[]), stored("fly-only"))
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::TokenNotFound {
                provider: "railway",
                env_var: "RAILWAY_TOKEN"
            }
        ));
    }

    #[test]
    fn test_resolve_org_priority() {
        let env = env_from(&[("SOL_CLOUD_FLY_ORG", "env-org")]);
        assert_eq!(
            resolve_org(Platform::Fly, Some("flag-org"), &env, Some("stored")).as_deref(),
            Some("flag-org")
        );
        assert_eq!(
            resolve_org(Platform::Fly, None, &env, Some("stored")).as_deref(),
            Some("env-org")
        );
        assert_eq!(
            resolve_org(Platform::Fly, None, env_from(&[]), Some("stored")).as_deref(),
            Some("stored")
        );
        assert_eq!(
            resolve_org(Platform::Fly, None, env_from(&[]), None).as_deref(),
            Some(DEFAULT_FLY_ORG)
        );
        assert_eq!(resolve_org(Platform::Railway, None, env_from(&[]), None), None);
    }

    #[test]
    fn test_save_and_load_round_trip_with_owner_only_mode() {
        let dir = TempDir::new().unwrap();
        let store = CredentialsStore::at(dir.path().join("sol-cloud").join("credentials.json"));

        let mut creds = Credentials::default();
        creds.fly.access_token = " fo1_token \n".to_string();
        creds.fly.org = Some("  ".to_string());
        creds.railway.org = Some("ws-123".to_string());
        store.save(&creds).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.fly.access_token, "fo1_token");
        assert_eq!(loaded.fly.org, None);
        assert_eq!(loaded.railway.org.as_deref(), Some("ws-123"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_legacy_org_slug_field_is_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"fly":{"access_token":"t","org_slug":"acme"}}"#).unwrap();

        let creds = CredentialsStore::at(&path).load().unwrap();
        assert_eq!(creds.fly.org.as_deref(), Some("acme"));
        assert!(!format!("{:?}", creds).contains("\"t\""));
    }
}
