//! Deployment naming rules
//!
//! Names double as Fly app names and Railway service names, so they follow
//! the stricter DNS-label rules both platforms accept.

use std::sync::LazyLock;

use regex::Regex;

use super::deployment::Platform;
use crate::error::ConfigError;

/// Prefix for generated deployment names
pub const GENERATED_NAME_PREFIX: &str = "sol-cloud";

/// Fly volume names are capped at 30 characters
pub const MAX_VOLUME_NAME_LEN: usize = 30;

static NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{1,61}[a-z0-9]$").ok());

static FLY_HOST_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([a-zA-Z0-9-]+\.fly\.dev)").ok());

static RAILWAY_HOST_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([a-zA-Z0-9-]+\.up\.railway\.app)").ok());

/// Generate a fresh `sol-cloud-xxxxxxxx` name
pub fn generate_deployment_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", GENERATED_NAME_PREFIX, &id[..8])
}

/// Validate a deployment name, generating one when none was given
pub fn ensure_deployment_name(name: &str) -> Result<String, ConfigError> {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return Ok(generate_deployment_name());
    }
    validate_deployment_name(&name)?;
    Ok(name)
}

pub fn validate_deployment_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::MissingField {
            field: "name".to_string(),
        });
    }
    let valid = NAME_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(name));
    if !valid {
        return Err(ConfigError::invalid(
            "name",
            format!(
                "{name:?} (use 3-63 lowercase letters, digits or hyphens, starting and ending with a letter or digit)"
            ),
        ));
    }
    Ok(())
}

/// Ledger volume name for a deployment
///
/// Hyphens become underscores and the result is cut to the platform limit.
pub fn volume_name(name: &str) -> String {
    let mut volume = format!("{}_ledger", name.replace('-', "_"));
    volume.truncate(MAX_VOLUME_NAME_LEN);
    volume
}

/// Find the public hostname in a platform CLI's output
pub fn extract_host(output: &str, platform: Platform) -> Option<String> {
    let pattern = match platform {
        Platform::Fly => &*FLY_HOST_PATTERN,
        Platform::Railway => &*RAILWAY_HOST_PATTERN,
    };
    pattern
        .as_ref()?
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_compile() {
        assert!(NAME_PATTERN.is_some());
        assert!(FLY_HOST_PATTERN.is_some());
        assert!(RAILWAY_HOST_PATTERN.is_some());
    }

    #[test]
    fn test_generated_names_are_valid() {
        let name = generate_deployment_name();
        assert!(name.starts_with("sol-cloud-"));
        assert_eq!(name.len(), "sol-cloud-".len() + 8);
        assert!(validate_deployment_name(&name).is_ok());
    }

    #[test]
    fn test_ensure_deployment_name() {
        assert_eq!(ensure_deployment_name(" My-Validator ").unwrap(), "my-validator");
        assert!(ensure_deployment_name("").unwrap().starts_with("sol-cloud-"));
        assert!(ensure_deployment_name("-bad").is_err());
        assert!(ensure_deployment_name("ab").is_err());
        assert!(ensure_deployment_name("under_score").is_err());
        assert!(ensure_deployment_name(&"a".repeat(64)).is_err());
        assert!(ensure_deployment_name(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_volume_name() {
        assert_eq!(volume_name("demo"), "demo_ledger");
        assert_eq!(volume_name("my-validator"), "my_validator_ledger");

        let long = volume_name("sol-cloud-abcdef12-extra-long");
        assert_eq!(long.len(), MAX_VOLUME_NAME_LEN);
        assert!(long.starts_with("sol_cloud_abcdef12"));
    }

    #[test]
    fn test_extract_fly_host() {
        let output = "==> Monitoring deployment\nVisit your newly deployed app at https://Demo-Validator.fly.dev/\n";
        assert_eq!(
            extract_host(output, Platform::Fly).as_deref(),
            Some("demo-validator.fly.dev")
        );
        assert_eq!(extract_host("no host here", Platform::Fly), None);
    }

    #[test]
    fn test_extract_railway_host() {
        let output = "Deploy complete: https://demo-production.up.railway.app";
        assert_eq!(
            extract_host(output, Platform::Railway).as_deref(),
            Some("demo-production.up.railway.app")
        );
        assert_eq!(extract_host(output, Platform::Fly), None);
    }
}
