use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::DeployArgs;
use crate::commands;
use crate::config::{DeploymentConfig, DeploymentRecord, ProjectConfig, StateStore};
use crate::domain::naming::ensure_deployment_name;
use crate::domain::{Deployment, Platform};
use crate::error::DeployError;
use crate::services::new_provider;
use crate::ui;

pub async fn execute(args: DeployArgs, config: Option<&Path>) -> Result<()> {
    let project_dir = commands::project_dir()?;
    let project = commands::load_project(config, &project_dir)?;
    let cfg = build_config(&args, &project, &project_dir)?;

    ui::print_header(&format!("sol-cloud deploy → {}", cfg.platform.display_name()));
    info!("🚀 Deployment: {}", cfg.name);
    info!("🌍 Region: {}", cfg.region);
    if let Some(org) = &cfg.org {
        info!("🏢 Org: {}", org);
    }
    println!();

    let provider = new_provider(cfg.platform.as_str(), commands::provider_options(&project_dir)?)?;
    let cancel = commands::shutdown_token();

    match provider.deploy(&cfg, &cancel).await {
        Ok(deployment) if cfg.dry_run => {
            ui::print_success("Dry run complete; deployment files generated");
            print_deployment(&deployment);
            Ok(())
        }
        Ok(deployment) => {
            save_record(&project_dir, &deployment, &cfg.region)?;
            ui::print_success("Validator deployed");
            print_deployment(&deployment);
            ui::print_field("Tip", format!("solana config set --url {}", deployment.rpc_url));
            Ok(())
        }
        Err(DeployError::Unhealthy { deployment, source }) => {
            // Resources exist, so destroy and status must still find them
            save_record(&project_dir, &deployment, &cfg.region)?;
            ui::print_warning("Validator deployed but its RPC did not become healthy");
            print_deployment(&deployment);
            Err(anyhow::Error::new(source).context(format!(
                "{} is deployed but unhealthy; check `sol-cloud status {}`",
                deployment.name, deployment.name
            )))
        }
        Err(e) => Err(e).context(format!("Failed to deploy {}", cfg.name)),
    }
}

/// Merge project file values, CLI flags and defaults into one validated config
pub fn build_config(
    args: &DeployArgs,
    project: &ProjectConfig,
    project_dir: &Path,
) -> Result<DeploymentConfig> {
    let platform = match args.provider.as_deref() {
        Some(provider) => provider.parse::<Platform>()?,
        None => project.platform()?,
    };
    let requested = args
        .name
        .as_deref()
        .or(project.app_name.as_deref())
        .unwrap_or_default();
    let name = ensure_deployment_name(requested)?;

    let mut cfg = DeploymentConfig::new(name, platform, project_dir);
    project.apply_to(&mut cfg);

    if let Some(region) = args.region.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        cfg.region = region.to_string();
    }
    if let Some(org) = args.org.as_deref().map(str::trim).filter(|o| !o.is_empty()) {
        cfg.org = Some(org.to_string());
    }
    if let Some(size) = args.volume_size {
        cfg.resources.volume_size_gb = size;
    }
    cfg.dry_run = args.dry_run;
    cfg.skip_volume = args.skip_volume;
    cfg.health.skip = args.skip_health_check;
    cfg.health.timeout = args.health_timeout;
    cfg.health.interval = args.health_interval;

    cfg.validate()?;
    Ok(cfg)
}

fn save_record(project_dir: &Path, deployment: &Deployment, region: &str) -> Result<()> {
    let store = StateStore::for_project(project_dir);
    let record = DeploymentRecord::from_deployment(deployment, region);
    if let Err(e) = store.update(|state| state.upsert(record)) {
        warn!("⚠️  Deployed but failed to update {}: {}", store.path().display(), e);
        return Err(e).context("Deployed but failed to update local state");
    }
    Ok(())
}

fn print_deployment(deployment: &Deployment) {
    println!();
    ui::print_field("App", &deployment.name);
    ui::print_field("Provider", deployment.platform.display_name());
    ui::print_field("RPC", &deployment.rpc_url);
    ui::print_field("WebSocket", &deployment.websocket_url);
    ui::print_field("Artifacts", deployment.artifacts_dir.display());
    if let Some(url) = &deployment.dashboard_url {
        ui::print_field("Dashboard", url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn args(extra: &[&str]) -> DeployArgs {
        let mut argv = vec!["sol-cloud", "deploy"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Deploy(args) => args,
            _ => panic!("expected deploy"),
        }
    }

    #[test]
    fn test_flags_override_project_file() {
        let project = ProjectConfig {
            provider: Some("railway".to_string()),
            app_name: Some("from-file".to_string()),
            region: Some("ams".to_string()),
            ..Default::default()
        };
        let cfg = build_config(
            &args(&["--name", "from-flag", "--region", "sjc", "--volume-size", "20"]),
            &project,
            Path::new("/tmp/project"),
        )
        .unwrap();

        assert_eq!(cfg.name, "from-flag");
        assert_eq!(cfg.platform, Platform::Railway);
        assert_eq!(cfg.region, "sjc");
        assert_eq!(cfg.resources.volume_size_gb, 20);
    }

    #[test]
    fn test_missing_name_is_generated() {
        let cfg = build_config(&args(&[]), &ProjectConfig::default(), Path::new("/tmp/project"))
            .unwrap();
        assert!(cfg.name.starts_with("sol-cloud-"));
        assert_eq!(cfg.platform, Platform::Fly);
    }

    #[test]
    fn test_invalid_provider_flag_is_rejected() {
        let err = build_config(
            &args(&["--provider", "heroku"]),
            &ProjectConfig::default(),
            Path::new("/tmp/project"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("heroku"));
    }
}
