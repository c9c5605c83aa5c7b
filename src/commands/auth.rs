use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crate::cli::AuthArgs;
use crate::commands;
use crate::config::{Credentials, CredentialsStore, DEFAULT_FLY_ORG};
use crate::domain::Platform;
use crate::infrastructure::railway::Workspace;
use crate::infrastructure::RailwayApi;
use crate::services::for_platform;
use crate::ui;

/// Deadline for the whole verification cascade
const VERIFY_TIMEOUT: Duration = Duration::from_secs(20);

/// Deadline for Railway workspace discovery
const WORKSPACE_TIMEOUT: Duration = Duration::from_secs(15);

pub async fn execute(platform: Platform, args: AuthArgs) -> Result<()> {
    let store = CredentialsStore::default_location().context("Failed to locate credentials file")?;
    let mut creds = store.load().context("Failed to load credentials")?;

    ui::print_header(&format!("sol-cloud auth → {}", platform.display_name()));

    let token = match non_empty(args.token.as_deref()) {
        Some(token) => token,
        None => {
            print_token_help(platform);
            let label = format!("{} access token", platform.display_name());
            let entered = tokio::task::spawn_blocking(move || ui::prompt_secret(&label))
                .await
                .context("Token prompt failed")?
                .context("Failed to read token")?;
            non_empty(Some(&entered)).context("An access token is required")?
        }
    };
    let token = SecretString::from(token);

    let stored_org = creds.provider(platform).org.clone();
    let org = match platform {
        Platform::Fly => Some(fly_org(args.org.as_deref(), stored_org.as_deref()).await?),
        Platform::Railway => None,
    };

    if args.skip_verify {
        ui::print_warning("Skipping token verification");
    } else {
        let provider = for_platform(platform, commands::provider_options(&commands::project_dir()?)?);
        let spinner = ui::spinner(format!("Verifying {} token...", platform.display_name()));
        let verified = tokio::time::timeout(VERIFY_TIMEOUT, provider.verify_access_token(&token)).await;
        spinner.finish_and_clear();
        match verified {
            Ok(result) => result.with_context(|| format!("Failed to verify {platform} token"))?,
            Err(_) => anyhow::bail!(
                "Timed out verifying {} token after {}",
                platform,
                humantime::format_duration(VERIFY_TIMEOUT)
            ),
        }
        ui::print_success("Token verified");
    }

    let org = match platform {
        Platform::Fly => org,
        Platform::Railway => railway_workspace(&token, args.org.as_deref(), stored_org.as_deref()).await?,
    };

    apply(&mut creds, platform, &token, org, !args.skip_verify);
    store.save(&creds).context("Failed to save credentials")?;

    info!("💾 Saved to {}", store.path().display());
    ui::print_success(&format!("{} authentication saved", platform.display_name()));
    Ok(())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn print_token_help(platform: Platform) {
    match platform {
        Platform::Fly => {
            ui::print_info("Create a Fly access token (personal or organization):");
            println!("   https://fly.io/user/personal_access_tokens");
        }
        Platform::Railway => {
            ui::print_info("Create a Railway API token:");
            println!("   https://railway.app/account/tokens");
        }
    }
    println!();
}

async fn fly_org(explicit: Option<&str>, stored: Option<&str>) -> Result<String> {
    if let Some(org) = non_empty(explicit) {
        return Ok(org);
    }
    let default = non_empty(stored).unwrap_or_else(|| DEFAULT_FLY_ORG.to_string());
    let entered = tokio::task::spawn_blocking(move || ui::prompt("Default Fly org slug", Some(&default)))
        .await
        .context("Org prompt failed")?
        .context("Failed to read org")?;
    Ok(non_empty(Some(&entered)).unwrap_or_else(|| DEFAULT_FLY_ORG.to_string()))
}

/// Explicit workspace, else discovered ones (asking when there are several), else a prompt
async fn railway_workspace(
    token: &SecretString,
    explicit: Option<&str>,
    stored: Option<&str>,
) -> Result<Option<String>> {
    if let Some(workspace) = non_empty(explicit) {
        return Ok(Some(workspace));
    }

    let api = RailwayApi::new(SecretString::from(token.expose_secret().to_string()));
    let found = match tokio::time::timeout(WORKSPACE_TIMEOUT, api.list_workspaces()).await {
        Ok(found) => found,
        Err(_) => {
            warn!("⚠️  Workspace discovery timed out");
            Vec::new()
        }
    };

    match found.as_slice() {
        [only] => {
            info!("🏢 Workspace: {}", display_workspace(only));
            Ok(Some(only.id.clone()))
        }
        [] => {
            ui::print_info("Could not auto-discover the Railway workspace id.");
            println!("   Find it in your dashboard URL: https://railway.com/workspace/<workspaceId>");
            let default = non_empty(stored);
            let entered = tokio::task::spawn_blocking(move || {
                ui::prompt("Railway workspace id", default.as_deref())
            })
            .await
            .context("Workspace prompt failed")?
            .context("Failed to read workspace id")?;
            Ok(non_empty(Some(&entered)))
        }
        several => {
            ui::print_info("Available workspaces:");
            for workspace in several {
                println!("   {}", display_workspace(workspace));
            }
            let default = default_workspace(several, stored);
            let entered = tokio::task::spawn_blocking(move || {
                ui::prompt("Railway workspace id", default.as_deref())
            })
            .await
            .context("Workspace prompt failed")?
            .context("Failed to read workspace id")?;
            Ok(non_empty(Some(&entered)))
        }
    }
}

fn display_workspace(workspace: &Workspace) -> String {
    if workspace.name.is_empty() {
        workspace.id.clone()
    } else {
        format!("{}  ({})", workspace.name, workspace.id)
    }
}

/// The stored workspace when it is still visible, else the first one
fn default_workspace(found: &[Workspace], stored: Option<&str>) -> Option<String> {
    stored
        .and_then(|stored| found.iter().find(|w| w.id == stored))
        .or_else(|| found.first())
        .map(|w| w.id.clone())
}

fn apply(
    creds: &mut Credentials,
    platform: Platform,
    token: &SecretString,
    org: Option<String>,
    verified: bool,
) {
    let entry = creds.provider_mut(platform);
    entry.access_token = token.expose_secret().to_string();
    entry.org = org;
    if verified {
        entry.verified_at = Some(Utc::now());
    }
}
