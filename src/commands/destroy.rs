use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::commands;
use crate::config::StateStore;
use crate::services::for_platform;
use crate::ui;

pub async fn execute(name: Option<String>, yes: bool, config: Option<&Path>) -> Result<()> {
    let project_dir = commands::project_dir()?;
    let project = commands::load_project(config, &project_dir)?;
    let store = StateStore::for_project(&project_dir);
    let state = store.load().context("Failed to load local deployment state")?;
    let record = commands::resolve_record(&state, name.as_deref(), project.platform()?, &project_dir)?;

    ui::print_header(&format!("sol-cloud destroy → {}", record.provider.display_name()));
    info!("🗑️  Deployment: {}", record.name);
    info!("📡 RPC endpoint: {}", record.rpc_url);
    println!();

    if !yes {
        let question = format!("This will destroy '{}' and its remote resources. Continue?", record.name);
        let confirmed = tokio::task::spawn_blocking(move || ui::confirm(&question))
            .await
            .context("Confirmation prompt failed")?
            .context("Failed to read confirmation")?;
        if !confirmed {
            ui::print_info("Destroy cancelled");
            return Ok(());
        }
    }

    let provider = for_platform(record.provider, commands::provider_options(&project_dir)?);
    let spinner = ui::spinner(format!("Destroying {}...", record.name));
    let result = provider.destroy(&record.name).await;
    spinner.finish_and_clear();
    result.with_context(|| format!("Failed to destroy {}", record.name))?;

    store
        .update(|state| state.remove(&record.name))
        .context("Destroyed remote resources but failed to update local state")?;

    ui::print_success(&format!("Validator destroyed: {}", record.name));
    Ok(())
}
