use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::cli::WatchArgs;
use crate::commands;
use crate::config::StateStore;
use crate::domain::StuckInfo;
use crate::infrastructure::RpcClient;
use crate::services::watch::SLOT_CHECK_TIMEOUT;
use crate::services::{
    for_platform, AutoApprove, ProviderRestarter, RestartConfirmer, StopReason, WatchConfig, Watcher,
};
use crate::ui;

/// Asks on the terminal before each restart
///
/// The read runs on its own thread so an unanswered prompt never holds up
/// shutdown.
struct TerminalPrompt;

#[async_trait]
impl RestartConfirmer for TerminalPrompt {
    async fn confirm(&self, name: &str, info: &StuckInfo) -> bool {
        let question = format!("🚨 {info}\n❓ Restart validator {name:?}?");
        let (tx, rx) = oneshot::channel();
        std::thread::spawn(move || {
            let _ = tx.send(ui::confirm(&question));
        });
        match rx.await {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                warn!("⚠️  Could not read confirmation: {}", e);
                false
            }
            Err(_) => false,
        }
    }
}

pub async fn execute(args: WatchArgs, config: Option<&Path>) -> Result<()> {
    let project_dir = commands::project_dir()?;
    let project = commands::load_project(config, &project_dir)?;
    let state = StateStore::for_project(&project_dir)
        .load()
        .context("Failed to load local deployment state")?;
    let record = commands::resolve_record(&state, args.name.as_deref(), project.platform()?, &project_dir)?;

    ui::print_header(&format!("sol-cloud watch → {}", record.name));
    info!("📡 RPC endpoint: {}", record.rpc_url);
    info!("⏱️  Check interval: {}", humantime::format_duration(args.check_interval));
    info!("⚠️  Stuck threshold: {}", humantime::format_duration(args.stuck_threshold));
    if args.max_restarts > 0 {
        info!("🔄 Max restarts: {}", args.max_restarts);
    } else {
        info!("🔄 Max restarts: unlimited");
    }
    info!("⏳ Restart cooldown: {}", humantime::format_duration(args.restart_cooldown));
    if args.auto_restart {
        info!("🤖 Auto-restart: enabled");
    } else {
        info!("👤 Auto-restart: disabled (manual confirmation required)");
    }
    println!();
    ui::print_info("Press Ctrl+C to stop watching");
    println!();

    let provider = for_platform(record.provider, commands::provider_options(&project_dir)?);
    let restarter = ProviderRestarter::new(provider, record.name.clone());
    let slots = RpcClient::with_timeout(&record.rpc_url, SLOT_CHECK_TIMEOUT);
    let confirmer: Box<dyn RestartConfirmer> = if args.auto_restart {
        Box::new(AutoApprove)
    } else {
        Box::new(TerminalPrompt)
    };

    let watch_config = WatchConfig {
        check_interval: args.check_interval,
        stuck_threshold: args.stuck_threshold,
        max_restarts: args.max_restarts,
        restart_cooldown: args.restart_cooldown,
        ..WatchConfig::default()
    };
    let mut watcher = Watcher::new(
        record.name.clone(),
        watch_config,
        &slots,
        &restarter,
        confirmer.as_ref(),
    );

    let cancel = commands::shutdown_token();
    let summary = watcher.run(&cancel).await;

    println!();
    match summary.stop {
        StopReason::Cancelled => ui::print_info("Watcher stopped"),
        StopReason::MaxRestarts(max) => {
            ui::print_warning(&format!("Max restarts ({max}) reached, watcher stopped"))
        }
    }
    ui::print_field("Restarts", summary.restarts);
    Ok(())
}
