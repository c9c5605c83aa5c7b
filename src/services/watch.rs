//! Watch/recovery loop
//!
//! Polls the validator's slot on a fixed interval, feeds it into a
//! [`SlotHistory`] and restarts the deployment when the slot stops moving.
//! Restarts are rate limited by a cooldown and optionally capped.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{SlotHistory, StuckInfo};
use crate::error::{ProviderError, RpcError};
use crate::infrastructure::RpcClient;
use crate::services::provider::Provider;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_STUCK_THRESHOLD: Duration = Duration::from_secs(3 * 60);
pub const DEFAULT_RESTART_COOLDOWN: Duration = Duration::from_secs(2 * 60);

/// Deadline for a single `getSlot` call
pub const SLOT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for a single restart request
pub const RESTART_TIMEOUT: Duration = Duration::from_secs(60);

/// Where the watcher reads the current slot from
#[async_trait]
pub trait SlotSource: Send + Sync {
    async fn current_slot(&self) -> Result<u64, RpcError>;
}

#[async_trait]
impl SlotSource for RpcClient {
    async fn current_slot(&self) -> Result<u64, RpcError> {
        self.get_slot().await
    }
}

/// Restarts the watched validator
#[async_trait]
pub trait Restarter: Send + Sync {
    async fn restart_validator(&self) -> Result<(), ProviderError>;
}

/// Restart through a provider's restart operation
pub struct ProviderRestarter {
    provider: Box<dyn Provider>,
    name: String,
}

impl ProviderRestarter {
    pub fn new(provider: Box<dyn Provider>, name: impl Into<String>) -> Self {
        Self {
            provider,
            name: name.into(),
        }
    }
}

#[async_trait]
impl Restarter for ProviderRestarter {
    async fn restart_validator(&self) -> Result<(), ProviderError> {
        self.provider.restart(&self.name).await
    }
}

/// Asks whether a stuck validator may be restarted
#[async_trait]
pub trait RestartConfirmer: Send + Sync {
    async fn confirm(&self, name: &str, info: &StuckInfo) -> bool;
}

/// Confirmer for `--auto-restart`
pub struct AutoApprove;

#[async_trait]
impl RestartConfirmer for AutoApprove {
    async fn confirm(&self, _name: &str, _info: &StuckInfo) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub check_interval: Duration,
    pub stuck_threshold: Duration,
    /// 0 means unlimited
    pub max_restarts: u32,
    pub restart_cooldown: Duration,
    pub slot_timeout: Duration,
    pub restart_timeout: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            stuck_threshold: DEFAULT_STUCK_THRESHOLD,
            max_restarts: 0,
            restart_cooldown: DEFAULT_RESTART_COOLDOWN,
            slot_timeout: SLOT_CHECK_TIMEOUT,
            restart_timeout: RESTART_TIMEOUT,
        }
    }
}

/// Result of one poll
#[derive(Debug)]
pub enum TickOutcome {
    /// The slot RPC failed; never counted as stuck
    Unreachable(String),
    Progressing(u64),
    /// Same slot as last time, but not for long enough to count as stuck
    Waiting(u64),
    CooldownActive { info: StuckInfo, remaining: Duration },
    Declined(StuckInfo),
    Restarted { info: StuckInfo, restarts: u32 },
    RestartFailed { info: StuckInfo, error: String },
    /// Cancelled while waiting for confirmation
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    MaxRestarts(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSummary {
    pub restarts: u32,
    pub stop: StopReason,
}

/// One watch session; restart bookkeeping lives as long as the value
pub struct Watcher<'a> {
    name: String,
    config: WatchConfig,
    slots: &'a dyn SlotSource,
    restarter: &'a dyn Restarter,
    confirmer: &'a dyn RestartConfirmer,
    history: SlotHistory,
    restart_count: u32,
    last_restart: Option<Instant>,
}

impl<'a> Watcher<'a> {
    pub fn new(
        name: impl Into<String>,
        config: WatchConfig,
        slots: &'a dyn SlotSource,
        restarter: &'a dyn Restarter,
        confirmer: &'a dyn RestartConfirmer,
    ) -> Self {
        let history = SlotHistory::new(config.stuck_threshold);
        Self {
            name: name.into(),
            config,
            slots,
            restarter,
            confirmer,
            history,
            restart_count: 0,
            last_restart: None,
        }
    }

    pub fn history(&self) -> &SlotHistory {
        &self.history
    }

    /// Poll until cancelled or the restart cap is hit
    ///
    /// The first poll happens one interval after start. A poll already
    /// running when `cancel` fires completes before the loop exits.
    pub async fn run(&mut self, cancel: &CancellationToken) -> WatchSummary {
        let period = self.config.check_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.summary(StopReason::Cancelled),
                _ = ticker.tick() => {}
            }

            let outcome = self.tick(cancel).await;
            self.report(&outcome);
            if matches!(outcome, TickOutcome::Cancelled) {
                return self.summary(StopReason::Cancelled);
            }

            let max = self.config.max_restarts;
            if max > 0 && self.restart_count >= max {
                info!("🛑 Max restarts ({}) reached, stopping watcher", max);
                return self.summary(StopReason::MaxRestarts(max));
            }
        }
    }

    /// One poll: read the slot, evaluate it, restart if warranted
    pub async fn tick(&mut self, cancel: &CancellationToken) -> TickOutcome {
        let slot = match tokio::time::timeout(self.config.slot_timeout, self.slots.current_slot()).await {
            Ok(Ok(slot)) => slot,
            Ok(Err(e)) => return TickOutcome::Unreachable(e.to_string()),
            Err(_) => {
                return TickOutcome::Unreachable(format!(
                    "no answer within {}",
                    humantime::format_duration(self.config.slot_timeout)
                ))
            }
        };

        self.history.record(slot);
        let Some(info) = self.history.is_stuck() else {
            return if self.history.has_progressed() {
                TickOutcome::Progressing(slot)
            } else {
                TickOutcome::Waiting(slot)
            };
        };

        // Cooldown wins over both confirmation and restart
        if let Some(last) = self.last_restart {
            let elapsed = last.elapsed();
            if elapsed < self.config.restart_cooldown {
                return TickOutcome::CooldownActive {
                    info,
                    remaining: self.config.restart_cooldown - elapsed,
                };
            }
        }

        let approved = tokio::select! {
            biased;
            _ = cancel.cancelled() => return TickOutcome::Cancelled,
            approved = self.confirmer.confirm(&self.name, &info) => approved,
        };
        if !approved {
            return TickOutcome::Declined(info);
        }

        info!("🔄 [{}] Restarting validator {}...", clock(), self.name);
        let restart = tokio::time::timeout(self.config.restart_timeout, self.restarter.restart_validator());
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("⚠️  [{}] Stopped waiting on the restart of {}; it may still complete remotely", clock(), self.name);
                return TickOutcome::Cancelled;
            }
            result = restart => result,
        };
        match result {
            Ok(Ok(())) => {
                self.restart_count += 1;
                self.last_restart = Some(Instant::now());
                TickOutcome::Restarted {
                    info,
                    restarts: self.restart_count,
                }
            }
            Ok(Err(e)) => TickOutcome::RestartFailed {
                info,
                error: e.to_string(),
            },
            Err(_) => TickOutcome::RestartFailed {
                info,
                error: format!(
                    "restart timed out after {}",
                    humantime::format_duration(self.config.restart_timeout)
                ),
            },
        }
    }

    fn summary(&self, stop: StopReason) -> WatchSummary {
        WatchSummary {
            restarts: self.restart_count,
            stop,
        }
    }

    fn report(&self, outcome: &TickOutcome) {
        match outcome {
            TickOutcome::Unreachable(e) => warn!("⚠️  [{}] RPC unreachable: {}", clock(), e),
            TickOutcome::Progressing(slot) => info!("✅ [{}] Slot: {} (progressing)", clock(), slot),
            TickOutcome::Waiting(slot) => {
                info!("⏳ [{}] Slot: {} (waiting for progression)", clock(), slot)
            }
            TickOutcome::CooldownActive { info, remaining } => {
                warn!("🚨 [{}] STUCK DETECTED: {}", clock(), info);
                let remaining = Duration::from_secs(remaining.as_secs());
                info!(
                    "⏸️  Restart cooldown active, waiting {}...",
                    humantime::format_duration(remaining)
                );
            }
            TickOutcome::Declined(info) => {
                warn!("🚨 [{}] STUCK DETECTED: {}", clock(), info);
                info!("⏭️  Restart skipped");
            }
            TickOutcome::Restarted { info, restarts } => {
                warn!("🚨 STUCK DETECTED: {}", info);
                info!(
                    "✅ [{}] Restart successful (restart #{}), waiting for validator to recover",
                    clock(),
                    restarts
                );
            }
            TickOutcome::RestartFailed { info, error } => {
                warn!("🚨 STUCK DETECTED: {}", info);
                warn!("❌ Restart failed: {}", error);
            }
            TickOutcome::Cancelled => {}
        }
    }
}

fn clock() -> String {
    Local::now().format("%H:%M:%S").to_string()
}
