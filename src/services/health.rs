//! RPC health poller
//!
//! Probes `getHealth` on a fixed interval until it answers "ok", the
//! timeout passes, or the run is cancelled. Individual probe failures are
//! retried; only the timeout surfaces, carrying the last failure.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{HealthError, RpcError};
use crate::infrastructure::RpcClient;

/// One liveness probe against a validator
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn check(&self) -> Result<(), RpcError>;
}

#[async_trait]
impl HealthProbe for RpcClient {
    fn endpoint(&self) -> &str {
        RpcClient::endpoint(self)
    }

    async fn check(&self) -> Result<(), RpcError> {
        self.get_health().await
    }
}

/// Poll `probe` until it is healthy or `timeout` elapses
///
/// The first probe runs immediately. A probe already in flight when the
/// deadline passes is abandoned.
pub async fn wait_healthy(
    probe: &dyn HealthProbe,
    timeout: Duration,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<(), HealthError> {
    // tokio panics on a zero period
    let interval = interval.max(Duration::from_millis(1));
    let deadline = Instant::now() + timeout;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut attempts: u32 = 0;
    let mut last_error: Option<RpcError> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(HealthError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => {
                return Err(HealthError::Timeout {
                    endpoint: probe.endpoint().to_string(),
                    timeout,
                    attempts,
                    last_error,
                });
            }
            result = async {
                ticker.tick().await;
                probe.check().await
            } => {
                attempts += 1;
                match result {
                    Ok(()) => {
                        debug!("RPC healthy after {} probe(s)", attempts);
                        return Ok(());
                    }
                    Err(e) => {
                        debug!("Health probe {} failed: {}", attempts, e);
                        last_error = Some(e);
                    }
                }
            }
        }
    }
}
