//! Services layer - orchestration logic
//!
//! This module coordinates between domain logic and infrastructure.
//! Services use infrastructure adapters to perform I/O operations.

pub mod fly_provider;
pub mod health;
pub mod orchestrator;
pub mod provider;
pub mod railway_provider;
pub mod token_verification;
pub mod watch;

// Re-export commonly used types
pub use provider::{for_platform, new_provider, Provider, ProviderOptions};
pub use watch::{AutoApprove, ProviderRestarter, RestartConfirmer, StopReason, WatchConfig, Watcher};
