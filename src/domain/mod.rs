//! Domain layer - pure business logic
//!
//! This module contains business logic with no external I/O.
//! Types and functions here can be unit tested without mocking.

pub mod deployment;
pub mod naming;
pub mod slot_history;

// Re-export commonly used types
pub use deployment::{Deployment, Platform, ProviderStatus};
pub use slot_history::{SlotHistory, StuckInfo};
