//! Infrastructure layer - external I/O adapters
//!
//! This module contains all code that interacts with external systems:
//! - Platform REST/GraphQL APIs (shared client, Fly.io, Railway)
//! - Validator JSON-RPC
//! - Platform CLIs (`flyctl`, `railway`) run as subprocesses
//! - Rendered deployment artifacts on disk

pub mod api_client;
pub mod artifacts;
pub mod fly;
pub mod process;
pub mod railway;
pub mod rpc;

// Re-export commonly used types
pub use api_client::{ApiClient, Ensured, RawResponse};
pub use artifacts::Artifacts;
pub use fly::FlyApi;
pub use railway::{RailwayApi, RailwayIds};
pub use rpc::RpcClient;
