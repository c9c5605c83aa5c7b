//! Centralized error types for sol-cloud
//!
//! Uses thiserror for typed errors that can be matched on,
//! while still being compatible with anyhow for propagation.
//! Only the command layer turns these into human-readable output.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::domain::Deployment;
use crate::infrastructure::process::last_n_lines;

/// Lines of captured command output kept on a stage failure
pub const STAGE_OUTPUT_TAIL_LINES: usize = 40;

/// Configuration errors, always detected before any remote call
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Required configuration missing: {field}")]
    MissingField { field: String },

    #[error("Invalid configuration value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Unsupported provider {name:?}: valid providers are fly, railway")]
    UnsupportedProvider { name: String },

    #[error("Failed to parse config {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("Failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into().display().to_string(),
            source,
        }
    }
}

/// Local deployment state lookups
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StateError {
    #[error("No deployments found in local state. Run `sol-cloud deploy` first")]
    NoDeployments,

    #[error("Deployment name is required when several deployments exist")]
    NameRequired,

    #[error("Deployment {0:?} not found in local state")]
    NotFound(String),
}

/// Remote platform API errors
///
/// The variants are kept apart so callers can tell a network failure from an
/// HTTP error status from a GraphQL error envelope.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{method} {url} failed: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("GraphQL error: {}", .messages.join("; "))]
    GraphQl { messages: Vec<String> },

    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Response from {url} exceeded {limit} bytes")]
    ResponseTooLarge { url: String, limit: usize },
}

impl ApiError {
    /// HTTP status for `Status` errors
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Verbatim response body for `Status` errors
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } => Some(body),
            _ => None,
        }
    }

    /// GraphQL error messages, empty for every other kind
    pub fn graphql_messages(&self) -> &[String] {
        match self {
            Self::GraphQl { messages } => messages,
            _ => &[],
        }
    }
}

/// Validator JSON-RPC errors
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("RPC endpoint is empty")]
    EmptyEndpoint,

    #[error("RPC {method} request failed: {source}")]
    Transport {
        method: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("RPC {method} returned HTTP {status}: {body}")]
    Status {
        method: String,
        status: u16,
        body: String,
    },

    #[error("RPC {method} error {code}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error("RPC {method} returned unexpected result: {detail}")]
    UnexpectedResult { method: String, detail: String },

    #[error("Failed to decode RPC {method} response: {message}")]
    Decode { method: String, message: String },
}

/// Health poller errors
#[derive(Error, Debug)]
pub enum HealthError {
    #[error(
        "RPC endpoint {endpoint} did not become healthy within {} ({attempts} probes){}",
        format_duration(.timeout),
        describe_last_error(.last_error)
    )]
    Timeout {
        endpoint: String,
        timeout: Duration,
        attempts: u32,
        #[source]
        last_error: Option<RpcError>,
    },

    #[error("Health check cancelled")]
    Cancelled,
}

/// Credential and token errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No {provider} access token configured. Run `sol-cloud auth {provider}` or set {env_var}")]
    TokenNotFound {
        provider: &'static str,
        env_var: &'static str,
    },

    #[error("{provider} token rejected: {reason}")]
    Rejected {
        provider: &'static str,
        reason: String,
    },

    #[error("Could not verify {provider} token: {source}")]
    Unverifiable {
        provider: &'static str,
        #[source]
        source: ApiError,
    },

    #[error("Failed to load credentials: {0}")]
    Store(#[from] ConfigError),
}

/// Subprocess errors
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("{program} not found in PATH ({hint})")]
    NotInstalled { program: String, hint: String },

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}", format_duration(.timeout))]
    TimedOut {
        program: String,
        timeout: Duration,
        /// Output captured before the deadline
        output: String,
    },
}

impl ProcessError {
    /// Output the command printed before it failed, if any was read
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::TimedOut { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Deployment orchestration errors
#[derive(Error, Debug)]
pub enum DeployError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Failed to prepare deployment artifacts at {path}: {message}")]
    Artifacts { path: PathBuf, message: String },

    #[error("{stage} failed: {message}{}{}", describe_log(.log_path), describe_tail(.output_tail))]
    Stage {
        stage: String,
        message: String,
        output_tail: Option<String>,
        log_path: Option<PathBuf>,
    },

    #[error("Deployment completed but RPC health check failed: {source}")]
    Unhealthy {
        deployment: Box<Deployment>,
        #[source]
        source: HealthError,
    },

    #[error("Deployment cancelled")]
    Cancelled,
}

impl DeployError {
    /// Stage failure without captured output
    pub fn stage(stage: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: err.to_string(),
            output_tail: None,
            log_path: None,
        }
    }

    /// Stage failure annotated with the tail of the captured command output
    pub fn stage_with_output(
        stage: impl Into<String>,
        err: impl std::fmt::Display,
        output: &str,
    ) -> Self {
        let output = output.trim();
        Self::Stage {
            stage: stage.into(),
            message: err.to_string(),
            output_tail: (!output.is_empty())
                .then(|| last_n_lines(output, STAGE_OUTPUT_TAIL_LINES)),
            log_path: None,
        }
    }

    pub fn artifacts(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Artifacts {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Point a stage failure at the deploy log written for it
    pub fn with_log_path(self, path: PathBuf) -> Self {
        match self {
            Self::Stage {
                stage,
                message,
                output_tail,
                ..
            } => Self::Stage {
                stage,
                message,
                output_tail,
                log_path: Some(path),
            },
            other => other,
        }
    }
}

/// Errors from destroy, status and restart
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Deployment name is required")]
    MissingName,

    #[error("No machines found for app {app}")]
    NoMachines { app: String },

    #[error("No environments found for Railway project {project}")]
    NoEnvironment { project: String },

    #[error("Failed to read deployment metadata {path}: {message}")]
    Metadata { path: PathBuf, message: String },
}

fn format_duration(duration: &Duration) -> String {
    humantime::format_duration(*duration).to_string()
}

fn describe_last_error(last: &Option<RpcError>) -> String {
    last.as_ref()
        .map(|err| format!(": last error: {err}"))
        .unwrap_or_default()
}

fn describe_log(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" (see deploy log: {})", p.display()))
        .unwrap_or_default()
}

fn describe_tail(tail: &Option<String>) -> String {
    tail.as_ref().map(|t| format!("\n{t}")).unwrap_or_default()
}
