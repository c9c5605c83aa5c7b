//! Runtime tool path resolution
//!
//! For each platform CLI (e.g. `flyctl`) we:
//! 1. Check for an environment variable `{TOOL}_BIN` (e.g. `FLYCTL_BIN`)
//! 2. Fall back to PATH-based invocation if the envvar is not set
//!
//! `require_tool` additionally checks that the resolved program can be found
//! before a deploy starts pushing anything.

use std::env;

use crate::error::ProcessError;

/// Get the path to an external tool
///
/// Checks `{TOOL}_BIN` (uppercase tool name, `-` replaced by `_`). Falls
/// back to the tool name itself, which relies on PATH.
pub fn get_tool_path(tool: &str) -> String {
    env::var(tool_env_var(tool))
        .ok()
        .map(|path| path.trim().to_string())
        .filter(|path| !path.is_empty())
        .unwrap_or_else(|| tool.to_string())
}

/// Resolve a tool and make sure it can actually be executed
pub fn require_tool(tool: &str) -> Result<String, ProcessError> {
    let path = get_tool_path(tool);
    which::which(&path).map_err(|_| ProcessError::NotInstalled {
        program: path.clone(),
        hint: install_hint(tool).to_string(),
    })?;
    Ok(path)
}

fn tool_env_var(tool: &str) -> String {
    format!("{}_BIN", tool.to_uppercase().replace('-', "_"))
}

fn install_hint(tool: &str) -> &'static str {
    match tool {
        tools::FLYCTL => "install from https://fly.io/docs/flyctl/install/",
        tools::RAILWAY => "install from https://docs.railway.app/guides/cli",
        _ => "install it or set the matching _BIN variable",
    }
}

/// Platform CLIs shelled out to during deploys
pub mod tools {
    pub const FLYCTL: &str = "flyctl";
    pub const RAILWAY: &str = "railway";
}
