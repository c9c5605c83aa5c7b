//! Deployment artifact rendering
//!
//! Writes the container build context for one deployment into
//! `<project>/.sol-cloud/deployments/<name>/`: Dockerfile, entrypoint,
//! nginx proxy config, fly.toml (Fly only) and any preloaded program files.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::DeploymentConfig;
use crate::domain::naming::volume_name;
use crate::domain::Platform;
use crate::error::DeployError;

/// Where program files live inside the container
pub const PROGRAM_CONTAINER_DIR: &str = "/opt/sol-cloud/program";
pub const LEDGER_DIR: &str = "/var/lib/solana/ledger";
pub const PUBLIC_PORT: u16 = 8080;
pub const RPC_PORT: u16 = 8899;

const MAINNET_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

const PROGRAM_FILE: &str = "program.so";
const PROGRAM_ID_FILE: &str = "program-id-keypair.json";
const UPGRADE_AUTHORITY_FILE: &str = "upgrade-authority.json";

/// Container paths of a preloaded program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramArtifacts {
    pub so_path: String,
    pub program_id_keypair: String,
    pub upgrade_authority: String,
}

impl ProgramArtifacts {
    fn canonical() -> Self {
        Self {
            so_path: format!("{PROGRAM_CONTAINER_DIR}/{PROGRAM_FILE}"),
            program_id_keypair: format!("{PROGRAM_CONTAINER_DIR}/{PROGRAM_ID_FILE}"),
            upgrade_authority: format!("{PROGRAM_CONTAINER_DIR}/{UPGRADE_AUTHORITY_FILE}"),
        }
    }
}

/// A rendered build context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub dir: PathBuf,
    pub program: Option<ProgramArtifacts>,
}

impl Artifacts {
    pub fn log_path(&self) -> PathBuf {
        self.dir.join("deploy.log")
    }
}

/// Render every artifact for a deployment
///
/// Runs before any remote call, so a failure here leaves the platform untouched.
pub fn prepare(cfg: &DeploymentConfig) -> Result<Artifacts, DeployError> {
    let dir = cfg.artifacts_dir();
    let program_dir = dir.join("program");
    std::fs::create_dir_all(&program_dir).map_err(|e| DeployError::artifacts(&program_dir, e))?;

    let program = stage_program_files(cfg, &program_dir)?;

    write_file(&dir.join("Dockerfile"), &render_dockerfile(program.is_some()))?;
    write_file(&dir.join("entrypoint.sh"), &render_entrypoint(cfg, program.as_ref()))?;
    write_file(&dir.join("nginx.conf"), NGINX_CONF)?;
    set_executable(&dir.join("entrypoint.sh"))?;

    if cfg.platform == Platform::Fly {
        let fly_toml = render_fly_toml(cfg).map_err(|e| DeployError::artifacts(dir.join("fly.toml"), e))?;
        write_file(&dir.join("fly.toml"), &fly_toml)?;
    }

    tracing::debug!("Rendered deployment artifacts in {}", dir.display());
    Ok(Artifacts { dir, program })
}

/// Copy the configured program, id keypair and upgrade authority into `program/`
fn stage_program_files(
    cfg: &DeploymentConfig,
    program_dir: &Path,
) -> Result<Option<ProgramArtifacts>, DeployError> {
    let program = &cfg.validator.program_deploy;
    let (Some(so), Some(id), Some(authority)) = (
        &program.so_path,
        &program.program_id_keypair,
        &program.upgrade_authority,
    ) else {
        if !program.is_empty() {
            return Err(DeployError::artifacts(
                program_dir,
                "program_deploy needs so_path, program_id_keypair and upgrade_authority together",
            ));
        }
        return Ok(None);
    };

    for (source, file_name) in [
        (so, PROGRAM_FILE),
        (id, PROGRAM_ID_FILE),
        (authority, UPGRADE_AUTHORITY_FILE),
    ] {
        let source = resolve_project_file(&cfg.project_dir, source)?;
        let dest = program_dir.join(file_name);
        std::fs::copy(&source, &dest).map_err(|e| {
            DeployError::artifacts(&dest, format!("copy from {}: {e}", source.display()))
        })?;
    }

    Ok(Some(ProgramArtifacts::canonical()))
}

fn resolve_project_file(project_dir: &Path, path: &Path) -> Result<PathBuf, DeployError> {
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_dir.join(path)
    };
    let metadata = std::fs::metadata(&resolved).map_err(|e| DeployError::artifacts(&resolved, e))?;
    if metadata.is_dir() {
        return Err(DeployError::artifacts(&resolved, "expected a file, found a directory"));
    }
    Ok(resolved)
}

fn write_file(path: &Path, content: &str) -> Result<(), DeployError> {
    std::fs::write(path, content).map_err(|e| DeployError::artifacts(path, e))
}

fn set_executable(path: &Path) -> Result<(), DeployError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .map_err(|e| DeployError::artifacts(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

const DOCKERFILE_BASE: &str = r#"FROM debian:bookworm-slim

ARG SOLANA_VERSION=stable

RUN apt-get update \
    && apt-get install -y --no-install-recommends bzip2 ca-certificates curl nginx \
    && rm -rf /var/lib/apt/lists/*

RUN sh -c "$(curl -sSfL https://release.anza.xyz/${SOLANA_VERSION}/install)"
ENV PATH="/root/.local/share/solana/install/active_release/bin:${PATH}"

COPY nginx.conf /etc/nginx/nginx.conf
COPY entrypoint.sh /usr/local/bin/entrypoint.sh
"#;

pub fn render_dockerfile(with_program: bool) -> String {
    let mut dockerfile = DOCKERFILE_BASE.to_string();
    if with_program {
        let _ = writeln!(dockerfile, "COPY program/ {PROGRAM_CONTAINER_DIR}/");
    }
    let _ = writeln!(dockerfile, "RUN chmod +x /usr/local/bin/entrypoint.sh");
    let _ = writeln!(dockerfile);
    let _ = writeln!(dockerfile, "EXPOSE {PUBLIC_PORT}");
    let _ = writeln!(dockerfile, r#"ENTRYPOINT ["/usr/local/bin/entrypoint.sh"]"#);
    dockerfile
}

pub fn render_entrypoint(cfg: &DeploymentConfig, program: Option<&ProgramArtifacts>) -> String {
    let validator = &cfg.validator;
    let mut args = vec![
        format!("--ledger \"{LEDGER_DIR}\""),
        "--bind-address 0.0.0.0".to_string(),
        format!("--rpc-port {RPC_PORT}"),
        format!("--slots-per-epoch {}", validator.slots_per_epoch),
        format!("--compute-unit-limit {}", validator.compute_unit_limit),
    ];
    if let Some(ticks) = validator.ticks_per_slot {
        args.push(format!("--ticks-per-slot {ticks}"));
    }
    if let Some(limit) = validator.ledger_limit_size {
        args.push(format!("--limit-ledger-size {limit}"));
    }
    if !validator.clone_accounts.is_empty() || !validator.clone_upgradeable_programs.is_empty() {
        args.push(format!("--url {MAINNET_RPC_URL}"));
    }
    args.extend(validator.clone_accounts.iter().map(|a| format!("--clone {a}")));
    args.extend(
        validator
            .clone_upgradeable_programs
            .iter()
            .map(|p| format!("--clone-upgradeable-program {p}")),
    );
    if let Some(program) = program {
        args.push(format!(
            "--upgradeable-program \"{}\" \"{}\" \"{}\"",
            program.program_id_keypair, program.so_path, program.upgrade_authority
        ));
    }

    let mut script = String::from("#!/usr/bin/env bash\nset -euo pipefail\n\n");
    let _ = writeln!(script, "# {} validator ({})", cfg.name, cfg.platform.display_name());
    let _ = writeln!(script, "mkdir -p \"{LEDGER_DIR}\"");
    let _ = writeln!(script);
    let _ = writeln!(script, "nginx");
    let _ = writeln!(script);
    let _ = writeln!(script, "exec solana-test-validator \\");
    let last = args.len().saturating_sub(1);
    for (i, arg) in args.iter().enumerate() {
        let continuation = if i == last { "" } else { " \\" };
        let _ = writeln!(script, "  {arg}{continuation}");
    }
    script
}

/// Public port proxies JSON-RPC over HTTP and pubsub over WebSocket
pub const NGINX_CONF: &str = r#"worker_processes 1;

events {
    worker_connections 1024;
}

http {
    map $http_upgrade $connection_upgrade {
        default upgrade;
        ''      close;
    }

    map $http_upgrade $validator_backend {
        default      http://127.0.0.1:8899;
        ~*websocket  http://127.0.0.1:8900;
    }

    server {
        listen 8080;

        location / {
            proxy_pass $validator_backend;
            proxy_http_version 1.1;
            proxy_set_header Upgrade $http_upgrade;
            proxy_set_header Connection $connection_upgrade;
            proxy_set_header Host $host;
            proxy_read_timeout 3600s;
        }
    }
}
"#;

#[derive(Serialize)]
struct FlyToml<'a> {
    app: &'a str,
    primary_region: &'a str,
    build: FlyBuild,
    env: BTreeMap<&'a str, String>,
    http_service: FlyHttpService,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    mounts: Vec<FlyMount>,
    vm: Vec<FlyVm<'a>>,
}

#[derive(Serialize)]
struct FlyBuild {
    dockerfile: String,
}

#[derive(Serialize)]
struct FlyHttpService {
    internal_port: u16,
    force_https: bool,
    auto_stop_machines: String,
    auto_start_machines: bool,
    min_machines_running: u32,
}

#[derive(Serialize)]
struct FlyMount {
    source: String,
    destination: String,
}

#[derive(Serialize)]
struct FlyVm<'a> {
    cpu_kind: &'a str,
    cpus: u32,
    memory_mb: u32,
}

pub fn render_fly_toml(cfg: &DeploymentConfig) -> Result<String, toml::ser::Error> {
    let mounts = if cfg.skip_volume {
        Vec::new()
    } else {
        vec![FlyMount {
            source: volume_name(&cfg.name),
            destination: LEDGER_DIR.to_string(),
        }]
    };

    let manifest = FlyToml {
        app: &cfg.name,
        primary_region: &cfg.region,
        build: FlyBuild {
            dockerfile: "Dockerfile".to_string(),
        },
        env: BTreeMap::from([("RUST_LOG", "solana=info".to_string())]),
        http_service: FlyHttpService {
            internal_port: PUBLIC_PORT,
            force_https: true,
            auto_stop_machines: "off".to_string(),
            auto_start_machines: true,
            min_machines_running: 1,
        },
        mounts,
        vm: vec![FlyVm {
            cpu_kind: &cfg.resources.cpu_kind,
            cpus: cfg.resources.cpus,
            memory_mb: cfg.resources.memory_mb,
        }],
    };
    toml::to_string(&manifest)
}
