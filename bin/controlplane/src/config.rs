//! Process configuration: CLI flags (clap) layered over environment
//! variables (envy), with `.env` loaded first and `_FILE` suffixed
//! variables honored for anything secret-shaped.

use std::{net::SocketAddr, net::Ipv4Addr, path::PathBuf, sync::OnceLock};

use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug, Default)]
#[command(name = "controlplane", about = "Compose fleet control plane")]
pub struct CliArgs {
  /// Root directory to scan for compose projects.
  #[arg(long)]
  pub projects_root: Option<PathBuf>,

  /// Address to bind the HTTP/WS server on.
  #[arg(long)]
  pub bind_address: Option<SocketAddr>,

  /// Run one reconcile pass and exit instead of starting the server.
  #[arg(long, default_value_t = false)]
  pub once: bool,

  /// Path to the nginx-style proxy config this process edits.
  #[arg(long)]
  pub proxy_config: Option<PathBuf>,
}

#[derive(Deserialize, Debug)]
struct Env {
  controlplane_projects_root: Option<PathBuf>,
  controlplane_bind_address: Option<SocketAddr>,
  controlplane_proxy_config: Option<PathBuf>,
  controlplane_proxy_binary: Option<String>,
  controlplane_proxy_reload_command: Option<String>,
  controlplane_service_manager: Option<String>,
  controlplane_access_log_paths: Option<String>,
  controlplane_login_password: Option<String>,
  controlplane_login_password_file: Option<PathBuf>,
  controlplane_reconcile_interval_secs: Option<u64>,
  controlplane_default_network_name: Option<String>,
  controlplane_default_subnet_base: Option<Ipv4Addr>,
  controlplane_container_cli: Option<String>,
  controlplane_compose_args: Option<String>,
  controlplane_cors_origins: Option<String>,
  controlplane_log_level: Option<String>,
  controlplane_log_mode: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
  pub projects_root: PathBuf,
  pub bind_address: SocketAddr,

  pub proxy_config: PathBuf,
  /// The proxy binary invoked for `test`/`reload` (eg `nginx`).
  pub proxy_binary: String,
  pub proxy_reload_command: String,
  /// Fallback used when the proxy binary's own reload signal isn't
  /// available (eg `systemctl reload nginx`).
  pub service_manager: String,
  pub access_log_paths: Vec<PathBuf>,

  /// Plaintext password compared on `/api/login`. Empty disables the
  /// check (every request is treated as authenticated) — used for
  /// local, single-user deployments behind an already-trusted proxy.
  pub login_password: String,

  pub reconcile_interval: std::time::Duration,
  pub default_network_name: String,
  pub default_subnet_base: Ipv4Addr,

  pub container_cli: String,
  pub compose_args: Vec<String>,

  pub cors_origins: Vec<String>,
  pub log_level: logger::LogLevel,
  pub log_mode: logger::StdioLogMode,

  pub once: bool,
}

fn maybe_read_item_from_file(
  value: Option<String>,
  file: Option<PathBuf>,
) -> anyhow::Result<Option<String>> {
  if let Some(value) = value {
    return Ok(Some(value));
  }
  if let Some(file) = file {
    let contents = std::fs::read_to_string(&file).map_err(|e| {
      anyhow::anyhow!("failed to read secret file {file:?}: {e}")
    })?;
    return Ok(Some(contents.trim().to_string()));
  }
  Ok(None)
}

fn parse_log_level(s: &str) -> Option<logger::LogLevel> {
  match s.to_lowercase().as_str() {
    "trace" => Some(logger::LogLevel::Trace),
    "debug" => Some(logger::LogLevel::Debug),
    "warn" => Some(logger::LogLevel::Warn),
    "error" => Some(logger::LogLevel::Error),
    "info" => Some(logger::LogLevel::Info),
    _ => None,
  }
}

fn parse_log_mode(s: &str) -> Option<logger::StdioLogMode> {
  match s.to_lowercase().as_str() {
    "json" => Some(logger::StdioLogMode::Json),
    "none" => Some(logger::StdioLogMode::None),
    "standard" => Some(logger::StdioLogMode::Standard),
    _ => None,
  }
}

impl Config {
  fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    let args = CliArgs::parse();
    let env: Env = envy::from_env()
      .map_err(|e| anyhow::anyhow!("failed to parse environment: {e}"))?;

    let login_password = maybe_read_item_from_file(
      env.controlplane_login_password,
      env.controlplane_login_password_file,
    )?
    .unwrap_or_default();

    let access_log_paths = env
      .controlplane_access_log_paths
      .as_deref()
      .unwrap_or("/var/log/nginx/access.log")
      .split(',')
      .map(|s| PathBuf::from(s.trim()))
      .collect();

    let compose_args = env
      .controlplane_compose_args
      .as_deref()
      .unwrap_or("compose")
      .split_whitespace()
      .map(str::to_string)
      .collect();

    let cors_origins = env
      .controlplane_cors_origins
      .as_deref()
      .unwrap_or("")
      .split(',')
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(str::to_string)
      .collect();

    Ok(Config {
      projects_root: args
        .projects_root
        .or(env.controlplane_projects_root)
        .unwrap_or_else(|| PathBuf::from("/opt/compose-projects")),
      bind_address: args
        .bind_address
        .or(env.controlplane_bind_address)
        .unwrap_or_else(|| "127.0.0.1:8120".parse().unwrap()),

      proxy_config: args
        .proxy_config
        .or(env.controlplane_proxy_config)
        .unwrap_or_else(|| PathBuf::from("/etc/nginx/conf.d/fleet.conf")),
      proxy_binary: env.controlplane_proxy_binary.unwrap_or_else(|| "nginx".to_string()),
      proxy_reload_command: env
        .controlplane_proxy_reload_command
        .unwrap_or_else(|| "nginx -s reload".to_string()),
      service_manager: env
        .controlplane_service_manager
        .unwrap_or_else(|| "systemctl".to_string()),
      access_log_paths,

      login_password,

      reconcile_interval: std::time::Duration::from_secs(
        env.controlplane_reconcile_interval_secs.unwrap_or(5),
      ),
      default_network_name: env
        .controlplane_default_network_name
        .unwrap_or_else(|| "fleet".to_string()),
      default_subnet_base: env
        .controlplane_default_subnet_base
        .unwrap_or(Ipv4Addr::new(172, 28, 0, 0)),

      container_cli: env.controlplane_container_cli.unwrap_or_else(|| "docker".to_string()),
      compose_args,

      cors_origins,
      log_level: env
        .controlplane_log_level
        .as_deref()
        .and_then(parse_log_level)
        .unwrap_or(logger::LogLevel::Info),
      log_mode: env
        .controlplane_log_mode
        .as_deref()
        .and_then(parse_log_mode)
        .unwrap_or(logger::StdioLogMode::Standard),

      once: args.once,
    })
  }
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// The global config singleton. Panics if `init` hasn't been called.
pub fn config() -> &'static Config {
  CONFIG.get().expect("config not initialized")
}

pub fn init() -> anyhow::Result<&'static Config> {
  let config = Config::load()?;
  Ok(CONFIG.get_or_init(|| config))
}
