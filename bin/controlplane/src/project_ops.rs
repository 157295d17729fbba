//! Project-management operations driven by the HTTP surface: apply a
//! full services map, copy the `template` project under a new name,
//! rename, delete, and per-project config-directory CRUD.
//!
//! None of this writes compose manifests directly through
//! `ComposeFile` without going through the same normalization the
//! Reconciler applies on its own passes, so a manifest touched here
//! looks exactly like one the Reconciler would have written.

use std::{
  collections::HashSet,
  net::Ipv4Addr,
  path::{Path, PathBuf},
};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::{
  allocator,
  compose::ComposeFile,
  config::Config,
  discovery,
  error::{AppError, AppResult},
  lifecycle,
  model::{EnvEntry, NetworkAttachment, PortMapping, RestartPolicy, Service},
  reconciler,
};
use validations::{StringValidator, StringValidatorMatches};

const CONFIG_DIR: &str = "config";

/// Resolves a client-supplied relative project path against the
/// workspace root, refusing anything that would escape it.
pub fn resolve_project_dir(config: &Config, relative: &str) -> AppResult<PathBuf> {
  let relative = relative.trim_start_matches('/');
  if relative.is_empty() {
    return Err(AppError::BadRequest("path is required".into()));
  }
  let candidate = PathBuf::from(relative);
  if candidate.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
    return Err(AppError::BadRequest("path must not contain `..`".into()));
  }
  Ok(config.projects_root.join(candidate))
}

async fn workspace_used_host_ports(config: &Config) -> HashSet<u16> {
  let mut used = HashSet::new();
  for dir in discovery::discover_projects(&config.projects_root) {
    let Ok(compose) = ComposeFile::read(discovery::manifest_path(&dir)) else { continue };
    for svc in compose.services.values() {
      for port in &svc.ports {
        if let Some(host_port) = port.host_port {
          used.insert(host_port);
        }
      }
    }
  }
  used
}

pub async fn workspace_used_ips(config: &Config) -> HashSet<Ipv4Addr> {
  let mut used = HashSet::new();
  for dir in discovery::discover_projects(&config.projects_root) {
    let Ok(compose) = ComposeFile::read(discovery::manifest_path(&dir)) else { continue };
    for svc in compose.services.values() {
      for attachment in svc.networks.values() {
        if let Some(ip) = attachment.ipv4 {
          used.insert(ip);
        }
      }
    }
  }
  used
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
  pub path: String,
  pub services: IndexMap<String, ApplyService>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyService {
  pub image: Option<String>,
  pub restart: Option<String>,
  #[serde(default)]
  pub ports: Vec<ApplyPort>,
  #[serde(default)]
  pub volumes: Vec<String>,
  #[serde(default)]
  pub environment: Vec<ApplyEnv>,
  #[serde(default)]
  pub networks: IndexMap<String, ApplyNetwork>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPort {
  pub container_port: u16,
  #[serde(default)]
  pub host_port: Option<u16>,
  #[serde(default)]
  pub bind_address: Option<Ipv4Addr>,
}

#[derive(Debug, Deserialize)]
pub struct ApplyEnv {
  pub key: String,
  pub value: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ApplyNetwork {
  pub ipv4: Option<Ipv4Addr>,
}

/// Upserts/deletes a project's services from a full services map,
/// assigning host ports to any port left unspecified, then triggers a
/// reconcile so the usual normalization and write discipline applies.
pub async fn apply(config: &Config, req: ApplyRequest) -> AppResult<()> {
  let dir = resolve_project_dir(config, &req.path)?;
  let manifest_path = discovery::manifest_path(&dir);
  let mut compose = ComposeFile::read(&manifest_path)
    .map_err(|e| AppError::NotFound(format!("project not found: {e}")))?;

  let name_validator = StringValidator::default()
    .min_length(1)
    .max_length(50)
    .matches(StringValidatorMatches::ServiceName);

  let mut used_ports = workspace_used_host_ports(config).await;
  let mut next_services = IndexMap::new();

  for (name, incoming) in req.services {
    name_validator.validate(&name).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let existing = compose.services.get(&name);
    let extra = existing.map(|s| s.extra.clone()).unwrap_or_default();
    let networks_was_list = existing.map(|s| s.networks_was_list).unwrap_or(false);

    let restart = match incoming.restart.as_deref() {
      Some(s) => Some(
        RestartPolicy::parse(s)
          .ok_or_else(|| AppError::BadRequest(format!("invalid restart policy: {s}")))?,
      ),
      None => None,
    };

    let mut ports = Vec::with_capacity(incoming.ports.len());
    for p in incoming.ports {
      let host_port = match p.host_port {
        Some(h) => h,
        None => {
          let assigned = allocator::next_host_port(&used_ports)
            .ok_or_else(|| AppError::Conflict("host port space exhausted".into()))?;
          used_ports.insert(assigned);
          assigned
        }
      };
      used_ports.insert(host_port);
      ports.push(PortMapping {
        container_port: p.container_port,
        host_port: Some(host_port),
        bind_address: p.bind_address,
      });
    }

    let environment = incoming
      .environment
      .into_iter()
      .map(|e| EnvEntry { key: e.key, value: e.value })
      .collect();

    let networks = incoming
      .networks
      .into_iter()
      .map(|(net_name, a)| (net_name, NetworkAttachment { ipv4: a.ipv4, extra: Default::default() }))
      .collect();

    next_services.insert(
      name,
      Service {
        image: incoming.image,
        restart,
        ports,
        volumes: incoming.volumes.into_iter().map(serde_yaml_ng::Value::String).collect(),
        environment,
        networks_was_list,
        networks,
        extra,
      },
    );
  }

  compose.services = next_services;
  reconciler::apply_top_level_network_closure(&mut compose, &config.default_network_name);
  compose.write(&manifest_path).map_err(AppError::Internal)?;

  if let Err(e) = reconciler::tick(config).await {
    warn!("reconcile after apply failed: {e:#}");
  }
  Ok(())
}

fn validate_project_name(name: &str) -> AppResult<()> {
  StringValidator::default()
    .min_length(1)
    .max_length(50)
    .matches(StringValidatorMatches::ServiceName)
    .validate(name)
    .map_err(|e| AppError::BadRequest(e.to_string()))
}

/// Copies the `template` project to a new directory, reallocating
/// every host port and static IP it carries so the copy never
/// collides with its source.
pub async fn add(config: &Config, new_name: &str) -> AppResult<()> {
  validate_project_name(new_name)?;

  let template_dir = config.projects_root.join("template");
  let new_dir = config.projects_root.join(new_name);

  if !discovery::manifest_path(&template_dir).is_file() {
    return Err(AppError::NotFound("template project not found".into()));
  }
  if new_dir.exists() {
    return Err(AppError::Conflict(format!("project {new_name} already exists")));
  }

  copy_dir_recursive(&template_dir, &new_dir).map_err(AppError::Internal)?;

  let manifest_path = discovery::manifest_path(&new_dir);
  let mut compose = ComposeFile::read(&manifest_path).map_err(AppError::Internal)?;

  let mut used_ports = workspace_used_host_ports(config).await;
  let mut used_ips = workspace_used_ips(config).await;

  for svc in compose.services.values_mut() {
    for port in svc.ports.iter_mut() {
      if port.host_port.is_some() {
        let new_port = allocator::next_host_port(&used_ports)
          .ok_or_else(|| AppError::Conflict("host port space exhausted".into()))?;
        used_ports.insert(new_port);
        port.host_port = Some(new_port);
      }
    }
    for attachment in svc.networks.values_mut() {
      if attachment.ipv4.is_some() {
        if let Some(ip) = allocator::next_ipv4(config.default_subnet_base, &used_ips) {
          used_ips.insert(ip);
          attachment.ipv4 = Some(ip);
        }
      }
    }
  }

  reconciler::apply_top_level_network_closure(&mut compose, &config.default_network_name);
  compose.write(&manifest_path).map_err(AppError::Internal)?;

  if let Err(e) = reconciler::tick(config).await {
    warn!("reconcile after add failed: {e:#}");
  }
  Ok(())
}

fn copy_dir_recursive(from: &Path, to: &Path) -> anyhow::Result<()> {
  std::fs::create_dir_all(to)?;
  for entry in std::fs::read_dir(from)? {
    let entry = entry?;
    let name = entry.file_name();
    if discovery::is_pruned_dir_name(&name.to_string_lossy()) {
      continue;
    }
    let src = entry.path();
    let dst = to.join(&name);
    if entry.file_type()?.is_dir() {
      copy_dir_recursive(&src, &dst)?;
    } else {
      std::fs::copy(&src, &dst)?;
    }
  }
  Ok(())
}

async fn require_stopped(dir: &Path, verb: &str) -> AppResult<()> {
  let running = lifecycle::running_services(dir).await.unwrap_or_default();
  if !running.is_empty() {
    return Err(AppError::Conflict(format!("Cannot {verb} project with running services")));
  }
  Ok(())
}

fn folder_name(dir: &Path) -> &str {
  dir.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

/// Renames a project directory. Refuses the `template` project and
/// refuses while any of its services are running.
pub async fn rename(config: &Config, path: &str, new_name: &str) -> AppResult<()> {
  let dir = resolve_project_dir(config, path)?;
  if folder_name(&dir) == "template" {
    return Err(AppError::BadRequest("cannot rename the template project".into()));
  }
  validate_project_name(new_name)?;
  if new_name == "template" {
    return Err(AppError::BadRequest("cannot rename a project to `template`".into()));
  }

  require_stopped(&dir, "rename").await?;

  let new_dir = config.projects_root.join(new_name);
  if new_dir.exists() {
    return Err(AppError::Conflict(format!("project {new_name} already exists")));
  }

  std::fs::rename(&dir, &new_dir).map_err(|e| AppError::Internal(e.into()))?;

  if let Err(e) = reconciler::tick(config).await {
    warn!("reconcile after rename failed: {e:#}");
  }
  Ok(())
}

/// Deletes a project directory. Refuses the `template` project,
/// requires the caller to echo the folder name back as confirmation,
/// and refuses while any of its services are running.
pub async fn delete(config: &Config, path: &str, confirm_name: &str) -> AppResult<()> {
  let dir = resolve_project_dir(config, path)?;
  let folder = folder_name(&dir).to_string();
  if folder == "template" {
    return Err(AppError::BadRequest("cannot delete the template project".into()));
  }
  if confirm_name != folder {
    return Err(AppError::BadRequest("confirmation name does not match".into()));
  }

  require_stopped(&dir, "delete").await?;

  std::fs::remove_dir_all(&dir).map_err(|e| AppError::Internal(e.into()))?;

  if let Err(e) = reconciler::tick(config).await {
    warn!("reconcile after delete failed: {e:#}");
  }
  Ok(())
}

fn config_filename_validator() -> StringValidator {
  StringValidator::default().min_length(1).max_length(255).matches(StringValidatorMatches::PathSegment)
}

/// Lists the filenames present in a project's `config/` directory.
pub fn list_config_files(config: &Config, path: &str) -> AppResult<Vec<String>> {
  let dir = resolve_project_dir(config, path)?.join(CONFIG_DIR);
  if !dir.is_dir() {
    return Ok(Vec::new());
  }
  let mut names = Vec::new();
  for entry in std::fs::read_dir(&dir).map_err(|e| AppError::Internal(e.into()))? {
    let entry = entry.map_err(|e| AppError::Internal(e.into()))?;
    if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
      names.push(entry.file_name().to_string_lossy().into_owned());
    }
  }
  names.sort();
  Ok(names)
}

pub fn read_config_file(config: &Config, path: &str, filename: &str) -> AppResult<String> {
  config_filename_validator().validate(filename).map_err(|e| AppError::BadRequest(e.to_string()))?;
  let file = resolve_project_dir(config, path)?.join(CONFIG_DIR).join(filename);
  std::fs::read_to_string(&file)
    .map_err(|_| AppError::NotFound(format!("config file {filename} not found")))
}

pub fn save_config_file(config: &Config, path: &str, filename: &str, contents: &str) -> AppResult<()> {
  config_filename_validator().validate(filename).map_err(|e| AppError::BadRequest(e.to_string()))?;
  let dir = resolve_project_dir(config, path)?.join(CONFIG_DIR);
  std::fs::create_dir_all(&dir).map_err(|e| AppError::Internal(e.into()))?;
  crate::atomic::write_atomic(&dir.join(filename), contents.as_bytes()).map_err(AppError::Internal)
}
