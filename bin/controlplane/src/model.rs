//! The data model shared by the Reconciler, the Mapper store, the
//! Lifecycle Driver, and the HTTP surface.

use std::{
  net::Ipv4Addr,
  path::{Path, PathBuf},
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Mapping;

/// A directory containing a compose manifest and the three helper
/// scripts (connect, restart, stop). Keyed by its absolute path.
#[derive(Debug, Clone)]
pub struct Project {
  pub path: PathBuf,
  pub manifest_path: PathBuf,
  pub services: IndexMap<String, Service>,
}

impl Project {
  /// The folder name, eg `apps/foo-bar` -> `foo-bar`.
  pub fn folder_name(&self) -> &str {
    self
      .path
      .file_name()
      .and_then(|n| n.to_str())
      .unwrap_or_default()
  }

  /// Lowercase alphanumeric tail of the project folder, used to scope
  /// compose CLI invocations to a unique project name (`-p`/`COMPOSE_PROJECT_NAME`).
  pub fn process_name(&self) -> String {
    process_name_from_folder(self.folder_name())
  }

  pub fn is_template(&self) -> bool {
    self.folder_name() == "template"
  }

  /// A `Project` with its manifest unparsed, for callers that only
  /// need the path/process-name (lifecycle ops, PTY sessions).
  pub fn at(path: PathBuf) -> Project {
    let manifest_path = crate::discovery::manifest_path(&path);
    Project { path, manifest_path, services: IndexMap::new() }
  }
}

pub fn process_name_from_folder(folder: &str) -> String {
  folder
    .chars()
    .filter(|c| c.is_ascii_alphanumeric())
    .flat_map(|c| c.to_lowercase())
    .collect()
}

/// A named container definition inside a project's manifest.
#[derive(Debug, Clone, Default)]
pub struct Service {
  pub image: Option<String>,
  pub restart: Option<RestartPolicy>,
  pub ports: Vec<PortMapping>,
  pub volumes: Vec<serde_yaml_ng::Value>,
  pub environment: Vec<EnvEntry>,
  /// Whether `networks:` was given in the compact list-of-names form
  /// on parse. Used to keep the same shape on write when nothing
  /// about the attachments changed.
  pub networks_was_list: bool,
  pub networks: IndexMap<String, NetworkAttachment>,
  /// Every service key this model doesn't give semantic meaning to
  /// (build, depends_on, labels, healthcheck, ...), preserved verbatim.
  pub extra: Mapping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
  No,
  Always,
  OnFailure,
  UnlessStopped,
}

impl RestartPolicy {
  pub fn as_compose_str(&self) -> &'static str {
    match self {
      RestartPolicy::No => "no",
      RestartPolicy::Always => "always",
      RestartPolicy::OnFailure => "on-failure",
      RestartPolicy::UnlessStopped => "unless-stopped",
    }
  }

  pub fn parse(s: &str) -> Option<RestartPolicy> {
    match s {
      "no" => Some(RestartPolicy::No),
      "always" => Some(RestartPolicy::Always),
      "on-failure" => Some(RestartPolicy::OnFailure),
      "unless-stopped" => Some(RestartPolicy::UnlessStopped),
      _ => None,
    }
  }
}

/// {containerPort, hostPort?, bindAddress?}. Serialized as one of
/// "C", "H:C", "B:H:C".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
  pub container_port: u16,
  pub host_port: Option<u16>,
  pub bind_address: Option<Ipv4Addr>,
}

impl PortMapping {
  pub fn to_compose_string(&self) -> String {
    match (self.bind_address, self.host_port) {
      (Some(bind), Some(host)) => {
        format!("{bind}:{host}:{}", self.container_port)
      }
      (None, Some(host)) => format!("{host}:{}", self.container_port),
      (_, None) => self.container_port.to_string(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvEntry {
  pub key: String,
  pub value: Option<String>,
}

impl EnvEntry {
  pub fn to_compose_string(&self) -> String {
    match &self.value {
      Some(v) => format!("{}={v}", self.key),
      None => self.key.clone(),
    }
  }
}

/// Either a reference to a named network with an optional static
/// IPv4, or a bare name (ipv4 = None, extra empty).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkAttachment {
  pub ipv4: Option<Ipv4Addr>,
  /// Other per-attachment keys (aliases, priority, ...), preserved verbatim.
  pub extra: Mapping,
}

/// Live status of a service, merged by the Status Aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
  Running,
  Stopped,
  Restarting,
  Stopping,
  Unknown,
}

impl Default for ServiceStatus {
  fn default() -> Self {
    ServiceStatus::Unknown
  }
}

/// Process-local short-lived state set by lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientState {
  Restarting,
  Stopping,
}

impl TransientState {
  /// The status a service must reach before this entry is cleared.
  pub fn terminal_status(&self) -> ServiceStatus {
    match self {
      TransientState::Restarting => ServiceStatus::Running,
      TransientState::Stopping => ServiceStatus::Stopped,
    }
  }

  pub fn as_status(&self) -> ServiceStatus {
    match self {
      TransientState::Restarting => ServiceStatus::Restarting,
      TransientState::Stopping => ServiceStatus::Stopping,
    }
  }
}

/// Key for TransientStatus / status lookups: (project path, service name).
pub type ServiceKey = (PathBuf, String);

pub fn service_key(path: impl AsRef<Path>, service: &str) -> ServiceKey {
  (path.as_ref().to_path_buf(), service.to_string())
}

/// The derived, externally visible index of projects/services with
/// live status. Rebuilt on every reconcile tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mapper {
  pub projects: IndexMap<PathBuf, MapperProject>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperProject {
  pub manifest_file: PathBuf,
  pub services: IndexMap<String, MapperService>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperService {
  pub image: Option<String>,
  pub restart: Option<String>,
  pub ports: Vec<MapperPort>,
  pub networks: IndexMap<String, Option<Ipv4Addr>>,
  pub status: ServiceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperPort {
  pub container_port: u16,
  pub host_port: Option<u16>,
  pub bind_address: Option<Ipv4Addr>,
}

impl From<&PortMapping> for MapperPort {
  fn from(p: &PortMapping) -> Self {
    MapperPort {
      container_port: p.container_port,
      host_port: p.host_port,
      bind_address: p.bind_address,
    }
  }
}

/// Opaque session token -> metadata. In-memory only, expires after 24h.
#[derive(Debug, Clone)]
pub struct Session {
  pub created_at_ms: i64,
  pub client_addr: std::net::IpAddr,
}

pub const SESSION_TTL_MS: i64 = 24 * 60 * 60 * 1000;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn process_name_strips_non_alphanumeric() {
    assert_eq!(process_name_from_folder("My-App_01"), "myapp01");
  }

  #[test]
  fn port_mapping_serializes_to_shortest_form() {
    let p = PortMapping {
      container_port: 80,
      host_port: None,
      bind_address: None,
    };
    assert_eq!(p.to_compose_string(), "80");

    let p = PortMapping {
      container_port: 80,
      host_port: Some(8080),
      bind_address: None,
    };
    assert_eq!(p.to_compose_string(), "8080:80");

    let p = PortMapping {
      container_port: 80,
      host_port: Some(8080),
      bind_address: Some(Ipv4Addr::new(127, 0, 0, 1)),
    };
    assert_eq!(p.to_compose_string(), "127.0.0.1:8080:80");
  }
}
