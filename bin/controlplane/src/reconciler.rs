//! The periodic scanner: parses every project's manifest, detects
//! duplicate host ports and duplicate static IPs across the whole
//! workspace, rewrites manifests deterministically, and emits the
//! Mapper. This is the core the rest of the system is built around.

use std::{
  collections::{HashMap, HashSet},
  net::Ipv4Addr,
  path::{Path, PathBuf},
  sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering},
};

use indexmap::IndexMap;

use crate::{
  allocator,
  compose::ComposeFile,
  config::Config,
  discovery,
  model::{
    Mapper, MapperPort, MapperProject, MapperService,
    process_name_from_folder,
  },
  state,
};

static TICKING: AtomicBool = AtomicBool::new(false);
static TICK_COUNT: AtomicU64 = AtomicU64::new(0);
static LAST_TICK_AT_MS: AtomicI64 = AtomicI64::new(0);

pub fn tick_count() -> u64 {
  TICK_COUNT.load(Ordering::Relaxed)
}

pub fn last_tick_age_secs() -> Option<i64> {
  let at = LAST_TICK_AT_MS.load(Ordering::Relaxed);
  if at == 0 {
    return None;
  }
  Some((chrono::Utc::now().timestamp_millis() - at) / 1000)
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
  pub projects_scanned: usize,
  pub projects_excluded: Vec<(PathBuf, String)>,
  pub ports_reassigned: usize,
  pub ips_reassigned: usize,
  pub manifests_written: usize,
  pub mapper_written: bool,
}

/// Runs one reconcile pass, unless one is already in flight (no two
/// ticks overlap) or the skip rule is in effect.
pub async fn tick(config: &Config) -> anyhow::Result<Option<ReconcileReport>> {
  if state::state().terminals.get_values().await.len() > 0 {
    debug!("skipping reconcile tick: active PTY sessions present");
    return Ok(None);
  }

  if TICKING
    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
    .is_err()
  {
    debug!("skipping reconcile tick: previous tick still running");
    return Ok(None);
  }

  let result = run(config).await;

  TICKING.store(false, Ordering::SeqCst);
  TICK_COUNT.fetch_add(1, Ordering::Relaxed);
  LAST_TICK_AT_MS.store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);

  result.map(Some)
}

async fn run(config: &Config) -> anyhow::Result<ReconcileReport> {
  let mut report = ReconcileReport::default();

  let project_dirs = discovery::discover_projects(&config.projects_root);

  // Group by the process-name each project would be addressed by, to
  // detect naming collisions before doing any other work.
  let mut by_process_name: HashMap<String, Vec<PathBuf>> = HashMap::new();
  for dir in &project_dirs {
    let folder = dir.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    by_process_name
      .entry(process_name_from_folder(folder))
      .or_default()
      .push(dir.clone());
  }
  let colliding: HashSet<PathBuf> = by_process_name
    .values()
    .filter(|dirs| dirs.len() > 1)
    .flatten()
    .cloned()
    .collect();
  for dir in &colliding {
    warn!(
      "excluding project {:?} from reconcile tick: process-name collides with another project",
      dir
    );
    report
      .projects_excluded
      .push((dir.clone(), "process-name collision".to_string()));
  }

  let mut projects = Vec::new();
  for dir in &project_dirs {
    if colliding.contains(dir) {
      continue;
    }
    let manifest_path = discovery::manifest_path(dir);
    match ComposeFile::read(&manifest_path) {
      Ok(compose) => {
        report.projects_scanned += 1;
        projects.push((dir.clone(), manifest_path, compose));
      }
      Err(e) => {
        warn!("excluding project {:?}: failed to parse manifest: {e:#}", dir);
        report.projects_excluded.push((dir.clone(), e.to_string()));
      }
    }
  }

  // Pass one: census.
  let mut port_counts: HashMap<u16, usize> = HashMap::new();
  let mut ip_counts: HashMap<Ipv4Addr, usize> = HashMap::new();
  for (_, _, compose) in &projects {
    for svc in compose.services.values() {
      for port in &svc.ports {
        if let Some(host_port) = port.host_port {
          *port_counts.entry(host_port).or_default() += 1;
        }
      }
      for attachment in svc.networks.values() {
        if let Some(ip) = attachment.ipv4 {
          *ip_counts.entry(ip).or_default() += 1;
        }
      }
    }
  }

  // Pass two: fix and write, in the already-sorted project order.
  for (dir, manifest_path, mut compose) in projects {
    let original = std::fs::read_to_string(&manifest_path)?;

    for (svc_name, svc) in compose.services.iter_mut() {
      for port in svc.ports.iter_mut() {
        let Some(host_port) = port.host_port else { continue };
        if port_counts.get(&host_port).copied().unwrap_or(0) > 1 {
          let used: HashSet<u16> = port_counts.keys().copied().collect();
          if let Some(new_port) = allocator::next_host_port(&used) {
            decrement_count(&mut port_counts, &host_port);
            port_counts.insert(new_port, 1);
            port.host_port = Some(new_port);
            report.ports_reassigned += 1;
          } else {
            warn!(
              "host port space exhausted: leaving {:?} service {svc_name} on colliding port {host_port}",
              dir
            );
          }
        }
      }
      for attachment in svc.networks.values_mut() {
        let Some(ip) = attachment.ipv4 else { continue };
        if ip_counts.get(&ip).copied().unwrap_or(0) > 1 {
          let used: HashSet<Ipv4Addr> = ip_counts.keys().copied().collect();
          if let Some(new_ip) = allocator::next_ipv4(config.default_subnet_base, &used) {
            decrement_count(&mut ip_counts, &ip);
            ip_counts.insert(new_ip, 1);
            attachment.ipv4 = Some(new_ip);
            report.ips_reassigned += 1;
          }
        }
      }
    }

    apply_top_level_network_closure(&mut compose, &config.default_network_name);

    let rendered = compose.to_yaml_string()?;
    if rendered != original {
      compose.write(&manifest_path)?;
      report.manifests_written += 1;
      info!("rewrote manifest {:?}", manifest_path);
    }

  }

  let mapper = build_mapper(&config.projects_root, &colliding).await?;
  report.mapper_written = write_mapper_if_changed(&mapper, config).await?;

  Ok(report)
}

fn decrement_count<K: Eq + std::hash::Hash>(counts: &mut HashMap<K, usize>, key: &K) {
  if let Some(count) = counts.get_mut(key) {
    if *count <= 1 {
      counts.remove(key);
    } else {
      *count -= 1;
    }
  }
}

pub(crate) fn apply_top_level_network_closure(compose: &mut ComposeFile, default_network: &str) {
  let referenced: HashSet<String> = compose
    .services
    .values()
    .flat_map(|svc| svc.networks.keys().cloned())
    .collect();

  for name in &referenced {
    compose.ensure_top_level_network(name);
  }

  let to_remove: Vec<String> = compose
    .top_level_networks
    .keys()
    .filter(|name| *name != default_network && !referenced.contains(*name))
    .cloned()
    .collect();
  for name in to_remove {
    compose.top_level_networks.shift_remove(&name);
  }
}

async fn build_mapper(
  projects_root: &Path,
  excluded: &HashSet<PathBuf>,
) -> anyhow::Result<Mapper> {
  let mut mapper = Mapper::default();
  for dir in discovery::discover_projects(projects_root) {
    if excluded.contains(&dir) {
      continue;
    }
    let manifest_path = discovery::manifest_path(&dir);
    let compose = match ComposeFile::read(&manifest_path) {
      Ok(c) => c,
      Err(_) => continue,
    };

    let running = crate::lifecycle::running_services(&dir).await.unwrap_or_default();

    let mut services = IndexMap::new();
    for (name, svc) in &compose.services {
      let live = if running.contains(name) {
        crate::model::ServiceStatus::Running
      } else {
        crate::model::ServiceStatus::Stopped
      };
      let transient = state::state()
        .transient
        .get(&crate::model::service_key(&dir, name))
        .await;
      let status = crate::status::merge(live, transient);

      services.insert(
        name.clone(),
        MapperService {
          image: svc.image.clone(),
          restart: svc.restart.map(|r| r.as_compose_str().to_string()),
          ports: svc.ports.iter().map(MapperPort::from).collect(),
          networks: svc
            .networks
            .iter()
            .map(|(n, a)| (n.clone(), a.ipv4))
            .collect(),
          status,
        },
      );
    }

    mapper.projects.insert(
      dir,
      MapperProject { manifest_file: manifest_path, services },
    );
  }
  Ok(mapper)
}

async fn write_mapper_if_changed(mapper: &Mapper, config: &Config) -> anyhow::Result<bool> {
  let previous = state::state().mapper.get(&()).await;
  let changed = match &previous {
    Some(prev) => serde_json::to_string(prev)? != serde_json::to_string(mapper)?,
    None => true,
  };
  if changed {
    state::state().mapper.insert((), mapper.clone()).await;
    let path = config.projects_root.join(".mapper.json");
    let rendered = serde_json::to_vec_pretty(mapper)?;
    crate::atomic::write_atomic(&path, &rendered)?;
  }
  Ok(changed)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{NetworkAttachment, PortMapping, Service};

  fn service_with_port(port: u16) -> Service {
    Service {
      image: Some("nginx".into()),
      ports: vec![PortMapping { container_port: 80, host_port: Some(port), bind_address: None }],
      ..Default::default()
    }
  }

  #[test]
  fn singleton_ports_are_untouched() {
    let mut port_counts: HashMap<u16, usize> = HashMap::new();
    port_counts.insert(8080, 1);
    assert_eq!(port_counts.get(&8080).copied().unwrap_or(0), 1);
  }

  #[test]
  fn network_attachment_default_has_no_ip() {
    let a = NetworkAttachment::default();
    assert!(a.ipv4.is_none());
  }

  #[tokio::test]
  async fn detects_port_collision_across_two_services() {
    let mut services = IndexMap::new();
    services.insert("a".to_string(), service_with_port(8080));
    services.insert("b".to_string(), service_with_port(8080));

    let mut port_counts: HashMap<u16, usize> = HashMap::new();
    for svc in services.values() {
      for port in &svc.ports {
        if let Some(h) = port.host_port {
          *port_counts.entry(h).or_default() += 1;
        }
      }
    }
    assert_eq!(port_counts.get(&8080), Some(&2));
  }
}
