//! `action=log`: follow the proxy access log, filtered down to the
//! requests whose upstream matches the caller-supplied IPv4, and
//! parsed into structured JSON records. Lines that don't match the
//! expected combined-log shape are forwarded as `{"raw": "..."}`
//! rather than dropped.

use std::{net::IpAddr, net::Ipv4Addr, path::Path, sync::OnceLock};

use axum::extract::ws::{Message, WebSocket};
use futures_util::SinkExt;
use portable_pty::CommandBuilder;
use regex::Regex;
use serde::Serialize;

use crate::{config, state};

use super::{pty, SessionGuard};

fn line_regex() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(
      r#"^(?P<remote>\S+) \S+ \S+ \[(?P<time>[^\]]+)\] "(?P<method>\S+) (?P<path>\S+) \S+" (?P<status>\d+) (?P<size>\d+) "(?P<referer>[^"]*)" "(?P<ua>[^"]*)" (?P<upstream>\S+)$"#,
    )
    .expect("static log line regex is valid")
  })
}

#[derive(Debug, Serialize)]
struct LogRecord<'a> {
  remote: &'a str,
  time: &'a str,
  method: &'a str,
  path: &'a str,
  status: u16,
  size: u64,
  referer: &'a str,
  ua: &'a str,
  upstream: &'a str,
}

fn upstream_ip(upstream: &str) -> Option<Ipv4Addr> {
  upstream.split(':').next()?.parse().ok()
}

fn to_json(line: &str, target: Ipv4Addr) -> Option<String> {
  let caps = line_regex().captures(line);
  match caps {
    Some(caps) => {
      let upstream = caps.name("upstream")?.as_str();
      if upstream_ip(upstream) != Some(target) {
        return None;
      }
      let record = LogRecord {
        remote: caps.name("remote")?.as_str(),
        time: caps.name("time")?.as_str(),
        method: caps.name("method")?.as_str(),
        path: caps.name("path")?.as_str(),
        status: caps.name("status")?.as_str().parse().ok()?,
        size: caps.name("size")?.as_str().parse().ok()?,
        referer: caps.name("referer")?.as_str(),
        ua: caps.name("ua")?.as_str(),
        upstream,
      };
      serde_json::to_string(&record).ok()
    }
    None => {
      // Unparseable line: still forward it, filtered only by a raw
      // substring check for the target's dotted form, best-effort.
      if line.contains(&target.to_string()) {
        serde_json::to_string(&serde_json::json!({ "raw": line })).ok()
      } else {
        None
      }
    }
  }
}

/// Looks up the first static IPv4 attached to `service` in `project_dir`
/// from an already-fetched mapper snapshot. Pure and unit-testable;
/// [`resolve_target_ip`] is the thin async wrapper over live state.
fn find_ip_in_mapper(mapper: &crate::model::Mapper, project_dir: &Path, service: &str) -> Option<Ipv4Addr> {
  let project = mapper.projects.get(project_dir)?;
  let svc = project.services.get(service)?;
  svc.networks.values().find_map(|ip| *ip)
}

/// Resolves the target upstream IPv4 for `action=log` from the
/// caller-supplied `?ip=`, falling back to the mapper's record of the
/// named service's network attachments per spec.md §4.7 ("Requires an
/// IPv4 `ip` (resolvable from the mapper if omitted)").
async fn resolve_target_ip(project_dir: &Path, service: &str, ip: Option<IpAddr>) -> Option<Ipv4Addr> {
  if let Some(IpAddr::V4(v4)) = ip {
    return Some(v4);
  }

  let mapper = state::state().mapper.get(&()).await?;
  find_ip_in_mapper(&mapper, project_dir, service)
}

pub async fn run(socket: WebSocket, project_dir: &Path, service: &str, ip: Option<IpAddr>) -> anyhow::Result<()> {
  let mut socket = socket;

  let target = match resolve_target_ip(project_dir, service, ip).await {
    Some(v4) => v4,
    None => {
      let _ = socket
        .send(Message::Text(
          "log action requires a resolvable ip: pass ?ip= or ensure the service has a known network attachment"
            .into(),
        ))
        .await;
      return Ok(());
    }
  };

  let config = config::config();
  let Some(path) = config.access_log_paths.first() else {
    let _ = socket.send(Message::Text("no access log path configured".into())).await;
    return Ok(());
  };

  let mut cmd = CommandBuilder::new("tail");
  cmd.arg("-F");
  cmd.arg("-n");
  cmd.arg("0");
  cmd.arg(path);

  let spawned = pty::spawn(cmd, None)?;
  let _guard = SessionGuard::register(spawned.cancel.clone(), spawned.resize_tx.clone()).await;

  pump_filtered(&mut socket, spawned, target).await
}

async fn pump_filtered(
  socket: &mut WebSocket,
  mut spawned: pty::SpawnedPty,
  target: Ipv4Addr,
) -> anyhow::Result<()> {
  let cancel = spawned.cancel.clone();
  let mut pending = Vec::<u8>::new();

  loop {
    tokio::select! {
      _ = cancel.cancelled() => return Ok(()),
      incoming = socket.recv() => {
        match incoming {
          Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
            spawned.cancel.cancel();
            return Ok(());
          }
          Some(Ok(_)) => {}
        }
      }
      outgoing = spawned.stdout_rx.recv() => {
        match outgoing {
          Some(bytes) => {
            pending.extend_from_slice(&bytes);
            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
              let line_bytes: Vec<u8> = pending.drain(..=pos).collect();
              let line = String::from_utf8_lossy(&line_bytes);
              let line = line.trim_end_matches(['\r', '\n']);
              if line.is_empty() {
                continue;
              }
              if let Some(json) = to_json(line, target) {
                if socket.send(Message::Text(json.into())).await.is_err() {
                  spawned.cancel.cancel();
                  return Ok(());
                }
              }
            }
          }
          None => return Ok(()),
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_matching_combined_line_to_structured_json() {
    let line = r#"1.2.3.4 - - [10/Mar/2026:10:00:00 +0000] "GET /health HTTP/1.1" 200 12 "-" "-" 172.28.0.5:80"#;
    let json = to_json(line, Ipv4Addr::new(172, 28, 0, 5)).expect("should match");
    assert!(json.contains("\"status\":200"));
    assert!(json.contains("\"path\":\"/health\""));
  }

  #[test]
  fn filters_out_lines_for_other_upstreams() {
    let line = r#"1.2.3.4 - - [10/Mar/2026:10:00:00 +0000] "GET /health HTTP/1.1" 200 12 "-" "-" 172.28.0.9:80"#;
    assert_eq!(to_json(line, Ipv4Addr::new(172, 28, 0, 5)), None);
  }

  #[test]
  fn resolves_ip_from_mapper_when_omitted() {
    use crate::model::{Mapper, MapperProject, MapperService, ServiceStatus};
    use indexmap::IndexMap;
    use std::path::PathBuf;

    let mut services = IndexMap::new();
    services.insert(
      "web".to_string(),
      MapperService {
        image: None,
        restart: None,
        ports: Vec::new(),
        networks: [("backend".to_string(), Some(Ipv4Addr::new(172, 28, 0, 5)))].into(),
        status: ServiceStatus::Running,
      },
    );
    let mut mapper = Mapper::default();
    let project_dir = PathBuf::from("/opt/compose-projects/demo");
    mapper.projects.insert(
      project_dir.clone(),
      MapperProject { manifest_file: project_dir.join("docker-compose.yml"), services },
    );

    assert_eq!(
      find_ip_in_mapper(&mapper, &project_dir, "web"),
      Some(Ipv4Addr::new(172, 28, 0, 5))
    );
    assert_eq!(find_ip_in_mapper(&mapper, &project_dir, "missing"), None);
  }
}
