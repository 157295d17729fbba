//! Parses the reverse-proxy config into a light structural model for
//! the UI, and edits it atomically: backup, write, test, reload,
//! restore-on-failure.

mod tokenizer;

use std::path::{Path, PathBuf};

use futures_util::future::BoxFuture;
use serde::Serialize;

use crate::config::Config;
use tokenizer::Node;

#[derive(Debug, Clone, Serialize)]
pub struct ProxyModel {
  pub upstreams: Vec<Upstream>,
  pub servers: Vec<Server>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Upstream {
  pub name: String,
  pub servers: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Server {
  pub listen: Vec<String>,
  pub server_name: Vec<String>,
  pub ssl_certificate: Option<String>,
  pub ssl_certificate_key: Option<String>,
  pub locations: Vec<Location>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Location {
  pub location: String,
  pub proxy_pass: Option<String>,
  pub redirect: Option<String>,
  pub raw: String,
}

pub fn parse_model(contents: &str) -> anyhow::Result<ProxyModel> {
  let nodes = tokenizer::parse(contents)?;
  let mut upstreams = Vec::new();
  let mut servers = Vec::new();

  for node in &nodes {
    let Node::Block(block) = node else { continue };
    if let Some(name) = block.header.strip_prefix("upstream ") {
      upstreams.push(Upstream {
        name: name.trim().to_string(),
        servers: directive_values(&block.children, "server"),
      });
    } else if block.header.trim() == "server" {
      servers.push(parse_server(block));
    }
  }

  Ok(ProxyModel { upstreams, servers })
}

fn parse_server(block: &tokenizer::Block) -> Server {
  let mut listen = Vec::new();
  let mut server_name = Vec::new();
  let mut ssl_certificate = None;
  let mut ssl_certificate_key = None;
  let mut locations = Vec::new();

  for child in &block.children {
    match child {
      Node::Directive(d) => {
        let mut parts = d.splitn(2, char::is_whitespace);
        let keyword = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default().trim().to_string();
        match keyword {
          "listen" => listen.push(rest),
          "server_name" => server_name.push(rest),
          "ssl_certificate" => ssl_certificate = Some(rest),
          "ssl_certificate_key" => ssl_certificate_key = Some(rest),
          _ => {}
        }
      }
      Node::Block(b) if b.header.starts_with("location") => {
        locations.push(parse_location(b));
      }
      _ => {}
    }
  }

  Server { listen, server_name, ssl_certificate, ssl_certificate_key, locations }
}

fn parse_location(block: &tokenizer::Block) -> Location {
  let location = block.header.trim_start_matches("location").trim().to_string();
  let mut proxy_pass = None;
  let mut redirect = None;
  for child in &block.children {
    if let Node::Directive(d) = child {
      let mut parts = d.splitn(2, char::is_whitespace);
      match parts.next().unwrap_or_default() {
        "proxy_pass" => proxy_pass = Some(parts.next().unwrap_or_default().trim().to_string()),
        "return" => redirect = Some(parts.next().unwrap_or_default().trim().to_string()),
        _ => {}
      }
    }
  }
  Location { location, proxy_pass, redirect, raw: tokenizer::render(&block.children, 0) }
}

fn directive_values(nodes: &[Node], keyword: &str) -> Vec<String> {
  nodes
    .iter()
    .filter_map(|n| match n {
      Node::Directive(d) if d.starts_with(keyword) => {
        Some(d[keyword.len()..].trim().to_string())
      }
      _ => None,
    })
    .collect()
}

/// Which step of the save protocol failed, surfaced verbatim to the
/// client so the UI can show the right message.
#[derive(Debug)]
pub enum SaveError {
  Test { stderr: String },
  Reload { stderr: String },
}

pub trait ProxyController: Send + Sync {
  fn test<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, anyhow::Result<()>>;
  fn reload<'a>(&'a self) -> BoxFuture<'a, anyhow::Result<()>>;
}

pub struct NginxController {
  pub binary: String,
  pub reload_command: String,
  pub service_manager: String,
}

impl NginxController {
  pub fn from_config(config: &Config) -> Self {
    NginxController {
      binary: config.proxy_binary.clone(),
      reload_command: config.proxy_reload_command.clone(),
      service_manager: config.service_manager.clone(),
    }
  }
}

impl ProxyController for NginxController {
  fn test<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, anyhow::Result<()>> {
    use futures_util::FutureExt;
    async move {
      let cmd = format!("{} -t -c {}", self.binary, path.display());
      let out = command::run_standard_command(&cmd, None, std::time::Duration::from_secs(10)).await;
      if out.success() {
        Ok(())
      } else {
        anyhow::bail!("{}", out.combined())
      }
    }
    .boxed()
  }

  fn reload<'a>(&'a self) -> BoxFuture<'a, anyhow::Result<()>> {
    use futures_util::FutureExt;
    async move {
      let out = command::run_standard_command(&self.reload_command, None, std::time::Duration::from_secs(10)).await;
      if out.success() {
        return Ok(());
      }
      warn!("primary proxy reload failed, falling back to service manager: {}", out.stderr);
      let fallback = format!("{} reload nginx", self.service_manager);
      let out = command::run_standard_command(&fallback, None, std::time::Duration::from_secs(10)).await;
      if out.success() {
        Ok(())
      } else {
        anyhow::bail!("{}", out.combined())
      }
    }
    .boxed()
  }
}

/// Writes `new_contents` to `path`, testing and reloading via
/// `controller`, rolling back to the prior byte-identical contents on
/// any failure.
pub async fn save_with_rollback(
  path: &Path,
  new_contents: &str,
  controller: &dyn ProxyController,
) -> Result<(), SaveError> {
  let original = std::fs::read_to_string(path).ok();
  let backup_path = backup_path_for(path);

  if let Some(original) = &original {
    std::fs::write(&backup_path, original).map_err(|e| SaveError::Test { stderr: e.to_string() })?;
  }

  let restore = |backup_path: &PathBuf, path: &Path| {
    if backup_path.exists() {
      let _ = std::fs::copy(backup_path, path);
      let _ = std::fs::remove_file(backup_path);
    }
  };

  if let Err(e) = crate::atomic::write_atomic(path, new_contents.as_bytes()) {
    restore(&backup_path, path);
    return Err(SaveError::Test { stderr: e.to_string() });
  }

  if let Err(e) = controller.test(path).await {
    restore(&backup_path, path);
    return Err(SaveError::Test { stderr: e.to_string() });
  }

  if let Err(e) = controller.reload().await {
    restore(&backup_path, path);
    return Err(SaveError::Reload { stderr: e.to_string() });
  }

  if backup_path.exists() {
    let _ = std::fs::remove_file(&backup_path);
  }
  Ok(())
}

fn backup_path_for(path: &Path) -> PathBuf {
  let ts = chrono::Utc::now().timestamp_millis();
  let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("proxy.conf");
  path.with_file_name(format!("{file_name}.bak.{ts}"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_upstreams_and_servers() {
    let contents = r#"
      upstream app_a {
        server 127.0.0.1:8080;
      }
      server {
        listen 443 ssl;
        server_name app.example.com;
        ssl_certificate /etc/ssl/cert.pem;
        location / {
          proxy_pass http://app_a;
        }
      }
    "#;
    let model = parse_model(contents).unwrap();
    assert_eq!(model.upstreams.len(), 1);
    assert_eq!(model.upstreams[0].name, "app_a");
    assert_eq!(model.servers.len(), 1);
    assert_eq!(model.servers[0].locations[0].proxy_pass.as_deref(), Some("http://app_a"));
  }

  struct FailingController;
  impl ProxyController for FailingController {
    fn test<'a>(&'a self, _path: &'a Path) -> BoxFuture<'a, anyhow::Result<()>> {
      use futures_util::FutureExt;
      async { anyhow::bail!("syntax error on line 3") }.boxed()
    }
    fn reload<'a>(&'a self) -> BoxFuture<'a, anyhow::Result<()>> {
      use futures_util::FutureExt;
      async { Ok(()) }.boxed()
    }
  }

  #[tokio::test]
  async fn failed_test_restores_original_contents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fleet.conf");
    std::fs::write(&path, "server { listen 80; }\n").unwrap();

    let result = save_with_rollback(&path, "not valid nginx", &FailingController).await;
    assert!(matches!(result, Err(SaveError::Test { .. })));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "server { listen 80; }\n");
  }
}
