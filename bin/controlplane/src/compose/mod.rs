//! Compose manifest parsing and serialization.
//!
//! Reads a `docker-compose.yml` into the typed [`model::Service`] shape
//! for the fields the Reconciler cares about (image, restart, ports,
//! volumes, environment, networks), while keeping every other key —
//! build contexts, healthchecks, labels, depends_on, whatever a given
//! compose file uses — untouched in an `extra` bag so a round trip
//! through this module never drops configuration a human wrote.

mod env;
mod networks;
mod ports;

use std::path::Path;

use indexmap::IndexMap;
use serde_yaml_ng::{Mapping, Value};

use crate::model::Service;

pub use ports::parse_port_value;

/// A parsed manifest, with enough structure preserved to write it
/// back out close to byte-identical when nothing changed.
#[derive(Debug, Clone)]
pub struct ComposeFile {
  pub services: IndexMap<String, Service>,
  /// Raw `networks:` top-level entries, preserved verbatim.
  pub top_level_networks: IndexMap<String, Value>,
  /// Every other top-level key (`volumes:`, `configs:`, `x-foo:`, ...).
  pub extra: Mapping,
  /// Original top-level key order, used to keep the file stable.
  top_order: Vec<String>,
}

impl ComposeFile {
  pub fn parse(contents: &str) -> anyhow::Result<ComposeFile> {
    let doc: Value = serde_yaml_ng::from_str(contents)?;
    let Value::Mapping(mut top) = doc else {
      anyhow::bail!("compose file root is not a mapping");
    };

    let mut top_order = Vec::new();
    for (k, _) in top.iter() {
      if let Some(k) = k.as_str() {
        if k != "version" {
          top_order.push(k.to_string());
        }
      }
    }

    top.shift_remove("version");

    let services = match top.shift_remove("services") {
      Some(Value::Mapping(m)) => parse_services(m)?,
      Some(_) => anyhow::bail!("`services` must be a mapping"),
      None => IndexMap::new(),
    };

    let top_level_networks = match top.shift_remove("networks") {
      Some(Value::Mapping(m)) => m
        .into_iter()
        .filter_map(|(k, v)| k.as_str().map(|k| (k.to_string(), v)))
        .collect(),
      Some(_) => anyhow::bail!("`networks` must be a mapping"),
      None => IndexMap::new(),
    };

    Ok(ComposeFile {
      services,
      top_level_networks,
      extra: top,
      top_order,
    })
  }

  pub fn read(path: impl AsRef<Path>) -> anyhow::Result<ComposeFile> {
    let contents = std::fs::read_to_string(path.as_ref())
      .map_err(|e| anyhow::anyhow!("reading {:?}: {e}", path.as_ref()))?;
    ComposeFile::parse(&contents)
  }

  /// Ensures a top-level network with this name exists (as an
  /// `external: true` reference, since the network itself is created
  /// by whichever project first declares it non-externally, or by the
  /// operator). No-op if already present.
  pub fn ensure_top_level_network(&mut self, name: &str) {
    if !self.top_level_networks.contains_key(name) {
      let mut m = Mapping::new();
      m.insert(Value::String("external".into()), Value::Bool(true));
      self
        .top_level_networks
        .insert(name.to_string(), Value::Mapping(m));
      if !self.top_order.contains(&"networks".to_string()) {
        self.top_order.push("networks".to_string());
      }
    }
  }

  pub fn to_yaml_string(&self) -> anyhow::Result<String> {
    let mut top = Mapping::new();

    let mut order = self.top_order.clone();
    if !self.services.is_empty() && !order.contains(&"services".to_string())
    {
      order.insert(0, "services".to_string());
    }
    if !self.top_level_networks.is_empty()
      && !order.contains(&"networks".to_string())
    {
      order.push("networks".to_string());
    }

    for key in order {
      match key.as_str() {
        "services" => {
          let mut services = Mapping::new();
          for (name, svc) in &self.services {
            services.insert(
              Value::String(name.clone()),
              service_to_value(svc),
            );
          }
          top.insert(Value::String("services".into()), Value::Mapping(services));
        }
        "networks" => {
          let mut networks = Mapping::new();
          for (name, value) in &self.top_level_networks {
            networks.insert(Value::String(name.clone()), value.clone());
          }
          top.insert(Value::String("networks".into()), Value::Mapping(networks));
        }
        other => {
          if let Some(value) = self.extra.get(Value::String(other.into())) {
            top.insert(Value::String(other.into()), value.clone());
          }
        }
      }
    }

    Ok(serde_yaml_ng::to_string(&Value::Mapping(top))?)
  }

  pub fn write(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
    let rendered = self.to_yaml_string()?;
    crate::atomic::write_atomic(path.as_ref(), rendered.as_bytes())
  }
}

fn parse_services(
  services: Mapping,
) -> anyhow::Result<IndexMap<String, Service>> {
  let mut out = IndexMap::new();
  for (name, value) in services {
    let Some(name) = name.as_str() else { continue };
    let Value::Mapping(fields) = value else {
      anyhow::bail!("service `{name}` is not a mapping");
    };
    out.insert(name.to_string(), parse_service(fields)?);
  }
  Ok(out)
}

fn parse_service(mut fields: Mapping) -> anyhow::Result<Service> {
  let image = fields
    .shift_remove("image")
    .and_then(|v| v.as_str().map(str::to_string));

  let restart = fields
    .shift_remove("restart")
    .and_then(|v| v.as_str().and_then(crate::model::RestartPolicy::parse));

  let ports = match fields.shift_remove("ports") {
    Some(Value::Sequence(seq)) => {
      seq.into_iter().filter_map(|v| ports::parse_port_value(&v)).collect()
    }
    _ => Vec::new(),
  };

  let volumes = match fields.shift_remove("volumes") {
    Some(Value::Sequence(seq)) => seq,
    _ => Vec::new(),
  };

  let environment = match fields.shift_remove("environment") {
    Some(v) => env::parse_environment(&v),
    None => Vec::new(),
  };

  let (networks, networks_was_list) = match fields.shift_remove("networks") {
    Some(Value::Sequence(seq)) => (networks::parse_network_list(&seq), true),
    Some(Value::Mapping(m)) => (networks::parse_network_map(&m)?, false),
    _ => (IndexMap::new(), false),
  };

  Ok(Service {
    image,
    restart,
    ports,
    volumes,
    environment,
    networks_was_list,
    networks,
    extra: fields,
  })
}

fn service_to_value(svc: &Service) -> Value {
  let mut m = Mapping::new();

  if let Some(image) = &svc.image {
    m.insert(Value::String("image".into()), Value::String(image.clone()));
  }
  if let Some(restart) = &svc.restart {
    m.insert(
      Value::String("restart".into()),
      Value::String(restart.as_compose_str().into()),
    );
  }
  if !svc.ports.is_empty() {
    let seq = svc
      .ports
      .iter()
      .map(|p| Value::String(p.to_compose_string()))
      .collect();
    m.insert(Value::String("ports".into()), Value::Sequence(seq));
  }
  if !svc.volumes.is_empty() {
    m.insert(
      Value::String("volumes".into()),
      Value::Sequence(svc.volumes.clone()),
    );
  }
  if !svc.environment.is_empty() {
    let seq = svc
      .environment
      .iter()
      .map(|e| Value::String(e.to_compose_string()))
      .collect();
    m.insert(Value::String("environment".into()), Value::Sequence(seq));
  }
  if !svc.networks.is_empty() {
    let value = networks::networks_to_value(&svc.networks, svc.networks_was_list);
    m.insert(Value::String("networks".into()), value);
  }

  for (k, v) in &svc.extra {
    m.insert(k.clone(), v.clone());
  }

  Value::Mapping(m)
}

#[cfg(test)]
mod tests {
  use super::*;

  const SAMPLE: &str = r#"
version: "3.8"
services:
  web:
    image: nginx:1.25
    restart: unless-stopped
    ports:
      - "8080:80"
    environment:
      - FOO=bar
    networks:
      backend:
        ipv4_address: 172.20.0.5
    labels:
      app: web
networks:
  backend:
    external: true
"#;

  #[test]
  fn round_trips_a_simple_manifest() {
    let parsed = ComposeFile::parse(SAMPLE).unwrap();
    let web = parsed.services.get("web").unwrap();
    assert_eq!(web.image.as_deref(), Some("nginx:1.25"));
    assert_eq!(web.ports.len(), 1);
    assert_eq!(web.ports[0].host_port, Some(8080));
    assert!(web.extra.contains_key(Value::String("labels".into())));

    let rendered = parsed.to_yaml_string().unwrap();
    let reparsed = ComposeFile::parse(&rendered).unwrap();
    assert_eq!(
      reparsed.services.get("web").unwrap().image,
      parsed.services.get("web").unwrap().image
    );
    assert!(!rendered.contains("version"));
  }

  #[test]
  fn drops_version_key() {
    let parsed = ComposeFile::parse(SAMPLE).unwrap();
    assert!(!parsed.extra.contains_key(Value::String("version".into())));
  }
}
