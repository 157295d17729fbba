//! Parsing and rendering for the service-level `networks:` block,
//! which compose allows as either a bare list of names or a mapping
//! from name to per-attachment config.

use indexmap::IndexMap;
use serde_yaml_ng::{Mapping, Value};

use crate::model::NetworkAttachment;

pub fn parse_network_list(
  seq: &[Value],
) -> IndexMap<String, NetworkAttachment> {
  seq
    .iter()
    .filter_map(|v| v.as_str())
    .map(|name| (name.to_string(), NetworkAttachment::default()))
    .collect()
}

pub fn parse_network_map(
  map: &Mapping,
) -> anyhow::Result<IndexMap<String, NetworkAttachment>> {
  let mut out = IndexMap::new();
  for (name, value) in map {
    let Some(name) = name.as_str() else { continue };
    let attachment = match value {
      Value::Null => NetworkAttachment::default(),
      Value::Mapping(fields) => parse_attachment_mapping(fields),
      Value::String(s) => match s.parse() {
        Ok(ipv4) => NetworkAttachment { ipv4: Some(ipv4), extra: Mapping::new() },
        Err(_) => NetworkAttachment::default(),
      },
      _ => NetworkAttachment::default(),
    };
    out.insert(name.to_string(), attachment);
  }
  Ok(out)
}

fn parse_attachment_mapping(fields: &Mapping) -> NetworkAttachment {
  let mut fields = fields.clone();
  let ipv4 = fields
    .shift_remove(Value::String("ipv4_address".into()))
    .and_then(|v| v.as_str().and_then(|s| s.parse().ok()));
  NetworkAttachment { ipv4, extra: fields }
}

pub fn networks_to_value(
  networks: &IndexMap<String, NetworkAttachment>,
  prefer_list: bool,
) -> Value {
  let all_bare = networks.values().all(|a| a.ipv4.is_none() && a.extra.is_empty());

  if prefer_list && all_bare {
    let seq = networks.keys().map(|n| Value::String(n.clone())).collect();
    return Value::Sequence(seq);
  }

  let mut map = Mapping::new();
  for (name, attachment) in networks {
    if attachment.ipv4.is_none() && attachment.extra.is_empty() {
      map.insert(Value::String(name.clone()), Value::Null);
      continue;
    }
    let mut fields = attachment.extra.clone();
    if let Some(ipv4) = attachment.ipv4 {
      fields.insert(
        Value::String("ipv4_address".into()),
        Value::String(ipv4.to_string()),
      );
    }
    map.insert(Value::String(name.clone()), Value::Mapping(fields));
  }
  Value::Mapping(map)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trips_bare_list() {
    let seq = vec![Value::String("frontend".into())];
    let parsed = parse_network_list(&seq);
    let rendered = networks_to_value(&parsed, true);
    assert_eq!(rendered, Value::Sequence(seq));
  }

  #[test]
  fn canonicalizes_bare_string_ipv4() {
    let yaml = "backend: 172.28.0.5\n";
    let Value::Mapping(m) = serde_yaml_ng::from_str(yaml).unwrap() else {
      unreachable!()
    };
    let parsed = parse_network_map(&m).unwrap();
    let backend = parsed.get("backend").unwrap();
    assert_eq!(backend.ipv4, Some("172.28.0.5".parse().unwrap()));

    let rendered = networks_to_value(&parsed, false);
    let Value::Mapping(rendered) = rendered else { unreachable!() };
    let Value::Mapping(backend_rendered) =
      rendered.get(Value::String("backend".into())).unwrap()
    else {
      unreachable!()
    };
    assert_eq!(
      backend_rendered.get(Value::String("ipv4_address".into())),
      Some(&Value::String("172.28.0.5".into()))
    );
  }

  #[test]
  fn preserves_ipv4_and_extra_keys() {
    let yaml = "backend:\n  ipv4_address: 172.20.0.5\n  aliases:\n    - db\n";
    let Value::Mapping(m) = serde_yaml_ng::from_str(yaml).unwrap() else {
      unreachable!()
    };
    let parsed = parse_network_map(&m).unwrap();
    let backend = parsed.get("backend").unwrap();
    assert_eq!(backend.ipv4, Some("172.20.0.5".parse().unwrap()));
    assert!(backend.extra.contains_key(Value::String("aliases".into())));
  }
}
