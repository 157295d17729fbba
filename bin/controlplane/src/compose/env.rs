//! Parsing for the `environment:` block, accepted as either a list of
//! `KEY=VALUE`/bare-`KEY` strings or a `KEY: VALUE` mapping. Always
//! re-rendered as the list form, matching the canonical shapes the
//! Reconciler writes for ports and networks.

use serde_yaml_ng::Value;

use crate::model::EnvEntry;

pub fn parse_environment(value: &Value) -> Vec<EnvEntry> {
  match value {
    Value::Sequence(seq) => {
      seq.iter().filter_map(|v| v.as_str()).map(parse_entry_str).collect()
    }
    Value::Mapping(m) => m
      .iter()
      .filter_map(|(k, v)| {
        let key = k.as_str()?.to_string();
        let value = match v {
          Value::Null => None,
          Value::String(s) => Some(s.clone()),
          other => Some(value_to_scalar_string(other)),
        };
        Some(EnvEntry { key, value })
      })
      .collect(),
    _ => Vec::new(),
  }
}

fn parse_entry_str(s: &str) -> EnvEntry {
  match s.split_once('=') {
    Some((key, value)) => {
      EnvEntry { key: key.to_string(), value: Some(value.to_string()) }
    }
    None => EnvEntry { key: s.to_string(), value: None },
  }
}

fn value_to_scalar_string(value: &Value) -> String {
  match value {
    Value::Bool(b) => b.to_string(),
    Value::Number(n) => n.to_string(),
    other => serde_yaml_ng::to_string(other).unwrap_or_default().trim().to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_list_form() {
    let v: Value = serde_yaml_ng::from_str("- FOO=bar\n- BARE\n").unwrap();
    let entries = parse_environment(&v);
    assert_eq!(entries[0], EnvEntry { key: "FOO".into(), value: Some("bar".into()) });
    assert_eq!(entries[1], EnvEntry { key: "BARE".into(), value: None });
  }

  #[test]
  fn parses_map_form() {
    let v: Value = serde_yaml_ng::from_str("FOO: bar\nBARE: null\n").unwrap();
    let entries = parse_environment(&v);
    assert!(entries.contains(&EnvEntry { key: "FOO".into(), value: Some("bar".into()) }));
    assert!(entries.contains(&EnvEntry { key: "BARE".into(), value: None }));
  }
}
