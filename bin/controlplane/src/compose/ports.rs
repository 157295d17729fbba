//! Parsing for the `ports:` list. Accepts the compose short syntax
//! (`"C"`, `"H:C"`, `"B:H:C"`, with or without a trailing `/tcp` or
//! `/udp`) and the long mapping syntax (`target`/`published`/`host_ip`).
//! Entries that can't be reduced to a valid triple are dropped — a
//! malformed port in one service must never block reconciling the rest.

use serde_yaml_ng::Value;

use crate::model::PortMapping;

pub fn parse_port_value(value: &Value) -> Option<PortMapping> {
  match value {
    Value::String(s) => parse_port_str(s),
    Value::Number(n) => {
      n.as_u64().and_then(|p| u16::try_from(p).ok()).map(|p| PortMapping {
        container_port: p,
        host_port: None,
        bind_address: None,
      })
    }
    Value::Mapping(m) => parse_port_long_form(m),
    _ => None,
  }
}

fn strip_protocol(s: &str) -> &str {
  s.split('/').next().unwrap_or(s)
}

fn parse_port_str(s: &str) -> Option<PortMapping> {
  let s = strip_protocol(s.trim());
  let parts: Vec<&str> = s.split(':').collect();
  match parts.as_slice() {
    [container] => Some(PortMapping {
      container_port: container.parse().ok()?,
      host_port: None,
      bind_address: None,
    }),
    [host, container] => Some(PortMapping {
      container_port: container.parse().ok()?,
      host_port: Some(host.parse().ok()?),
      bind_address: None,
    }),
    [bind, host, container] => Some(PortMapping {
      container_port: container.parse().ok()?,
      host_port: Some(host.parse().ok()?),
      bind_address: Some(bind.parse().ok()?),
    }),
    _ => None,
  }
}

fn parse_port_long_form(
  m: &serde_yaml_ng::Mapping,
) -> Option<PortMapping> {
  let target = m.get(Value::String("target".into()))?;
  let container_port = match target {
    Value::Number(n) => n.as_u64()? as u16,
    Value::String(s) => strip_protocol(s).parse().ok()?,
    _ => return None,
  };
  let host_port = match m.get(Value::String("published".into())) {
    Some(Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
    Some(Value::String(s)) => s.parse().ok(),
    _ => None,
  };
  let bind_address = match m.get(Value::String("host_ip".into())) {
    Some(Value::String(s)) if !s.is_empty() => s.parse().ok(),
    _ => None,
  };
  Some(PortMapping { container_port, host_port, bind_address })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_short_forms() {
    assert_eq!(
      parse_port_str("80").unwrap(),
      PortMapping { container_port: 80, host_port: None, bind_address: None }
    );
    assert_eq!(
      parse_port_str("8080:80").unwrap().host_port,
      Some(8080)
    );
    assert_eq!(
      parse_port_str("127.0.0.1:8080:80/tcp")
        .unwrap()
        .bind_address,
      Some("127.0.0.1".parse().unwrap())
    );
  }

  #[test]
  fn drops_unparseable_entries() {
    assert!(parse_port_str("not-a-port").is_none());
    assert!(parse_port_str("a:b:c:d").is_none());
  }

  #[test]
  fn parses_long_form() {
    let yaml = "target: 80\npublished: \"8080\"\nhost_ip: 127.0.0.1\n";
    let v: Value = serde_yaml_ng::from_str(yaml).unwrap();
    let p = parse_port_value(&v).unwrap();
    assert_eq!(p.container_port, 80);
    assert_eq!(p.host_port, Some(8080));
  }
}
