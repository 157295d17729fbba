//! Parses reverse-proxy access logs into per-project, time-bucketed
//! request counts for the stats dashboard.

use std::{
  collections::HashMap,
  net::Ipv4Addr,
  path::Path,
};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::Mapper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Range {
  OneHour,
  SixHours,
  OneDay,
  ThreeDays,
  OneWeek,
  OneMonth,
}

impl Range {
  pub fn parse(s: &str) -> Option<Range> {
    match s {
      "1h" => Some(Range::OneHour),
      "6h" => Some(Range::SixHours),
      "1day" => Some(Range::OneDay),
      "3day" => Some(Range::ThreeDays),
      "1week" => Some(Range::OneWeek),
      "1month" => Some(Range::OneMonth),
      _ => None,
    }
  }

  fn span(&self) -> chrono::Duration {
    match self {
      Range::OneHour => chrono::Duration::hours(1),
      Range::SixHours => chrono::Duration::hours(6),
      Range::OneDay => chrono::Duration::days(1),
      Range::ThreeDays => chrono::Duration::days(3),
      Range::OneWeek => chrono::Duration::weeks(1),
      Range::OneMonth => chrono::Duration::days(30),
    }
  }

  fn bucket(&self) -> chrono::Duration {
    match self {
      Range::OneHour => chrono::Duration::minutes(5),
      Range::SixHours => chrono::Duration::minutes(30),
      Range::OneDay => chrono::Duration::hours(2),
      Range::ThreeDays => chrono::Duration::hours(6),
      Range::OneWeek => chrono::Duration::days(1),
      Range::OneMonth => chrono::Duration::weeks(1),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
  pub services: HashMap<String, Vec<u64>>,
  pub labels: Vec<String>,
}

struct LogLine {
  timestamp: DateTime<Utc>,
  upstream_ip: Option<Ipv4Addr>,
}

fn parse_line(line: &str) -> Option<LogLine> {
  // Expected combined-log-ish format with an appended upstream field:
  // `127.0.0.1 - - [10/Mar/2026:10:00:00 +0000] "GET / HTTP/1.1" 200 512 "-" "-" 172.28.0.5:80`
  let ts_start = line.find('[')? + 1;
  let ts_end = line[ts_start..].find(']')? + ts_start;
  let ts_str = &line[ts_start..ts_end];
  let timestamp = DateTime::parse_from_str(ts_str, "%d/%b/%Y:%H:%M:%S %z")
    .ok()?
    .with_timezone(&Utc);

  let upstream_ip = line
    .rsplit(' ')
    .find_map(|token| token.split(':').next().and_then(|ip| ip.parse().ok()));

  Some(LogLine { timestamp, upstream_ip })
}

/// Maps an upstream IPv4 to the project whose mapper entry references
/// a network attachment with that address.
fn project_name_for_ip(mapper: &Mapper, ip: Ipv4Addr) -> Option<String> {
  for (path, project) in &mapper.projects {
    for svc in project.services.values() {
      if svc.networks.values().any(|a| *a == Some(ip)) {
        return path.file_name().and_then(|n| n.to_str()).map(str::to_string);
      }
    }
  }
  None
}

pub fn compute_stats(
  log_paths: &[impl AsRef<Path>],
  mapper: &Mapper,
  range: Range,
  now: DateTime<Utc>,
) -> anyhow::Result<StatsResponse> {
  let since = now - range.span();
  let bucket = range.bucket();
  let bucket_count = ((range.span().num_seconds() as f64) / (bucket.num_seconds() as f64)).ceil() as usize;

  let mut services: HashMap<String, Vec<u64>> = HashMap::new();

  for path in log_paths {
    let Ok(contents) = std::fs::read_to_string(path.as_ref()) else { continue };
    for line in contents.lines() {
      let Some(parsed) = parse_line(line) else { continue };
      if parsed.timestamp < since || parsed.timestamp > now {
        continue;
      }
      let Some(ip) = parsed.upstream_ip else { continue };
      let Some(project_name) = project_name_for_ip(mapper, ip) else { continue };

      let offset = (parsed.timestamp - since).num_seconds();
      let index = (offset / bucket.num_seconds()).clamp(0, bucket_count as i64 - 1) as usize;

      let counts = services.entry(project_name).or_insert_with(|| vec![0u64; bucket_count]);
      counts[index] += 1;
    }
  }

  let labels = (0..bucket_count)
    .map(|i| {
      let t = since + bucket * i as i32;
      t.format("%Y-%m-%d %H:%M").to_string()
    })
    .collect();

  Ok(StatsResponse { services, labels })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{MapperProject, MapperService, ServiceStatus};
  use indexmap::IndexMap;
  use std::path::PathBuf;

  fn sample_mapper() -> Mapper {
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
    mapper.projects.insert(
      PathBuf::from("/opt/compose-projects/demo"),
      MapperProject { manifest_file: PathBuf::from("docker-compose.yml"), services },
    );
    mapper
  }

  #[test]
  fn parses_a_combined_log_line_with_upstream_suffix() {
    let line = r#"1.2.3.4 - - [10/Mar/2026:10:00:00 +0000] "GET / HTTP/1.1" 200 512 "-" "-" 172.28.0.5:80"#;
    let parsed = parse_line(line).unwrap();
    assert_eq!(parsed.upstream_ip, Some(Ipv4Addr::new(172, 28, 0, 5)));
  }

  #[test]
  fn attributes_ip_to_project_via_mapper() {
    let mapper = sample_mapper();
    assert_eq!(
      project_name_for_ip(&mapper, Ipv4Addr::new(172, 28, 0, 5)),
      Some("demo".to_string())
    );
    assert_eq!(project_name_for_ip(&mapper, Ipv4Addr::new(172, 28, 0, 9)), None);
  }

  #[test]
  fn range_parses_known_values_only() {
    assert_eq!(Range::parse("1h"), Some(Range::OneHour));
    assert_eq!(Range::parse("bogus"), None);
  }
}
