//! Drives service start/stop/restart by invoking the container CLI
//! (or a project-local helper script when present), and tracks the
//! transient-state protocol while an operation is in flight.

use std::{
  collections::HashSet,
  path::Path,
  sync::OnceLock,
  time::Duration,
};

use command::{AllowedBinaries, CommandOutput};

use crate::{
  config::Config,
  error::{AppError, AppResult},
  model::{service_key, Project, TransientState},
  state,
};

const LIFECYCLE_TIMEOUT: Duration = Duration::from_secs(20);
const STATUS_TIMEOUT: Duration = Duration::from_secs(10);
const DWELL: Duration = Duration::from_secs(2);
const MAX_DWELL_POLLS: u32 = 5;

fn allowed(config: &Config) -> &'static AllowedBinaries {
  static ALLOWED: OnceLock<AllowedBinaries> = OnceLock::new();
  ALLOWED.get_or_init(|| {
    AllowedBinaries::new([
      config.container_cli.clone(),
      config.proxy_binary.clone(),
      config.service_manager.clone(),
    ])
  })
}

fn check_allowed(program: &str, config: &Config) -> anyhow::Result<()> {
  allowed(config).check(program)
}

/// Returns the set of service names compose reports as running for
/// this project, scoped by its process-name override.
pub async fn running_services(project_dir: &Path) -> anyhow::Result<HashSet<String>> {
  let config = crate::config::config();
  let manifest = crate::discovery::manifest_path(project_dir);
  let process_name = crate::model::process_name_from_folder(
    project_dir.file_name().and_then(|n| n.to_str()).unwrap_or_default(),
  );

  check_allowed(&config.container_cli, config)?;

  let compose_args = config.compose_args.join(" ");
  let cmd = format!(
    "{} {} -f {} -p {} ps --services --filter status=running",
    config.container_cli,
    compose_args,
    manifest.display(),
    process_name,
  );

  let out = command::run_standard_command(&cmd, None, STATUS_TIMEOUT).await;
  if !out.success() {
    anyhow::bail!("ps failed: {}", out.stderr);
  }
  Ok(out.stdout.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
}

pub enum ScriptKind {
  Restart,
  Stop,
}

impl ScriptKind {
  fn filename(&self) -> &'static str {
    match self {
      ScriptKind::Restart => "restart.sh",
      ScriptKind::Stop => "stop.sh",
    }
  }

  fn compose_subcommand(&self) -> &'static str {
    match self {
      ScriptKind::Restart => "restart",
      ScriptKind::Stop => "stop",
    }
  }

  fn terminal_state(&self) -> TransientState {
    match self {
      ScriptKind::Restart => TransientState::Restarting,
      ScriptKind::Stop => TransientState::Stopping,
    }
  }
}

async fn run_lifecycle_op(
  project: &Project,
  service: &str,
  kind: ScriptKind,
  config: &Config,
) -> AppResult<CommandOutput> {
  let key = service_key(&project.path, service);
  state::state().transient.insert(key.clone(), kind.terminal_state()).await;

  let result = run_script_or_compose(project, service, &kind, config).await;

  spawn_dwell_clear(project.path.clone(), service.to_string(), kind.terminal_state());

  result
}

/// Resolves the argv for a lifecycle op, for callers (the PTY
/// multiplexer) that want to run it interactively instead of via
/// `command::run_standard_command`. Mirrors `run_script_or_compose`'s
/// script-vs-compose preference.
pub fn resolve_argv(project: &Project, service: &str, kind: &ScriptKind, config: &Config) -> AppResult<Vec<String>> {
  let script = project.path.join(kind.filename());
  let is_executable = script
    .metadata()
    .map(|m| {
      #[cfg(unix)]
      {
        use std::os::unix::fs::PermissionsExt;
        m.permissions().mode() & 0o111 != 0
      }
      #[cfg(not(unix))]
      {
        let _ = m;
        true
      }
    })
    .unwrap_or(false);

  if is_executable {
    Ok(vec![script.display().to_string(), service.to_string()])
  } else {
    check_allowed(&config.container_cli, config).map_err(AppError::Internal)?;
    let mut argv = vec![config.container_cli.clone()];
    argv.extend(config.compose_args.iter().cloned());
    argv.push("-f".to_string());
    argv.push(project.manifest_path.display().to_string());
    argv.push("-p".to_string());
    argv.push(project.process_name());
    argv.push(kind.compose_subcommand().to_string());
    argv.push(service.to_string());
    Ok(argv)
  }
}

/// Sets the transient-state entry for `(project, service)` before an
/// interactively-driven op starts, and schedules its bounded clear —
/// the PTY-session equivalent of what [`run_lifecycle_op`] does around
/// its own `command::run_standard_command` call.
pub async fn begin_transient(project: &Project, service: &str, kind: &ScriptKind) {
  let key = service_key(&project.path, service);
  state::state().transient.insert(key, kind.terminal_state()).await;
  spawn_dwell_clear(project.path.clone(), service.to_string(), kind.terminal_state());
}

async fn run_script_or_compose(
  project: &Project,
  service: &str,
  kind: &ScriptKind,
  config: &Config,
) -> AppResult<CommandOutput> {
  let script = project.path.join(kind.filename());
  let is_executable = script
    .metadata()
    .map(|m| {
      #[cfg(unix)]
      {
        use std::os::unix::fs::PermissionsExt;
        m.permissions().mode() & 0o111 != 0
      }
      #[cfg(not(unix))]
      {
        let _ = m;
        true
      }
    })
    .unwrap_or(false);

  let out = if is_executable {
    let cmd = format!("{} {}", script.display(), service);
    command::run_standard_command(&cmd, Some(project.path.as_path()), LIFECYCLE_TIMEOUT).await
  } else {
    check_allowed(&config.container_cli, config).map_err(AppError::Internal)?;
    let process_name = project.process_name();
    let manifest = &project.manifest_path;
    let compose_args = config.compose_args.join(" ");
    let cmd = format!(
      "{} {} -f {} -p {} {} {}",
      config.container_cli,
      compose_args,
      manifest.display(),
      process_name,
      kind.compose_subcommand(),
      service,
    );
    command::run_standard_command(&cmd, None, LIFECYCLE_TIMEOUT).await
  };

  if !out.success() && out.stderr.contains("is already in use by container") {
    if let Some(id) = extract_conflicting_container_id(&out.stderr) {
      let _ = remove_container(&id, config).await;
      return Ok(retry_compose(project, service, kind, config).await);
    }
  }

  Ok(out)
}

fn extract_conflicting_container_id(stderr: &str) -> Option<String> {
  // Docker's message looks like: `... by container "<id>". You have to...`
  let start = stderr.find("by container \"")? + "by container \"".len();
  let rest = &stderr[start..];
  let end = rest.find('"')?;
  Some(rest[..end].to_string())
}

async fn remove_container(id: &str, config: &Config) -> anyhow::Result<()> {
  check_allowed(&config.container_cli, config)?;
  let cmd = format!("{} rm -f {}", config.container_cli, id);
  let out = command::run_standard_command(&cmd, None, LIFECYCLE_TIMEOUT).await;
  if !out.success() {
    anyhow::bail!("failed to remove conflicting container {id}: {}", out.stderr);
  }
  Ok(())
}

async fn retry_compose(
  project: &Project,
  service: &str,
  kind: &ScriptKind,
  config: &Config,
) -> CommandOutput {
  let process_name = project.process_name();
  let compose_args = config.compose_args.join(" ");
  let cmd = format!(
    "{} {} -f {} -p {} {} {}",
    config.container_cli,
    compose_args,
    project.manifest_path.display(),
    process_name,
    kind.compose_subcommand(),
    service,
  );
  command::run_standard_command(&cmd, None, LIFECYCLE_TIMEOUT).await
}

fn spawn_dwell_clear(project_path: std::path::PathBuf, service: String, state_kind: TransientState) {
  tokio::spawn(async move {
    let key = service_key(&project_path, &service);
    for _ in 0..MAX_DWELL_POLLS {
      tokio::time::sleep(DWELL).await;
      let running = running_services(&project_path).await.unwrap_or_default();
      let reached_terminal = match state_kind.terminal_status() {
        crate::model::ServiceStatus::Running => running.contains(&service),
        crate::model::ServiceStatus::Stopped => !running.contains(&service),
        _ => true,
      };
      if reached_terminal {
        state::state().transient.remove(&key).await;
        return;
      }
    }
    // Bounded wait exceeded; clear anyway so the UI doesn't stick forever.
    state::state().transient.remove(&key).await;
  });
}

pub async fn restart(project: &Project, service: &str, config: &Config) -> AppResult<CommandOutput> {
  run_lifecycle_op(project, service, ScriptKind::Restart, config).await
}

pub async fn stop(project: &Project, service: &str, config: &Config) -> AppResult<CommandOutput> {
  run_lifecycle_op(project, service, ScriptKind::Stop, config).await
}

pub async fn container_id(project: &Project, service: &str, config: &Config) -> AppResult<String> {
  check_allowed(&config.container_cli, config).map_err(AppError::Internal)?;
  let process_name = project.process_name();
  let compose_args = config.compose_args.join(" ");
  let cmd = format!(
    "{} {} -f {} -p {} ps -q {}",
    config.container_cli,
    compose_args,
    project.manifest_path.display(),
    process_name,
    service,
  );
  let out = command::run_standard_command(&cmd, None, STATUS_TIMEOUT).await;
  let id = out.stdout.trim().to_string();
  if id.is_empty() {
    return Err(AppError::NotFound(format!("no running container for {service}")));
  }
  Ok(id)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extracts_container_id_from_conflict_message() {
    let stderr = r#"docker: Error response from daemon: Conflict. The container name "/web" is already in use by container "abc123def456". You have to remove (or rename) that container."#;
    assert_eq!(extract_conflicting_container_id(stderr).as_deref(), Some("abc123def456"));
  }

  #[test]
  fn returns_none_when_message_does_not_match() {
    assert_eq!(extract_conflicting_container_id("some other error"), None);
  }
}
