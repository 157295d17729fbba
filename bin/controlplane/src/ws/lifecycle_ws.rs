//! `action=stop`/`action=restart`: same script-or-compose command
//! `lifecycle::restart`/`lifecycle::stop` runs fire-and-forget, but
//! spawned in a PTY so the caller sees live output, under the same
//! transient-state protocol.

use std::path::Path;

use axum::extract::ws::WebSocket;
use portable_pty::CommandBuilder;

use crate::{config, lifecycle, lifecycle::ScriptKind, model::Project};

use super::{pty, pump_socket_to_pty, SessionGuard};

#[derive(Debug, Clone, Copy)]
pub enum Op {
  Stop,
  Restart,
}

impl Op {
  fn kind(&self) -> ScriptKind {
    match self {
      Op::Stop => ScriptKind::Stop,
      Op::Restart => ScriptKind::Restart,
    }
  }
}

pub async fn run(socket: WebSocket, project_dir: &Path, service: &str, op: Op) -> anyhow::Result<()> {
  let config = config::config();
  let project = Project::at(project_dir.to_path_buf());
  let kind = op.kind();

  let argv = lifecycle::resolve_argv(&project, service, &kind, config)?;
  lifecycle::begin_transient(&project, service, &kind).await;

  let mut cmd = CommandBuilder::new(&argv[0]);
  for arg in &argv[1..] {
    cmd.arg(arg);
  }

  let spawned = pty::spawn(cmd, Some(project.path.clone()))?;
  let _guard = SessionGuard::register(spawned.cancel.clone(), spawned.resize_tx.clone()).await;

  pump_socket_to_pty(socket, spawned).await
}
