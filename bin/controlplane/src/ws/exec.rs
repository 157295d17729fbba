//! `action=exec`: resolve the target container and attach an
//! interactive shell inside it via a PTY.

use std::path::Path;

use axum::extract::ws::WebSocket;
use portable_pty::CommandBuilder;

use crate::{config, lifecycle, model::Project};

use super::{pty, pump_socket_to_pty, SessionGuard};

pub async fn run(socket: WebSocket, project_dir: &Path, service: &str) -> anyhow::Result<()> {
  let config = config::config();
  let project = Project::at(project_dir.to_path_buf());
  let container_id = lifecycle::container_id(&project, service, config).await?;

  let mut cmd = CommandBuilder::new(&config.container_cli);
  cmd.arg("exec");
  cmd.arg("-it");
  cmd.arg(&container_id);
  cmd.arg("sh");
  cmd.arg("-c");
  cmd.arg("exec bash 2>/dev/null || exec sh");

  let spawned = pty::spawn(cmd, None)?;
  let _guard = SessionGuard::register(spawned.cancel.clone(), spawned.resize_tx.clone()).await;

  pump_socket_to_pty(socket, spawned).await
}
