//! `action=inspect`: tail the target container's logs. Starts with
//! 500 lines of history, then follows; a follower process that exits
//! (eg the container restarted under it) is respawned after a short
//! delay asking only for lines since the last one seen. A session with
//! no output and no client input for a while warns once, then closes
//! unless the client sends anything within a short grace window.

use std::{path::Path, time::Duration};

use axum::extract::ws::{Message, WebSocket};
use futures_util::SinkExt;
use portable_pty::CommandBuilder;

use crate::{config, lifecycle, model::Project};

use super::{pty, SessionGuard};

const RESPAWN_DELAY: Duration = Duration::from_secs(3);
const IDLE_THRESHOLD: Duration = Duration::from_secs(60);
const IDLE_COUNTDOWN: Duration = Duration::from_secs(5);

pub async fn run(socket: WebSocket, project_dir: &Path, service: &str) -> anyhow::Result<()> {
  let config = config::config();
  let project = Project::at(project_dir.to_path_buf());
  let container_id = lifecycle::container_id(&project, service, config).await?;

  let mut socket = socket;
  let mut since: Option<i64> = None;

  loop {
    let mut cmd = CommandBuilder::new(&config.container_cli);
    cmd.arg("logs");
    match since {
      None => {
        cmd.arg("--tail");
        cmd.arg("500");
      }
      Some(ts) => {
        cmd.arg("--tail");
        cmd.arg("0");
        cmd.arg("--since");
        cmd.arg(ts.to_string());
      }
    }
    cmd.arg("-f");
    cmd.arg(&container_id);

    let spawned = pty::spawn(cmd, None)?;
    let _guard = SessionGuard::register(spawned.cancel.clone(), spawned.resize_tx.clone()).await;

    since = Some(chrono::Utc::now().timestamp());
    match pump_with_idle(&mut socket, spawned).await? {
      PumpOutcome::ChildExited => {
        tokio::time::sleep(RESPAWN_DELAY).await;
        continue;
      }
      PumpOutcome::SocketClosed | PumpOutcome::IdleTimeout => return Ok(()),
    }
  }
}

enum PumpOutcome {
  SocketClosed,
  ChildExited,
  IdleTimeout,
}

async fn pump_with_idle(socket: &mut WebSocket, mut spawned: pty::SpawnedPty) -> anyhow::Result<PumpOutcome> {
  let cancel = spawned.cancel.clone();
  let mut idle_deadline = tokio::time::Instant::now() + IDLE_THRESHOLD;
  let mut counting_down = false;

  loop {
    tokio::select! {
      _ = cancel.cancelled() => return Ok(PumpOutcome::ChildExited),
      _ = tokio::time::sleep_until(idle_deadline) => {
        if counting_down {
          let _ = socket.send(Message::Text("idle timeout, closing session".into())).await;
          spawned.cancel.cancel();
          return Ok(PumpOutcome::IdleTimeout);
        }
        counting_down = true;
        idle_deadline = tokio::time::Instant::now() + IDLE_COUNTDOWN;
        let _ = socket.send(Message::Text("idle: closing in 5s, send anything to keep watching".into())).await;
      }
      incoming = socket.recv() => {
        match incoming {
          Some(Ok(Message::Close(_))) | None => {
            spawned.cancel.cancel();
            return Ok(PumpOutcome::SocketClosed);
          }
          Some(Ok(Message::Text(_))) | Some(Ok(Message::Binary(_))) => {
            counting_down = false;
            idle_deadline = tokio::time::Instant::now() + IDLE_THRESHOLD;
          }
          Some(Ok(_)) => {}
          Some(Err(_)) => {
            spawned.cancel.cancel();
            return Ok(PumpOutcome::SocketClosed);
          }
        }
      }
      outgoing = spawned.stdout_rx.recv() => {
        match outgoing {
          Some(bytes) => {
            counting_down = false;
            idle_deadline = tokio::time::Instant::now() + IDLE_THRESHOLD;
            if socket.send(Message::Binary(bytes.into())).await.is_err() {
              spawned.cancel.cancel();
              return Ok(PumpOutcome::SocketClosed);
            }
          }
          None => return Ok(PumpOutcome::ChildExited),
        }
      }
    }
  }
}
