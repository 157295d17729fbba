//! The WebSocket PTY/log multiplexer. One path, `/ws/attach`, accepts
//! an `action` query parameter and dispatches to exec, inspect, log,
//! or a lifecycle op run with live output.

pub mod exec;
pub mod inspect;
pub mod lifecycle_ws;
pub mod log;
pub mod pty;

use std::net::IpAddr;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    Query, State, WebSocketUpgrade,
  },
  http::HeaderMap,
  response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{auth, state};

#[derive(Debug, Deserialize)]
pub struct AttachQuery {
  pub file: String,
  pub service: String,
  #[serde(default = "default_action")]
  pub action: String,
  pub ip: Option<IpAddr>,
  pub token: Option<String>,
}

fn default_action() -> String {
  "exec".to_string()
}

pub async fn attach(
  Query(query): Query<AttachQuery>,
  State(_): State<()>,
  headers: HeaderMap,
  ws: WebSocketUpgrade,
) -> impl IntoResponse {
  let config = crate::config::config();
  if !config.login_password.is_empty() {
    let ip = state::client_ip(&headers);
    let token = query.token.clone().unwrap_or_default();
    if auth::check_token(&token, ip).await.is_err() {
      return axum::http::StatusCode::UNAUTHORIZED.into_response();
    }
  }

  ws.on_upgrade(move |socket| async move {
    if let Err(e) = route(socket, query).await {
      error!("ws/attach session ended with error: {e:#}");
    }
  })
  .into_response()
}

async fn route(socket: WebSocket, query: AttachQuery) -> anyhow::Result<()> {
  let project_path = std::path::PathBuf::from(&query.file)
    .parent()
    .map(|p| p.to_path_buf())
    .unwrap_or_else(|| std::path::PathBuf::from(&query.file));

  match query.action.as_str() {
    "exec" => exec::run(socket, &project_path, &query.service).await,
    "inspect" => inspect::run(socket, &project_path, &query.service).await,
    "log" => log::run(socket, &project_path, &query.service, query.ip).await,
    "stop" => lifecycle_ws::run(socket, &project_path, &query.service, lifecycle_ws::Op::Stop).await,
    "restart" => lifecycle_ws::run(socket, &project_path, &query.service, lifecycle_ws::Op::Restart).await,
    other => {
      let mut socket = socket;
      let _ = socket
        .send(Message::Text(format!("unknown action: {other}").into()))
        .await;
      Ok(())
    }
  }
}

/// Registers a live session in the terminal registry (gating the
/// reconciler) and guarantees the registration is removed and the
/// session cancelled exactly once, regardless of which side initiated
/// the close.
pub struct SessionGuard {
  id: String,
}

impl SessionGuard {
  pub async fn register(cancel: tokio_util::sync::CancellationToken, resize: mpsc::UnboundedSender<(u16, u16)>) -> SessionGuard {
    let id = uuid_like_id();
    state::state().terminals.insert(id.clone(), pty::TerminalHandle { cancel, resize }).await;
    SessionGuard { id }
  }
}

impl Drop for SessionGuard {
  fn drop(&mut self) {
    let id = self.id.clone();
    tokio::spawn(async move {
      state::state().terminals.remove(&id).await;
    });
  }
}

fn uuid_like_id() -> String {
  use rand::RngCore;
  let mut bytes = [0u8; 16];
  rand::rng().fill_bytes(&mut bytes);
  hex::encode(bytes)
}

/// Runs the bidirectional socket<->PTY pump shared by exec and the
/// lifecycle-with-live-output sessions. Returns once either side
/// closes; the PTY's own child-wait task has already been started by
/// [`pty::spawn`].
pub async fn pump_socket_to_pty(mut socket: WebSocket, mut spawned: pty::SpawnedPty) -> anyhow::Result<()> {
  let cancel = spawned.cancel.clone();

  loop {
    tokio::select! {
      _ = cancel.cancelled() => break,
      incoming = socket.recv() => {
        match incoming {
          Some(Ok(Message::Text(text))) => {
            if let Some(resize) = parse_resize(&text) {
              let _ = spawned.resize_tx.send(resize);
            } else {
              let _ = spawned.stdin_tx.send(text.as_bytes().to_vec());
            }
          }
          Some(Ok(Message::Binary(bytes))) => {
            let _ = spawned.stdin_tx.send(bytes.to_vec());
          }
          Some(Ok(Message::Close(_))) | None => break,
          Some(Ok(_)) => {}
          Some(Err(_)) => break,
        }
      }
      outgoing = spawned.stdout_rx.recv() => {
        match outgoing {
          Some(bytes) => {
            if socket.send(Message::Binary(bytes.into())).await.is_err() {
              break;
            }
          }
          None => break,
        }
      }
    }
  }

  spawned.cancel.cancel();
  Ok(())
}

fn parse_resize(text: &str) -> Option<(u16, u16)> {
  if !text.trim_start().starts_with('{') {
    return None;
  }
  #[derive(Deserialize)]
  struct Resize {
    #[serde(rename = "type")]
    kind: String,
    cols: u16,
    rows: u16,
  }
  let parsed: Resize = serde_json::from_str(text).ok()?;
  if parsed.kind == "resize" {
    Some((parsed.cols, parsed.rows))
  } else {
    None
  }
}
