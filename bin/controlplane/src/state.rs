//! Process-global, in-memory state. Nothing here is persisted: a
//! restart re-discovers projects from disk and loses transient status
//! and sessions, which is fine since both are re-derived (status) or
//! cheap to re-acquire (sessions, via another login).

use std::{net::IpAddr, sync::OnceLock};

use cache::CloneCache;

use crate::model::{Mapper, ServiceKey, Session, TransientState};

pub struct AppState {
  /// Latest reconciled view, served by `GET /api/mapper`.
  pub mapper: CloneCache<(), Mapper>,
  /// Services mid-restart/mid-stop, overlaid onto the Mapper's status
  /// until the driver observes the terminal state.
  pub transient: CloneCache<ServiceKey, TransientState>,
  /// Live login sessions, keyed by opaque bearer token.
  pub sessions: CloneCache<String, Session>,
  /// Active PTY/exec terminals, keyed by a client-chosen id.
  pub terminals: CloneCache<String, crate::ws::pty::TerminalHandle>,
  pub rate_limiter: std::sync::Arc<rate_limit::RateLimiter>,
}

impl AppState {
  fn new() -> Self {
    AppState {
      mapper: CloneCache::default(),
      transient: CloneCache::default(),
      sessions: CloneCache::default(),
      terminals: CloneCache::default(),
      rate_limiter: rate_limit::RateLimiter::new(false, 5, 15 * 60),
    }
  }
}

static STATE: OnceLock<AppState> = OnceLock::new();

pub fn state() -> &'static AppState {
  STATE.get_or_init(AppState::new)
}

pub async fn prune_expired_sessions() {
  let now = chrono::Utc::now().timestamp_millis();
  let expired: Vec<String> = state()
    .sessions
    .get_entries()
    .await
    .into_iter()
    .filter(|(_, s)| now - s.created_at_ms > crate::model::SESSION_TTL_MS)
    .map(|(token, _)| token)
    .collect();
  for token in expired {
    state().sessions.remove(&token).await;
  }
}

pub fn client_ip(headers: &axum::http::HeaderMap) -> IpAddr {
  rate_limit::get_ip_from_headers(headers)
    .unwrap_or_else(|_| IpAddr::from([127, 0, 0, 1]))
}
