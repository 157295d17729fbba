//! Session issuance (`POST /api/login`) and the guard middleware that
//! every `*`-marked route in §6 runs behind. Sessions are opaque
//! random tokens validated against the in-memory session store;
//! mismatch of the originating client address invalidates a session
//! early instead of waiting out its 24h expiry.

use axum::{
  extract::Request,
  http::{HeaderMap, StatusCode, header::AUTHORIZATION},
  middleware::Next,
  response::{IntoResponse, Response},
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serror::AddStatusCode;

use crate::{config::Config, model::Session, state};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
  pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
  pub token: String,
}

/// Validates the password against `config.login_password` (empty
/// disables the check), issues a 32-byte random bearer token, and
/// rate-limits failed attempts per client address.
pub async fn login(config: &Config, headers: &HeaderMap, req: LoginRequest) -> serror::Result<LoginResponse> {
  use rate_limit::WithFailureRateLimit;

  let ip = state::client_ip(headers);

  async {
    if !config.login_password.is_empty() && req.password != config.login_password {
      return Err(anyhow::anyhow!("invalid password").status_code(StatusCode::UNAUTHORIZED));
    }

    let token = random_token();
    state::state()
      .sessions
      .insert(token.clone(), Session { created_at_ms: now_ms(), client_addr: ip })
      .await;
    info!("login succeeded from {ip}");
    Ok(LoginResponse { token })
  }
  .with_failure_rate_limit_using_ip(&state::state().rate_limiter, &ip)
  .await
}

/// `POST /api/login` handler. Thin `axum` wrapper so [`login`] itself
/// stays test-friendly without an `axum::Json` dependency on its
/// signature.
pub async fn login_route(
  headers: HeaderMap,
  axum::Json(req): axum::Json<LoginRequest>,
) -> serror::Result<axum::Json<LoginResponse>> {
  login(crate::config::config(), &headers, req).await.map(axum::Json)
}

fn random_token() -> String {
  let mut bytes = [0u8; 32];
  rand::rng().fill_bytes(&mut bytes);
  hex::encode(bytes)
}

fn now_ms() -> i64 {
  chrono::Utc::now().timestamp_millis()
}

/// `axum::middleware::from_fn` guard applied to every `*` route.
/// No-op when `config.login_password` is empty, matching the
/// documented "behind an already-trusted proxy" deployment mode.
pub async fn guard(req: Request, next: Next) -> Response {
  let config = crate::config::config();
  if config.login_password.is_empty() {
    return next.run(req).await;
  }

  match authenticate(req.headers()).await {
    Ok(()) => next.run(req).await,
    Err(status) => status.into_response(),
  }
}

async fn authenticate(headers: &HeaderMap) -> Result<(), StatusCode> {
  let token = headers
    .get(AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .map(|v| v.strip_prefix("Bearer ").unwrap_or(v))
    .ok_or(StatusCode::UNAUTHORIZED)?;

  check_token(token, state::client_ip(headers)).await
}

/// Shared by the header-based guard and the WS route's query-param
/// token check.
pub async fn check_token(token: &str, ip: std::net::IpAddr) -> Result<(), StatusCode> {
  let session = state::state()
    .sessions
    .get(&token.to_string())
    .await
    .ok_or(StatusCode::UNAUTHORIZED)?;

  if now_ms() - session.created_at_ms > crate::model::SESSION_TTL_MS {
    state::state().sessions.remove(&token.to_string()).await;
    return Err(StatusCode::UNAUTHORIZED);
  }
  if session.client_addr != ip {
    state::state().sessions.remove(&token.to_string()).await;
    return Err(StatusCode::UNAUTHORIZED);
  }
  Ok(())
}
