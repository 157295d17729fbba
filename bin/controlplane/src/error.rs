//! HTTP-facing error type. Every handler returns `Result<T, AppError>`;
//! `AppError` knows how to render itself as a JSON body with the right
//! status code, mirroring the `serror` pattern used throughout.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("invalid request: {0}")]
  BadRequest(String),

  #[error("unauthorized")]
  Unauthorized,

  #[error("too many requests")]
  RateLimited,

  /// Name taken, running services block rename/delete, builtin
  /// network uneditable, and similar. Per spec this is reported as a
  /// 400 with an explanation, not a 409 — a conflict here is something
  /// the caller is expected to resolve and retry with the same verb.
  #[error("conflict: {0}")]
  Conflict(String),

  /// A container CLI invocation exited non-zero. Carries enough detail
  /// for the caller to show `stdout`/`stderr` verbatim, with the
  /// invoked binary and its arguments split per spec.md's
  /// `{error, stdout, stderr, cmd, args}` envelope.
  #[error("external tool failed: {cmd}")]
  ExternalTool {
    cmd: String,
    args: Vec<String>,
    stdout: String,
    stderr: String,
  },

  /// The proxy config editor's save-with-rollback protocol failed at
  /// the `test` or `reload` step. Carries `phase` so the caller can
  /// tell which step rolled back, per spec.md §8 scenario 5.
  #[error("proxy config save failed at {phase}: {stderr}")]
  ProxySave { phase: &'static str, stderr: String },

  #[error(transparent)]
  Internal(#[from] anyhow::Error),
}

impl AppError {
  /// Splits the invoked argv (eg from [`crate::lifecycle::resolve_argv`])
  /// into `cmd` (the binary) and `args` (the rest), matching spec.md's
  /// `{error, stdout, stderr, cmd, args}` external-tool envelope.
  pub fn external_tool(argv: &[String], out: &command::CommandOutput) -> AppError {
    let (program, args) = argv.split_first().map(|(p, a)| (p.clone(), a.to_vec())).unwrap_or_default();
    AppError::ExternalTool {
      cmd: program,
      args,
      stdout: out.stdout.clone(),
      stderr: out.stderr.clone(),
    }
  }

  pub fn from_proxy_save_error(e: crate::proxy::SaveError) -> AppError {
    match e {
      crate::proxy::SaveError::Test { stderr } => AppError::ProxySave { phase: "test", stderr },
      crate::proxy::SaveError::Reload { stderr } => AppError::ProxySave { phase: "reload", stderr },
    }
  }

  pub fn status_code(&self) -> StatusCode {
    match self {
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
      AppError::Unauthorized => StatusCode::UNAUTHORIZED,
      AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
      AppError::Conflict(_) => StatusCode::BAD_REQUEST,
      AppError::ExternalTool { .. } => StatusCode::INTERNAL_SERVER_ERROR,
      AppError::ProxySave { .. } => StatusCode::BAD_REQUEST,
      AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

#[derive(Serialize)]
struct ErrorBody {
  error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  stdout: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  stderr: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  cmd: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  args: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  phase: Option<&'static str>,
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let status = self.status_code();
    if status == StatusCode::INTERNAL_SERVER_ERROR {
      error!("request failed: {:#}", self);
    } else {
      debug!("request failed: {}", self);
    }

    let body = match &self {
      AppError::ExternalTool { cmd, args, stdout, stderr } => ErrorBody {
        error: self.to_string(),
        stdout: Some(stdout.clone()),
        stderr: Some(stderr.clone()),
        cmd: Some(cmd.clone()),
        args: Some(args.clone()),
        phase: None,
      },
      AppError::ProxySave { phase, stderr } => ErrorBody {
        error: self.to_string(),
        stdout: None,
        stderr: Some(stderr.clone()),
        cmd: None,
        args: None,
        phase: Some(phase),
      },
      _ => ErrorBody { error: self.to_string(), stdout: None, stderr: None, cmd: None, args: None, phase: None },
    };

    (status, Json(body)).into_response()
  }
}

pub type AppResult<T> = Result<T, AppError>;
