//! `/api/stop`, `/api/restart`, `/api/attach` — the fire-and-forget
//! lifecycle ops. The interactive, live-output form of stop/restart
//! lives behind `WS /ws/attach?action=stop|restart`; `/api/attach`
//! here is a lightweight readiness check (does a container exist for
//! this service right now) used before a caller opens that socket.

use axum::Json;
use serde::Deserialize;

use crate::{
  config,
  error::{AppError, AppResult},
  lifecycle::{self, ScriptKind},
  model::Project,
  project_ops,
};

#[derive(Debug, Deserialize)]
pub struct ServiceRequest {
  pub path: String,
  pub service: String,
}

pub async fn stop(Json(req): Json<ServiceRequest>) -> AppResult<Json<serde_json::Value>> {
  let config = config::config();
  let project = Project::at(project_ops::resolve_project_dir(config, &req.path)?);
  let out = lifecycle::stop(&project, &req.service, config).await?;
  if !out.success() {
    let argv = lifecycle::resolve_argv(&project, &req.service, &ScriptKind::Stop, config)?;
    return Err(AppError::external_tool(&argv, &out));
  }
  Ok(Json(serde_json::json!({ "success": true, "output": out.combined() })))
}

pub async fn restart(Json(req): Json<ServiceRequest>) -> AppResult<Json<serde_json::Value>> {
  let config = config::config();
  let project = Project::at(project_ops::resolve_project_dir(config, &req.path)?);
  let out = lifecycle::restart(&project, &req.service, config).await?;
  if !out.success() {
    let argv = lifecycle::resolve_argv(&project, &req.service, &ScriptKind::Restart, config)?;
    return Err(AppError::external_tool(&argv, &out));
  }
  Ok(Json(serde_json::json!({ "success": true, "output": out.combined() })))
}

pub async fn attach(Json(req): Json<ServiceRequest>) -> AppResult<Json<serde_json::Value>> {
  let config = config::config();
  let project = Project::at(project_ops::resolve_project_dir(config, &req.path)?);
  let container_id = lifecycle::container_id(&project, &req.service, config).await?;
  Ok(Json(serde_json::json!({ "container_id": container_id })))
}
