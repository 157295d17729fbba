//! `GET /api/mapper`, `/api/stats`, `/api/status` — read-only views
//! over the Reconciler's derived state.

use axum::{Json, extract::Query};
use serde::Deserialize;

use crate::{
  config,
  error::{AppError, AppResult},
  lifecycle, logstats,
  model::{Mapper, ServiceStatus, service_key},
  project_ops, state, status,
};

pub async fn get_mapper() -> Json<Mapper> {
  Json(state::state().mapper.get(&()).await.unwrap_or_default())
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
  pub range: String,
}

pub async fn stats(Query(query): Query<StatsQuery>) -> AppResult<Json<logstats::StatsResponse>> {
  let range = logstats::Range::parse(&query.range)
    .ok_or_else(|| AppError::BadRequest(format!("unknown range: {}", query.range)))?;
  let config = config::config();
  let mapper = state::state().mapper.get(&()).await.unwrap_or_default();
  let response = logstats::compute_stats(&config.access_log_paths, &mapper, range, chrono::Utc::now())
    .map_err(AppError::Internal)?;
  Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
  pub path: String,
  pub service: String,
}

pub async fn status(Query(query): Query<StatusQuery>) -> AppResult<Json<ServiceStatus>> {
  let config = config::config();
  let dir = project_ops::resolve_project_dir(config, &query.path)?;
  let running = lifecycle::running_services(&dir).await.map_err(AppError::Internal)?;
  let live = if running.contains(&query.service) {
    ServiceStatus::Running
  } else {
    ServiceStatus::Stopped
  };
  let transient = state::state().transient.get(&service_key(&dir, &query.service)).await;
  Ok(Json(status::merge(live, transient)))
}
