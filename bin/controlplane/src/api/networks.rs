//! `/api/networks*`, `/api/next-ip` — container network CRUD and the
//! free-IPv4 lookup the project editor UI calls before submitting an
//! `/api/apply` with a new static attachment.

use axum::{Json, extract::Query, http::StatusCode};
use serde::Deserialize;
use validations::{StringValidator, StringValidatorMatches};

use crate::{
  allocator, config, docker,
  error::{AppError, AppResult},
  project_ops,
};

#[derive(Debug, Deserialize)]
pub struct NextIpQuery {
  pub network: Option<String>,
}

/// Only the default managed network has a subnet this process
/// allocates into; any other name is rejected rather than guessed at.
pub async fn next_ip(Query(query): Query<NextIpQuery>) -> AppResult<Json<serde_json::Value>> {
  let config = config::config();
  if let Some(name) = &query.network {
    if name != &config.default_network_name {
      return Err(AppError::BadRequest(format!("unknown network: {name}")));
    }
  }
  let used = project_ops::workspace_used_ips(config).await;
  let ip = allocator::next_ipv4(config.default_subnet_base, &used)
    .ok_or_else(|| AppError::Conflict("subnet exhausted".into()))?;
  Ok(Json(serde_json::json!({ "ip": ip })))
}

pub async fn list() -> AppResult<Json<Vec<docker::NetworkInfo>>> {
  Ok(Json(docker::list_networks().await.map_err(AppError::Internal)?))
}

fn validate_network_name(name: &str) -> AppResult<()> {
  StringValidator::default()
    .min_length(1)
    .max_length(63)
    .matches(StringValidatorMatches::NetworkName)
    .validate(name)
    .map_err(|e| AppError::BadRequest(e.to_string()))
}

#[derive(Debug, Deserialize)]
pub struct CreateNetworkRequest {
  pub name: String,
  pub subnet: Option<String>,
  pub gateway: Option<String>,
}

pub async fn create(Json(req): Json<CreateNetworkRequest>) -> AppResult<StatusCode> {
  validate_network_name(&req.name)?;
  docker::create_network(&req.name, req.subnet.as_deref(), req.gateway.as_deref())
    .await
    .map_err(AppError::Internal)?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct DeleteNetworkRequest {
  pub id: String,
}

pub async fn delete(Json(req): Json<DeleteNetworkRequest>) -> AppResult<StatusCode> {
  docker::delete_network(&req.id).await.map_err(AppError::Internal)?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct UpdateNetworkRequest {
  pub name: String,
  pub subnet: Option<String>,
  pub gateway: Option<String>,
}

pub async fn update(Json(req): Json<UpdateNetworkRequest>) -> AppResult<StatusCode> {
  validate_network_name(&req.name)?;
  docker::update_network(&req.name, req.subnet.as_deref(), req.gateway.as_deref())
    .await
    .map_err(AppError::Internal)?;
  Ok(StatusCode::NO_CONTENT)
}
