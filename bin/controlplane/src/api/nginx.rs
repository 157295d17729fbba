//! `/api/nginx`, `/api/nginx/save` — the reverse-proxy config editor
//! surface, wrapping [`crate::proxy`]'s parse/save-with-rollback.

use axum::Json;
use serde::{Deserialize, Serialize};

use crate::{
  config,
  error::{AppError, AppResult},
  proxy,
};

#[derive(Debug, Serialize)]
pub struct NginxConfigResponse {
  pub contents: String,
  pub model: proxy::ProxyModel,
}

pub async fn get_config() -> AppResult<Json<NginxConfigResponse>> {
  let config = config::config();
  let contents = std::fs::read_to_string(&config.proxy_config).map_err(|e| AppError::Internal(e.into()))?;
  let model = proxy::parse_model(&contents).map_err(AppError::Internal)?;
  Ok(Json(NginxConfigResponse { contents, model }))
}

#[derive(Debug, Deserialize)]
pub struct SaveNginxRequest {
  pub contents: String,
}

pub async fn save_config(Json(req): Json<SaveNginxRequest>) -> AppResult<()> {
  let config = config::config();
  let controller = proxy::NginxController::from_config(config);
  proxy::save_with_rollback(&config.proxy_config, &req.contents, &controller)
    .await
    .map_err(AppError::from_proxy_save_error)
}
