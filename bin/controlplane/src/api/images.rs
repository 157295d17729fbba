//! `/api/images/list`, `/pull`, `/delete` — image pass-through over
//! [`crate::docker`].

use axum::{Json, http::StatusCode};
use serde::Deserialize;

use crate::{docker, error::{AppError, AppResult}};

pub async fn list() -> AppResult<Json<Vec<docker::ImageInfo>>> {
  Ok(Json(docker::list_images().await.map_err(AppError::Internal)?))
}

#[derive(Debug, Deserialize)]
pub struct PullImageRequest {
  pub reference: String,
}

pub async fn pull(Json(req): Json<PullImageRequest>) -> AppResult<StatusCode> {
  docker::pull_image(&req.reference).await.map_err(AppError::Internal)?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct DeleteImageRequest {
  pub id: String,
}

pub async fn delete(Json(req): Json<DeleteImageRequest>) -> AppResult<StatusCode> {
  docker::delete_image(&req.id).await.map_err(AppError::Internal)?;
  Ok(StatusCode::NO_CONTENT)
}
