//! `/api/apply`, `/api/add`, `/api/rename`, `/api/delete`, and the
//! per-project `config/` directory CRUD — thin `axum` wrappers over
//! [`crate::project_ops`].

use axum::{Json, extract::Query, http::StatusCode};
use serde::Deserialize;

use crate::{config, error::AppResult, project_ops};

pub async fn apply(Json(req): Json<project_ops::ApplyRequest>) -> AppResult<StatusCode> {
  project_ops::apply(config::config(), req).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct AddRequest {
  pub name: String,
}

pub async fn add(Json(req): Json<AddRequest>) -> AppResult<StatusCode> {
  project_ops::add(config::config(), &req.name).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
  pub path: String,
  pub new_name: String,
}

pub async fn rename(Json(req): Json<RenameRequest>) -> AppResult<StatusCode> {
  project_ops::rename(config::config(), &req.path, &req.new_name).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
  pub path: String,
  pub confirm_name: String,
}

pub async fn delete(Json(req): Json<DeleteRequest>) -> AppResult<StatusCode> {
  project_ops::delete(config::config(), &req.path, &req.confirm_name).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
  pub path: String,
}

pub async fn list_config_files(Query(query): Query<PathQuery>) -> AppResult<Json<Vec<String>>> {
  Ok(Json(project_ops::list_config_files(config::config(), &query.path)?))
}

#[derive(Debug, Deserialize)]
pub struct ConfigFileQuery {
  pub path: String,
  pub filename: String,
}

pub async fn read_config_file(Query(query): Query<ConfigFileQuery>) -> AppResult<String> {
  project_ops::read_config_file(config::config(), &query.path, &query.filename)
}

#[derive(Debug, Deserialize)]
pub struct SaveConfigFileRequest {
  pub path: String,
  pub filename: String,
  pub contents: String,
}

pub async fn save_config_file(Json(req): Json<SaveConfigFileRequest>) -> AppResult<StatusCode> {
  project_ops::save_config_file(config::config(), &req.path, &req.filename, &req.contents)?;
  Ok(StatusCode::NO_CONTENT)
}
