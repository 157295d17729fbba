//! Route assembly. Handlers are grouped by concern across sibling
//! modules; everything but login, the mapper/stats reads, `/healthz`,
//! and the WS upgrade sits behind the session guard.

mod images;
mod lifecycle;
mod mapper;
mod networks;
mod nginx;
mod projects;

use axum::{
  Json, Router,
  http::{HeaderName, HeaderValue},
  middleware,
  routing::{get, post},
};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer};

use crate::{auth, config::Config};

pub fn app(config: &Config) -> Router {
  let authenticated = Router::new()
    .route("/api/status", get(mapper::status))
    .route("/api/next-ip", get(networks::next_ip))
    .route("/api/networks", get(networks::list))
    .route("/api/networks/create", post(networks::create))
    .route("/api/networks/delete", post(networks::delete))
    .route("/api/networks/update", post(networks::update))
    .route("/api/apply", post(projects::apply))
    .route("/api/add", post(projects::add))
    .route("/api/rename", post(projects::rename))
    .route("/api/delete", post(projects::delete))
    .route("/api/stop", post(lifecycle::stop))
    .route("/api/restart", post(lifecycle::restart))
    .route("/api/attach", post(lifecycle::attach))
    .route("/api/config-files", get(projects::list_config_files))
    .route("/api/config", get(projects::read_config_file))
    .route("/api/save-config", post(projects::save_config_file))
    .route("/api/nginx", get(nginx::get_config))
    .route("/api/nginx/save", post(nginx::save_config))
    .route("/api/images/list", get(images::list))
    .route("/api/images/pull", post(images::pull))
    .route("/api/images/delete", post(images::delete))
    .route_layer(middleware::from_fn(auth::guard));

  let public = Router::new()
    .route("/api/login", post(auth::login_route))
    .route("/api/mapper", get(mapper::get_mapper))
    .route("/api/stats", get(mapper::stats))
    .route("/healthz", get(healthz))
    .route("/ws/attach", get(crate::ws::attach));

  Router::new()
    .merge(public)
    .merge(authenticated)
    .layer(cors_layer(config))
    .layer(SetResponseHeaderLayer::overriding(
      HeaderName::from_static("x-content-type-options"),
      HeaderValue::from_static("nosniff"),
    ))
    .layer(SetResponseHeaderLayer::overriding(
      HeaderName::from_static("x-frame-options"),
      HeaderValue::from_static("DENY"),
    ))
}

fn cors_layer(config: &Config) -> CorsLayer {
  let allowed_origins = if config.cors_origins.is_empty() {
    vec![HeaderValue::from_static("*")]
  } else {
    config
      .cors_origins
      .iter()
      .filter_map(|origin| HeaderValue::from_str(origin).ok())
      .collect()
  };
  CorsLayer::new()
    .allow_origin(allowed_origins)
    .allow_methods(tower_http::cors::Any)
    .allow_headers(tower_http::cors::Any)
}

async fn healthz() -> Json<serde_json::Value> {
  Json(serde_json::json!({
    "tick_count": crate::reconciler::tick_count(),
    "last_tick_age_secs": crate::reconciler::last_tick_age_secs(),
  }))
}
