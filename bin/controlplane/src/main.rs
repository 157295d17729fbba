//! Entry point: loads config, starts the HTTP/WS server and the
//! periodic reconcile loop, and on SIGTERM cancels every live PTY
//! session before letting the server finish its graceful shutdown.

#[macro_use]
extern crate tracing;

mod allocator;
mod api;
mod atomic;
mod auth;
mod compose;
mod config;
mod discovery;
mod docker;
mod error;
mod lifecycle;
mod logstats;
mod model;
mod project_ops;
mod proxy;
mod reconciler;
mod state;
mod status;
mod ws;

use std::time::Duration;

use config::Config;

const SESSION_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

async fn app() -> anyhow::Result<()> {
  let config = config::init()?;

  logger::init(&logger::LogConfig {
    level: config.log_level,
    stdio: config.log_mode,
    ..Default::default()
  })?;

  info!("controlplane starting, scanning {:?}", config.projects_root);

  if config.once {
    return match reconciler::tick(config).await {
      Ok(_) => Ok(()),
      Err(e) => {
        error!("reconcile failed: {e:#}");
        std::process::exit(1);
      }
    };
  }

  tokio::spawn(reconcile_loop(config));
  tokio::spawn(session_prune_loop());

  let router = api::app(config);
  let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
  info!("listening on {}", config.bind_address);

  axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

  Ok(())
}

async fn reconcile_loop(config: &'static Config) {
  let mut interval = tokio::time::interval(config.reconcile_interval);
  loop {
    interval.tick().await;
    if let Err(e) = reconciler::tick(config).await {
      error!("reconcile tick failed: {e:#}");
    }
  }
}

async fn session_prune_loop() {
  let mut interval = tokio::time::interval(SESSION_PRUNE_INTERVAL);
  loop {
    interval.tick().await;
    state::prune_expired_sessions().await;
  }
}

async fn shutdown_signal() {
  let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
    Ok(signal) => signal,
    Err(e) => {
      error!("failed to install SIGTERM handler: {e:#}");
      std::future::pending::<()>().await;
      return;
    }
  };
  term.recv().await;
  info!("received SIGTERM, cancelling active PTY sessions");
  for handle in state::state().terminals.get_values().await {
    handle.cancel.cancel();
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  app().await
}
