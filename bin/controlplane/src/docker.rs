//! Thin `bollard` wrapper for the handful of operations that go
//! straight against the Docker Engine API instead of through the
//! container CLI: network and image CRUD for the `/api/networks` and
//! `/api/images` endpoints.

use std::sync::OnceLock;

use bollard::{
  Docker,
  image::{CreateImageOptions, ListImagesOptions, RemoveImageOptions},
  network::{CreateNetworkOptions, InspectNetworkOptions, ListNetworksOptions},
  service::{Ipam, IpamConfig},
};
use futures_util::StreamExt;
use serde::Serialize;

fn client() -> anyhow::Result<Docker> {
  static DOCKER: OnceLock<Docker> = OnceLock::new();
  if let Some(docker) = DOCKER.get() {
    return Ok(docker.clone());
  }
  let docker = Docker::connect_with_local_defaults()?;
  Ok(DOCKER.get_or_init(|| docker).clone())
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkInfo {
  pub id: String,
  pub name: String,
  pub driver: String,
  pub subnet: Option<String>,
  pub gateway: Option<String>,
  pub containers: Vec<String>,
}

pub async fn list_networks() -> anyhow::Result<Vec<NetworkInfo>> {
  let docker = client()?;
  let summaries = docker.list_networks(None::<ListNetworksOptions<String>>).await?;

  let mut out = Vec::with_capacity(summaries.len());
  for summary in summaries {
    let name = summary.name.clone().unwrap_or_default();
    let detail = docker
      .inspect_network(
        &name,
        Some(InspectNetworkOptions::<String> { verbose: true, ..Default::default() }),
      )
      .await
      .ok();

    let (subnet, gateway) = detail
      .as_ref()
      .and_then(|d| d.ipam.as_ref())
      .and_then(|ipam| ipam.config.as_ref())
      .and_then(|configs| configs.first())
      .map(|cfg| (cfg.subnet.clone(), cfg.gateway.clone()))
      .unwrap_or((None, None));

    let containers = detail
      .as_ref()
      .and_then(|d| d.containers.as_ref())
      .map(|c| c.keys().cloned().collect())
      .unwrap_or_default();

    out.push(NetworkInfo {
      id: summary.id.unwrap_or_default(),
      name,
      driver: summary.driver.unwrap_or_default(),
      subnet,
      gateway,
      containers,
    });
  }
  Ok(out)
}

/// Creates a user-defined bridge network with an optional static
/// subnet/gateway. `name` must already be validated by the caller.
pub async fn create_network(name: &str, subnet: Option<&str>, gateway: Option<&str>) -> anyhow::Result<()> {
  let docker = client()?;

  let ipam = if subnet.is_some() || gateway.is_some() {
    Some(Ipam {
      driver: Some("default".to_string()),
      config: Some(vec![IpamConfig {
        subnet: subnet.map(str::to_string),
        gateway: gateway.map(str::to_string),
        ..Default::default()
      }]),
      options: None,
    })
  } else {
    None
  };

  docker
    .create_network(CreateNetworkOptions {
      name: name.to_string(),
      driver: "bridge".to_string(),
      attachable: true,
      ipam: ipam.unwrap_or_default(),
      ..Default::default()
    })
    .await?;
  Ok(())
}

pub async fn delete_network(id: &str) -> anyhow::Result<()> {
  let docker = client()?;
  docker.remove_network(id).await?;
  Ok(())
}

/// Docker has no in-place network update: the existing network is
/// removed and recreated with the new IPAM config, under the same
/// name.
pub async fn update_network(name: &str, subnet: Option<&str>, gateway: Option<&str>) -> anyhow::Result<()> {
  let docker = client()?;
  docker
    .inspect_network(name, None::<InspectNetworkOptions<String>>)
    .await
    .map_err(|_| anyhow::anyhow!("network {name} not found"))?;
  docker.remove_network(name).await?;
  create_network(name, subnet, gateway).await
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageInfo {
  pub id: String,
  pub tags: Vec<String>,
  pub size: i64,
  pub created: i64,
}

pub async fn list_images() -> anyhow::Result<Vec<ImageInfo>> {
  let docker = client()?;
  let images = docker
    .list_images(Some(ListImagesOptions::<String> { all: false, ..Default::default() }))
    .await?;
  Ok(
    images
      .into_iter()
      .map(|img| ImageInfo {
        id: img.id,
        tags: img.repo_tags,
        size: img.size,
        created: img.created,
      })
      .collect(),
  )
}

/// Pulls `reference` (eg `nginx:1.25`), draining the pull's progress
/// stream to completion. Errors surfaced mid-stream abort the pull.
pub async fn pull_image(reference: &str) -> anyhow::Result<()> {
  let docker = client()?;
  let mut stream = docker.create_image(
    Some(CreateImageOptions { from_image: reference.to_string(), ..Default::default() }),
    None,
    None,
  );
  while let Some(progress) = stream.next().await {
    progress?;
  }
  Ok(())
}

pub async fn delete_image(id: &str) -> anyhow::Result<()> {
  let docker = client()?;
  docker
    .remove_image(id, Some(RemoveImageOptions { force: true, ..Default::default() }), None)
    .await?;
  Ok(())
}
