//! Node Address Controller
//!
//! Runs on every node and keeps the node's host-addresses annotation in line
//! with the addresses configured on its interfaces.

use std::sync::Arc;

use anyhow::{bail, Context};
use cluster_client::KubeClusterClient;
use node_address_controller::{NodeAddressReconciler, ReconcilerConfig};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Configure rustls crypto provider before any TLS client is built
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        info!("rustls crypto provider already installed");
    }

    info!("Starting Node Address Controller");

    let config = ReconcilerConfig::from_env()?;
    info!("Configuration:");
    info!("  Node: {}", config.node_name);
    info!("  Management port: {}", config.management_port.interface);
    info!("  Masquerade addresses: {:?} {:?}", config.bridge.v4_masquerade_ip, config.bridge.v6_masquerade_ip);
    info!("  Address subscriptions: {}", config.use_netlink);
    info!("  Resync interval: {:?}", config.resync_interval);

    let client = KubeClusterClient::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    let source = address_source(&config)?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let reconciler = NodeAddressReconciler::new(config, Arc::new(client), source);
    let task = reconciler.start(stop_rx);

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    let _ = stop_tx.send(true);

    match task.await {
        Ok(Ok(())) => {
            info!("Node Address Controller stopped");
            Ok(())
        }
        Ok(Err(e)) => {
            error!("Reconciler failed: {}", e);
            Err(e.into())
        }
        Err(e) => bail!("reconciler task panicked: {e}"),
    }
}

#[cfg(target_os = "linux")]
fn address_source(config: &ReconcilerConfig) -> anyhow::Result<Arc<dyn node_address_controller::AddressSource>> {
    Ok(Arc::new(node_address_controller::NetlinkAddressSource::new(
        config.management_port.interface.clone(),
    )))
}

#[cfg(not(target_os = "linux"))]
fn address_source(_config: &ReconcilerConfig) -> anyhow::Result<Arc<dyn node_address_controller::AddressSource>> {
    bail!("interface address discovery is only supported on Linux")
}
