//! Minimal glue binary for one replica. Reads an optional TOML config
//! path from `QUORUM_NODE_CONFIG` and a registry address from
//! `QUORUM_REGISTRY_ADDR`; falls back to built-in defaults. Argument
//! parsing and an interactive shell are out of scope for this crate.

use std::sync::Arc;

use quorum_log::rpc::peer_server::PeerService;
use quorum_log::{Client, PeerGrpcServer, ReplicaConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match std::env::var("QUORUM_NODE_CONFIG") {
        Ok(path) => ReplicaConfig::from_file(path)?,
        Err(_) => ReplicaConfig::default(),
    };
    let registry_addr =
        std::env::var("QUORUM_REGISTRY_ADDR").unwrap_or_else(|_| "127.0.0.1:7000".to_string());

    let bind_addr: std::net::SocketAddr = config.addr.parse()?;
    let heartbeat_rate = std::time::Duration::from_secs(2);
    let mut client = Client::new(config, heartbeat_rate);
    client.connect(registry_addr).await?;

    let replica = Arc::clone(client.replica());
    tracing::info!(addr = %bind_addr, "serving peer RPCs");

    tonic::transport::Server::builder()
        .add_service(PeerGrpcServer::new(PeerService::new(replica)))
        .serve_with_shutdown(bind_addr, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
