//! Minimal glue binary for the membership registry. Reads an optional
//! TOML config path from `QUORUM_REGISTRY_CONFIG`, falling back to
//! built-in defaults. Argument parsing is out of scope for this crate.

use quorum_log::rpc::registry_server::RegistryServer;
use quorum_log::{RegistryConfig, RegistryGrpcServer, Registry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match std::env::var("QUORUM_REGISTRY_CONFIG") {
        Ok(path) => RegistryConfig::from_file(path)?,
        Err(_) => RegistryConfig::default(),
    };

    let bind_addr: std::net::SocketAddr = config.bind_addr.parse()?;
    let registry = Registry::new(config.heartbeat_interval);

    tracing::info!(addr = %bind_addr, "serving registry RPCs");

    tonic::transport::Server::builder()
        .add_service(RegistryGrpcServer::new(RegistryServer::new(registry)))
        .serve_with_shutdown(bind_addr, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
