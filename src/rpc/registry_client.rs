//! Thin client for the Registry RPC surface, used by both the node
//! startup path and the client façade's `IsAlive`.

use std::time::Duration;

use tonic::transport::Channel;

use crate::error::{Error, Result};
use crate::proto::registry_client::RegistryClient as GeneratedClient;
use crate::proto::{CheckAliveRequest, HeartbeatRequest, RegisterRequest};

#[derive(Clone)]
pub struct RegistryClient {
    client: GeneratedClient<Channel>,
    timeout: Duration,
}

impl RegistryClient {
    pub fn connect_lazy(addr: impl Into<String>, timeout: Duration) -> Result<Self> {
        let addr = addr.into();
        let endpoint = Channel::from_shared(format!("http://{addr}"))
            .map_err(|e| Error::PeerConnectionFailed(format!("{addr}: {e}")))?;
        Ok(Self {
            client: GeneratedClient::new(endpoint.connect_lazy()),
            timeout,
        })
    }

    pub async fn register(&self, addr: impl Into<String>) -> Result<Vec<String>> {
        let mut client = self.client.clone();
        let reply = tokio::time::timeout(
            self.timeout,
            client.register(RegisterRequest { addr: addr.into() }),
        )
        .await
        .map_err(|_| Error::Timeout("registry register".to_string()))??;
        Ok(reply.into_inner().peers)
    }

    pub async fn heartbeat(&self, addr: impl Into<String>) -> Result<()> {
        let mut client = self.client.clone();
        tokio::time::timeout(
            self.timeout,
            client.heartbeat(HeartbeatRequest { addr: addr.into() }),
        )
        .await
        .map_err(|_| Error::Timeout("registry heartbeat".to_string()))??;
        Ok(())
    }

    pub async fn check_alive(&self) -> Result<bool> {
        let mut client = self.client.clone();
        let reply = tokio::time::timeout(self.timeout, client.check_alive(CheckAliveRequest {}))
            .await
            .map_err(|_| Error::Timeout("registry check_alive".to_string()))??;
        Ok(reply.into_inner().alive)
    }
}
