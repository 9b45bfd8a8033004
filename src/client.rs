//! Application-facing façade wrapping a [`Replica`] with registry
//! connect/heartbeat plumbing (§6).

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::config::ReplicaConfig;
use crate::error::Result;
use crate::replica::Replica;
use crate::rpc::local_peer_link::LocalPeerLink;
use crate::rpc::registry_client::RegistryClient;
use crate::rpc::tonic_peer_link::TonicPeerLink;

/// `NewClient`/`Connect`/`Read`/`Write`/`IsAlive`/`Heartbeat`, wrapping a
/// `Replica` the way the original `consensuslib.Client` wraps a
/// `PaxosNode`.
pub struct Client {
    replica: Arc<Replica>,
    registry: Option<RegistryClient>,
    heartbeat_rate: Duration,
}

impl Client {
    /// Build a client bound to `local_addr`, not yet connected to a
    /// registry.
    pub fn new(config: ReplicaConfig, heartbeat_rate: Duration) -> Self {
        Self {
            replica: Arc::new(Replica::new(config)),
            registry: None,
            heartbeat_rate,
        }
    }

    /// Direct access to the underlying replica, for wiring it into the
    /// Peer gRPC server.
    pub fn replica(&self) -> &Arc<Replica> {
        &self.replica
    }

    /// Restore durable acceptor state, register with the registry at
    /// `registry_addr`, join the returned peers, and start the
    /// heartbeat-emitter task.
    pub async fn connect(&mut self, registry_addr: impl Into<String>) -> Result<()> {
        self.replica.restore().await;

        let registry = RegistryClient::connect_lazy(registry_addr, self.replica.peer_timeout())?;
        let peer_addrs = registry.register(self.replica.addr().to_string()).await?;

        let links = peer_addrs
            .into_iter()
            .map(|addr| {
                let link = TonicPeerLink::connect_lazy(addr.clone(), self.replica.peer_timeout())?;
                Ok((addr, Arc::new(link) as Arc<dyn crate::rpc::peer_link::PeerLink>))
            })
            .collect::<Result<Vec<_>>>()?;
        self.replica.join(links).await;

        let local_addr = self.replica.addr().to_string();
        let heartbeat_registry = registry.clone();
        let rate = self.heartbeat_rate;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(rate);
            loop {
                ticker.tick().await;
                if let Err(err) = heartbeat_registry.heartbeat(local_addr.clone()).await {
                    warn!(error = %err, "heartbeat to registry failed");
                }
            }
        });

        self.registry = Some(registry);
        Ok(())
    }

    /// Build a `LocalPeerLink` to this client's own replica, for tests
    /// wiring an in-process cluster without sockets or a registry.
    pub fn local_link(&self) -> Arc<dyn crate::rpc::peer_link::PeerLink> {
        Arc::new(LocalPeerLink::new(Arc::clone(&self.replica)))
    }

    /// Concatenation of the learned log's values, newline-separated.
    pub async fn read(&self) -> String {
        self.replica.read().await
    }

    /// Append `value` to the log via Paxos.
    pub async fn write(&self, value: impl Into<String>) -> Result<()> {
        self.replica.write_to_paxos(value.into()).await
    }

    /// Whether the registry this client connected to is still reachable.
    pub async fn is_alive(&self) -> Result<bool> {
        match &self.registry {
            Some(registry) => registry.check_alive().await,
            None => Ok(false),
        }
    }
}
