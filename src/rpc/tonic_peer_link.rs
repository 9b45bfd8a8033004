//! gRPC-backed [`PeerLink`], one lazily-connected channel per peer.

use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::Channel;
use tracing::warn;

use crate::error::{Error, Result};
use crate::message::Message;
use crate::proto::peer_client::PeerClient;
use crate::proto::{
    CleanNeighboursRequest, ConnectPeerRequest, IsAliveRequest, ReadLogRequest,
};
use crate::rpc::peer_link::PeerLink;

/// Talks to one peer over gRPC, bounding every call by `timeout`.
pub struct TonicPeerLink {
    addr: String,
    client: PeerClient<Channel>,
    timeout: Duration,
}

impl TonicPeerLink {
    /// Build a link to `addr`. The underlying channel connects lazily, so
    /// this never blocks or fails even if the peer isn't listening yet;
    /// failures surface on the first real call instead.
    pub fn connect_lazy(addr: impl Into<String>, timeout: Duration) -> Result<Self> {
        let addr = addr.into();
        let endpoint = Channel::from_shared(format!("http://{addr}"))
            .map_err(|e| Error::PeerConnectionFailed(format!("{addr}: {e}")))?;
        let channel = endpoint.connect_lazy();
        Ok(Self {
            addr,
            client: PeerClient::new(channel),
            timeout,
        })
    }

    async fn with_timeout<T>(
        &self,
        label: &str,
        fut: impl std::future::Future<Output = std::result::Result<T, tonic::Status>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(status)) => Err(Error::Rpc(status)),
            Err(_) => {
                warn!(peer = %self.addr, call = label, "rpc timed out");
                Err(Error::Timeout(format!("{label} to {}", self.addr)))
            }
        }
    }
}

#[async_trait]
impl PeerLink for TonicPeerLink {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn process_prepare(&self, m: Message) -> Result<Message> {
        let mut client = self.client.clone();
        let reply = self
            .with_timeout("process_prepare", client.process_prepare(proto_of(m)))
            .await?;
        Message::try_from(reply.into_inner())
    }

    async fn process_accept(&self, m: Message) -> Result<Message> {
        let mut client = self.client.clone();
        let reply = self
            .with_timeout("process_accept", client.process_accept(proto_of(m)))
            .await?;
        Message::try_from(reply.into_inner())
    }

    async fn notify_accepted(&self, m: Message) -> Result<()> {
        let mut client = self.client.clone();
        self.with_timeout("notify_accepted", client.notify_accepted(proto_of(m)))
            .await?;
        Ok(())
    }

    async fn read_log(&self) -> Result<Vec<Message>> {
        let mut client = self.client.clone();
        let reply = self
            .with_timeout("read_log", client.read_log(ReadLogRequest {}))
            .await?;
        reply
            .into_inner()
            .log
            .into_iter()
            .map(Message::try_from)
            .collect()
    }

    async fn connect_peer(&self, addr: &str) -> Result<()> {
        let mut client = self.client.clone();
        self.with_timeout(
            "connect_peer",
            client.connect_peer(ConnectPeerRequest { addr: addr.to_string() }),
        )
        .await?;
        Ok(())
    }

    async fn clean_neighbours(&self, excluded: &str) -> Result<()> {
        let mut client = self.client.clone();
        self.with_timeout(
            "clean_neighbours",
            client.clean_neighbours(CleanNeighboursRequest {
                excluded: excluded.to_string(),
            }),
        )
        .await?;
        Ok(())
    }

    async fn is_alive(&self) -> Result<bool> {
        let mut client = self.client.clone();
        let reply = self
            .with_timeout("is_alive", client.is_alive(IsAliveRequest {}))
            .await?;
        Ok(reply.into_inner().alive)
    }
}

fn proto_of(m: Message) -> crate::proto::Message {
    m.into()
}
