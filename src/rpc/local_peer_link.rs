//! In-process [`PeerLink`] wrapping a local [`Replica`] directly, used by
//! tests that want deterministic multi-node scenarios without sockets.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::message::Message;
use crate::replica::Replica;
use crate::rpc::peer_link::PeerLink;

/// Dispatches straight into another in-process `Replica`'s handlers,
/// skipping gRPC entirely.
pub struct LocalPeerLink {
    addr: String,
    replica: Arc<Replica>,
}

impl LocalPeerLink {
    pub fn new(replica: Arc<Replica>) -> Self {
        Self {
            addr: replica.addr().to_string(),
            replica,
        }
    }
}

#[async_trait]
impl PeerLink for LocalPeerLink {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn process_prepare(&self, m: Message) -> Result<Message> {
        Ok(self.replica.handle_peer_prepare(m).await)
    }

    async fn process_accept(&self, m: Message) -> Result<Message> {
        let replica = Arc::clone(&self.replica);
        let response = replica.handle_peer_accept(m.clone()).await;
        Ok(response.unwrap_or_else(|| Message::new(0, "", crate::message::MessageKind::Accept, "", "", 0, 0)))
    }

    async fn notify_accepted(&self, m: Message) -> Result<()> {
        let replica = Arc::clone(&self.replica);
        replica.handle_notify_accepted(m).await;
        Ok(())
    }

    async fn read_log(&self) -> Result<Vec<Message>> {
        Ok(self.replica.handle_read_log().await)
    }

    async fn connect_peer(&self, addr: &str) -> Result<()> {
        // The caller is expected to separately register the reciprocal
        // link; this just records that the dial succeeded.
        let _ = addr;
        Ok(())
    }

    async fn clean_neighbours(&self, excluded: &str) -> Result<()> {
        self.replica.handle_clean_neighbours(excluded).await;
        Ok(())
    }

    async fn is_alive(&self) -> Result<bool> {
        Ok(self.replica.handle_is_alive().await)
    }
}
