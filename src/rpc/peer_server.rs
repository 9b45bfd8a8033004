//! `tonic` server-side binding of the Peer RPC surface onto a [`Replica`].

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::message::Message;
use crate::proto::peer_server::Peer;
use crate::proto::{
    CleanNeighboursReply, CleanNeighboursRequest, ConnectPeerReply, ConnectPeerRequest,
    IsAliveReply, IsAliveRequest, NotifyAcceptedReply, ReadLogReply, ReadLogRequest,
};
use crate::replica::Replica;
use crate::rpc::tonic_peer_link::TonicPeerLink;

/// Binds the generated `Peer` trait onto a running replica.
pub struct PeerService {
    replica: Arc<Replica>,
}

impl PeerService {
    pub fn new(replica: Arc<Replica>) -> Self {
        Self { replica }
    }
}

#[tonic::async_trait]
impl Peer for PeerService {
    async fn process_prepare(
        &self,
        request: Request<crate::proto::Message>,
    ) -> Result<Response<crate::proto::Message>, Status> {
        let m = Message::try_from(request.into_inner())?;
        let response = self.replica.handle_peer_prepare(m).await;
        Ok(Response::new(response.into()))
    }

    async fn process_accept(
        &self,
        request: Request<crate::proto::Message>,
    ) -> Result<Response<crate::proto::Message>, Status> {
        let m = Message::try_from(request.into_inner())?;
        let replica = Arc::clone(&self.replica);
        let response = replica.handle_peer_accept(m).await;
        let wire = response
            .map(crate::proto::Message::from)
            .unwrap_or_else(|| crate::proto::Message {
                hash: String::new(),
                ..Default::default()
            });
        Ok(Response::new(wire))
    }

    async fn notify_accepted(
        &self,
        request: Request<crate::proto::Message>,
    ) -> Result<Response<NotifyAcceptedReply>, Status> {
        let m = Message::try_from(request.into_inner())?;
        let replica = Arc::clone(&self.replica);
        let counted = replica.handle_notify_accepted(m).await;
        Ok(Response::new(NotifyAcceptedReply { counted }))
    }

    async fn read_log(
        &self,
        _request: Request<ReadLogRequest>,
    ) -> Result<Response<ReadLogReply>, Status> {
        let log = self
            .replica
            .handle_read_log()
            .await
            .into_iter()
            .map(crate::proto::Message::from)
            .collect();
        Ok(Response::new(ReadLogReply { log }))
    }

    async fn connect_peer(
        &self,
        request: Request<ConnectPeerRequest>,
    ) -> Result<Response<ConnectPeerReply>, Status> {
        let addr = request.into_inner().addr;
        let link = TonicPeerLink::connect_lazy(addr.clone(), self.replica.peer_timeout())?;
        self.replica
            .accept_peer(&addr, Arc::new(link) as Arc<dyn crate::rpc::peer_link::PeerLink>)
            .await;
        Ok(Response::new(ConnectPeerReply { ok: true }))
    }

    async fn clean_neighbours(
        &self,
        request: Request<CleanNeighboursRequest>,
    ) -> Result<Response<CleanNeighboursReply>, Status> {
        let excluded = request.into_inner().excluded;
        self.replica.handle_clean_neighbours(&excluded).await;
        Ok(Response::new(CleanNeighboursReply { ok: true }))
    }

    async fn is_alive(
        &self,
        _request: Request<IsAliveRequest>,
    ) -> Result<Response<IsAliveReply>, Status> {
        let alive = self.replica.handle_is_alive().await;
        Ok(Response::new(IsAliveReply { alive }))
    }
}
