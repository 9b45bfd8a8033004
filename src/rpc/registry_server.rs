//! `tonic` server-side binding of the Registry RPC surface.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::proto::registry_server::Registry as RegistryService;
use crate::proto::{
    CheckAliveReply, CheckAliveRequest, HeartbeatReply, HeartbeatRequest, RegisterReply,
    RegisterRequest,
};
use crate::registry::Registry;

pub struct RegistryServer {
    registry: Arc<Registry>,
}

impl RegistryServer {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

#[tonic::async_trait]
impl RegistryService for RegistryServer {
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<RegisterReply>, Status> {
        let addr = request.into_inner().addr;
        let peers = self.registry.register(addr).await?;
        Ok(Response::new(RegisterReply { peers }))
    }

    async fn heartbeat(
        &self,
        request: Request<HeartbeatRequest>,
    ) -> Result<Response<HeartbeatReply>, Status> {
        let addr = request.into_inner().addr;
        self.registry.heartbeat(&addr).await?;
        Ok(Response::new(HeartbeatReply {}))
    }

    async fn check_alive(
        &self,
        _request: Request<CheckAliveRequest>,
    ) -> Result<Response<CheckAliveReply>, Status> {
        let alive = self.registry.check_alive().await;
        Ok(Response::new(CheckAliveReply { alive }))
    }
}
