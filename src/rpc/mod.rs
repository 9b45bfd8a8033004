//! Transport layer: the `PeerLink` abstraction, its gRPC and in-process
//! implementations, and the `tonic` service bindings for both RPC
//! surfaces (§6).

pub mod local_peer_link;
pub mod peer_link;
pub mod peer_server;
pub mod registry_client;
pub mod registry_server;
pub mod tonic_peer_link;
