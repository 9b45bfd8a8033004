//! A replicated append-only log built on per-entry Paxos consensus.
//!
//! Each node hosts a [`proposer::Proposer`], [`acceptor::Acceptor`], and
//! learner (see [`learner`]) behind a [`replica::Replica`], which owns
//! peer connections and runs dissemination, retry, and join. A
//! [`registry::Registry`] tracks live replicas for discovery. The
//! [`client::Client`] façade wraps a replica for application use.

pub mod acceptor;
pub mod client;
pub mod config;
pub mod error;
pub mod learner;
pub mod message;
pub mod persistence;
pub mod proposer;
pub mod registry;
pub mod replica;
pub mod rpc;

mod proto;

pub use client::Client;
pub use config::{RegistryConfig, ReplicaConfig};
pub use error::{Error, Result};
pub use message::{Message, MessageKind};
pub use registry::Registry;
pub use replica::Replica;

/// Generated `tonic` service wrappers, re-exported far enough for the
/// node/registry binaries to register them with a `Server`.
pub use proto::peer_server::PeerServer as PeerGrpcServer;
pub use proto::registry_server::RegistryServer as RegistryGrpcServer;
