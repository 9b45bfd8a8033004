//! Transport-agnostic view of a single peer, so dissemination logic never
//! touches sockets directly (grounded in the teacher's
//! `PaxosMessageHandler` trait, which decouples consensus from the
//! network layer the same way).

use async_trait::async_trait;

use crate::error::Result;
use crate::message::Message;

/// Everything the replica needs to say to one remote peer.
///
/// `TonicPeerLink` backs this with a real gRPC channel; `LocalPeerLink`
/// backs it with a direct in-process call for tests that want
/// deterministic, socket-free multi-node scenarios.
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// This peer's stable address.
    fn addr(&self) -> &str;

    /// Phase 1: ask this peer's acceptor to promise.
    async fn process_prepare(&self, m: Message) -> Result<Message>;

    /// Phase 2: ask this peer's acceptor to accept a value.
    async fn process_accept(&self, m: Message) -> Result<Message>;

    /// Inform this peer's learner that a value has been chosen, outside
    /// the accept response path (used for the self-accept case and for
    /// late-arriving learn notifications).
    async fn notify_accepted(&self, m: Message) -> Result<()>;

    /// Pull this peer's learned log, used during join.
    async fn read_log(&self) -> Result<Vec<Message>>;

    /// Ask this peer to add us as a neighbour.
    async fn connect_peer(&self, addr: &str) -> Result<()>;

    /// Ask this peer to drop a peer it knows about, other than `excluded`.
    async fn clean_neighbours(&self, excluded: &str) -> Result<()>;

    /// Liveness probe.
    async fn is_alive(&self) -> Result<bool>;
}
