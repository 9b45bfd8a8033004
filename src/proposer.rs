//! Issues monotonically increasing proposal numbers (§4.2).

use tokio::sync::Mutex;

use crate::message::{Message, MessageKind};

/// Volatile per-node proposer state.
///
/// `message_id` is serialized by a single mutex: prepares issued by this
/// node and `IncrementMessageID` calls triggered by observing a peer's
/// prepare can race, and P1 requires the sequence this node emits to be
/// strictly increasing.
pub struct Proposer {
    proposer_id: String,
    message_id: Mutex<u64>,
}

impl Proposer {
    /// Create a proposer with stable identity `proposer_id`.
    pub fn new(proposer_id: impl Into<String>) -> Self {
        Self {
            proposer_id: proposer_id.into(),
            message_id: Mutex::new(0),
        }
    }

    /// Build a new Prepare message, incrementing `message_id`.
    pub async fn create_prepare(&self, round: u64, hash: impl Into<String>, ttl: u32) -> Message {
        let mut id = self.message_id.lock().await;
        *id += 1;
        Message::new(*id, hash, MessageKind::Prepare, "", self.proposer_id.clone(), round, ttl)
    }

    /// Build an Accept message using the current `message_id`; the id is
    /// already bumped by a prior `create_prepare` in the same write
    /// attempt.
    pub async fn create_accept(
        &self,
        value: impl Into<String>,
        hash: impl Into<String>,
        round: u64,
        ttl: u32,
    ) -> Message {
        let id = *self.message_id.lock().await;
        Message::new(id, hash, MessageKind::Accept, value, self.proposer_id.clone(), round, ttl)
    }

    /// Monotonically raise `message_id` to at least `new_id`. Used when the
    /// join protocol or a peer's promise reveals a higher id than this node
    /// has seen.
    pub async fn update_message_id(&self, new_id: u64) {
        let mut id = self.message_id.lock().await;
        if new_id > *id {
            *id = new_id;
        }
    }

    /// Bump `message_id` by one. Invoked when this node's acceptor
    /// processes someone else's prepare, so this node's own future
    /// proposals stay strictly higher than anything it has seen.
    pub async fn increment_message_id(&self) {
        let mut id = self.message_id.lock().await;
        *id += 1;
    }

    /// Current message id, for diagnostics and tests.
    #[cfg(test)]
    pub async fn message_id(&self) -> u64 {
        *self.message_id.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prepare_ids_strictly_increase() {
        let proposer = Proposer::new("p1");
        let a = proposer.create_prepare(0, "h1", 3).await;
        let b = proposer.create_prepare(0, "h2", 3).await;
        assert!(b.proposal_id > a.proposal_id);
    }

    #[tokio::test]
    async fn accept_reuses_the_last_prepare_id() {
        let proposer = Proposer::new("p1");
        let prepare = proposer.create_prepare(0, "h1", 3).await;
        let accept = proposer.create_accept("value", "h1", 0, 3).await;
        assert_eq!(accept.proposal_id, prepare.proposal_id);
    }

    #[tokio::test]
    async fn update_message_id_is_monotonic() {
        let proposer = Proposer::new("p1");
        proposer.update_message_id(10).await;
        assert_eq!(proposer.message_id().await, 10);
        proposer.update_message_id(3).await;
        assert_eq!(proposer.message_id().await, 10, "must not go backwards");
        proposer.update_message_id(20).await;
        assert_eq!(proposer.message_id().await, 20);
    }

    #[tokio::test]
    async fn increment_outranks_observed_prepares() {
        let proposer = Proposer::new("p1");
        proposer.update_message_id(5).await;
        proposer.increment_message_id().await;
        let next = proposer.create_prepare(0, "h1", 3).await;
        assert!(next.proposal_id > 5);
    }
}
