//! The wire record exchanged across all Paxos phases.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::proto;

/// Length of the randomly generated message hash (matches the original
/// Go client's `MSGHASHLEN`).
pub const MESSAGE_HASH_LEN: usize = 4;

/// Phase a [`Message`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Phase 1: reserve a proposal number. Carries an empty value.
    Prepare,
    /// Phase 2: bind a value to a proposal number.
    Accept,
    /// A chosen value being relayed to learners.
    Consensus,
}

impl From<MessageKind> for proto::MessageKind {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Prepare => proto::MessageKind::Prepare,
            MessageKind::Accept => proto::MessageKind::Accept,
            MessageKind::Consensus => proto::MessageKind::Consensus,
        }
    }
}

impl From<proto::MessageKind> for MessageKind {
    fn from(kind: proto::MessageKind) -> Self {
        match kind {
            proto::MessageKind::Prepare => MessageKind::Prepare,
            proto::MessageKind::Accept => MessageKind::Accept,
            proto::MessageKind::Consensus => MessageKind::Consensus,
        }
    }
}

/// A single Paxos protocol message.
///
/// Equality is by `hash` alone (§3): two messages with the same hash refer
/// to the same client write, regardless of which proposal carried it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Monotonically increasing proposal number ("n" in Paxos literature).
    pub proposal_id: u64,
    /// Opaque token identifying the client write this message carries.
    pub hash: String,
    /// Which phase this message belongs to.
    pub kind: MessageKind,
    /// The value being proposed. Empty for `Prepare`.
    pub value: String,
    /// Stable identity of the node that authored this message.
    pub proposer_id: String,
    /// Log index (round) this message targets.
    pub round: u64,
    /// Retries remaining for the write attempt that produced this message.
    pub ttl: u32,
}

impl Message {
    /// Build a new message.
    pub fn new(
        proposal_id: u64,
        hash: impl Into<String>,
        kind: MessageKind,
        value: impl Into<String>,
        proposer_id: impl Into<String>,
        round: u64,
        ttl: u32,
    ) -> Self {
        Self {
            proposal_id,
            hash: hash.into(),
            kind,
            value: value.into(),
            proposer_id: proposer_id.into(),
            round,
            ttl,
        }
    }

    /// Generate a short random hash identifying a new client write.
    pub fn random_hash() -> String {
        const ALPHABET: &[u8] =
            b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
        let mut rng = rand::thread_rng();
        (0..MESSAGE_HASH_LEN)
            .map(|_| {
                let idx = rng.gen_range(0..ALPHABET.len());
                ALPHABET[idx] as char
            })
            .collect()
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Message {}

impl From<Message> for proto::Message {
    fn from(m: Message) -> Self {
        proto::Message {
            proposal_id: m.proposal_id,
            hash: m.hash,
            kind: proto::MessageKind::from(m.kind) as i32,
            value: m.value,
            proposer_id: m.proposer_id,
            round: m.round,
            ttl: m.ttl,
        }
    }
}

impl TryFrom<proto::Message> for Message {
    type Error = crate::error::Error;

    fn try_from(m: proto::Message) -> Result<Self, Self::Error> {
        let kind = proto::MessageKind::try_from(m.kind)
            .map_err(|_| crate::error::Error::InvalidMessageKind)?;
        Ok(Message {
            proposal_id: m.proposal_id,
            hash: m.hash,
            kind: kind.into(),
            value: m.value,
            proposer_id: m.proposer_id,
            round: m.round,
            ttl: m.ttl,
        })
    }
}
