//! The durable per-node promise/accept state (§4.1).

use std::path::PathBuf;

use tokio::sync::RwLock;
use tracing::debug;

use crate::message::Message;
use crate::persistence;

/// In-memory snapshot of an acceptor's durable state.
#[derive(Debug, Clone, Default)]
struct AcceptorState {
    last_promised: Option<Message>,
    last_accepted: Option<Message>,
}

/// Durable per-node promise/accept state, applying the Paxos safety rules.
///
/// Serialized by a single `RwLock` (§5): self-calls and inbound peer RPCs
/// can interleave, and invariants A1/A2 require a single serialization
/// point.
pub struct Acceptor {
    node_id: String,
    backup_dir: PathBuf,
    state: RwLock<AcceptorState>,
}

impl Acceptor {
    /// Create an acceptor for `node_id`, persisting backups under
    /// `backup_dir`.
    pub fn new(node_id: impl Into<String>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            node_id: node_id.into(),
            backup_dir: backup_dir.into(),
            state: RwLock::new(AcceptorState::default()),
        }
    }

    /// Read the two persisted messages for this node and hydrate state.
    /// Missing or corrupt files mean "no prior state", independently per
    /// file.
    pub async fn restore_from_backup(&self) {
        let promised = persistence::restore(&persistence::promise_path(
            &self.backup_dir,
            &self.node_id,
        ))
        .await;
        let accepted = persistence::restore(&persistence::accept_path(
            &self.backup_dir,
            &self.node_id,
        ))
        .await;
        let mut state = self.state.write().await;
        state.last_promised = promised;
        state.last_accepted = accepted;
        debug!(
            node_id = %self.node_id,
            has_promise = state.last_promised.is_some(),
            has_accept = state.last_accepted.is_some(),
            "restored acceptor state from backup"
        );
    }

    /// Process a Prepare request for `current_round`, returning the
    /// acceptor's current promise. The caller treats a response whose hash
    /// equals the request's hash as "promise granted to me".
    pub async fn process_prepare(&self, m: Message, current_round: u64) -> Message {
        let mut state = self.state.write().await;
        match &state.last_promised {
            None => {
                state.last_promised = Some(m);
            }
            Some(promised) => {
                if m.proposal_id > promised.proposal_id && current_round >= promised.round {
                    state.last_promised = Some(m);
                } else if m.proposal_id > promised.proposal_id && promised.round == current_round
                {
                    state.last_promised = Some(m);
                }
                // else: leave last_promised unchanged.
            }
        }
        let response = state.last_promised.clone().unwrap();
        persistence::save_best_effort(
            &persistence::promise_path(&self.backup_dir, &self.node_id),
            &state.last_promised,
        )
        .await;
        response
    }

    /// Process an Accept request for `current_round`, returning the
    /// acceptor's current accepted message, or `None` if nothing has ever
    /// been accepted and this request didn't qualify either.
    pub async fn process_accept(&self, m: Message, current_round: u64) -> Option<Message> {
        let mut state = self.state.write().await;
        let promised = state.last_promised.clone();
        let accept = match (&state.last_accepted, &promised) {
            (None, Some(promised)) => {
                m.proposal_id == promised.proposal_id && m.hash == promised.hash
                    || m.proposal_id > promised.proposal_id
            }
            (None, None) => true,
            (Some(accepted), Some(promised)) => {
                (m.proposal_id == promised.proposal_id && m.hash == promised.hash)
                    || (m.proposal_id > promised.proposal_id && promised.round >= current_round)
                    || (m.proposal_id > accepted.proposal_id && accepted.round >= current_round)
            }
            (Some(accepted), None) => m.proposal_id > accepted.proposal_id,
        };
        if accept {
            state.last_accepted = Some(m);
        }
        let response = state.last_accepted.clone();
        persistence::save_best_effort(
            &persistence::accept_path(&self.backup_dir, &self.node_id),
            &state.last_accepted,
        )
        .await;
        response
    }

    /// Snapshot of the current promise, for tests and diagnostics.
    #[cfg(test)]
    pub async fn last_promised(&self) -> Option<Message> {
        self.state.read().await.last_promised.clone()
    }

    /// Snapshot of the current accept, for tests and diagnostics.
    #[cfg(test)]
    pub async fn last_accepted(&self) -> Option<Message> {
        self.state.read().await.last_accepted.clone()
    }
}
