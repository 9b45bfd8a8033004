//! Per-round learned values and acceptance counting (§4.3, §4.4).
//!
//! `LearnerLog` is deliberately lock-free: the replica wraps it together
//! with its own `round` counter in a single `RwLock` (§5) so both advance
//! atomically. `AcceptedTracker` counts toward majority independently, as
//! the spec requires it to be observable without blocking log reads.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::message::Message;

/// The append-only sequence of values this node has learned, one per
/// round. A `None` slot means the round exists (some proposer reserved
/// it) but no value has been learned there yet.
#[derive(Debug, Default)]
pub struct LearnerLog {
    entries: Vec<Option<Message>>,
}

impl LearnerLog {
    /// Start from a prior log, e.g. recovered from a neighbour during join.
    pub fn initialize_log(entries: Vec<Option<Message>>) -> Self {
        Self { entries }
    }

    /// Number of rounds known to this log, learned or not.
    pub fn current_round(&self) -> u64 {
        self.entries.len() as u64
    }

    /// The learned values, in round order.
    pub fn get_log(&self) -> &[Option<Message>] {
        &self.entries
    }

    /// Record that `value` was chosen for `round`.
    ///
    /// `value.hash` is first checked against the whole log, not just the
    /// target round: the same client write can be learned under more than
    /// one round number (a retry after a timed-out response can settle a
    /// later round for a hash gossip already learned at an earlier one),
    /// and relearning it must be a no-op wherever it's seen again, not
    /// just when it reappears at the same round. Returns `Ok(true)` if the
    /// log actually changed, `Ok(false)` if `value.hash` was already
    /// present anywhere and nothing was done. Learning past the end of the
    /// log is a bug in the caller; rounds are reserved by Prepare before
    /// they can be learned.
    pub fn learn_value(&mut self, round: u64, value: Message) -> Result<bool> {
        if self.entries.iter().flatten().any(|existing| existing.hash == value.hash) {
            return Ok(false);
        }
        let round = round as usize;
        if round == self.entries.len() {
            self.entries.push(Some(value));
            Ok(true)
        } else if round < self.entries.len() {
            if self.entries[round].is_some() {
                return Err(Error::ValueForRoundInLogExists(round));
            }
            self.entries[round] = Some(value);
            Ok(true)
        } else {
            Err(Error::InvalidLogIndex(round))
        }
    }

    /// Reserve slots up to `round` (exclusive) without learning a value,
    /// used when a Prepare opens a round ahead of what's been learned.
    pub fn ensure_round(&mut self, round: u64) {
        let round = round as usize;
        while self.entries.len() <= round {
            self.entries.push(None);
        }
    }
}

/// Counts acceptances seen for a given proposal id, keyed by
/// `proposal_id` (not round): since proposal ids strictly increase for
/// the lifetime of a node, one write attempt's id never collides with
/// another's, including across retries of the same round.
#[derive(Default)]
pub struct AcceptedTracker {
    counts: RwLock<HashMap<u64, u32>>,
}

impl AcceptedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more acceptance for `message.proposal_id`. Returns the
    /// updated count; first sight returns 1.
    pub async fn record_accepted(&self, message: &Message) -> u32 {
        let mut counts = self.counts.write().await;
        let count = counts.entry(message.proposal_id).or_insert(0);
        *count += 1;
        *count
    }

    /// How many acceptances have been seen for `proposal_id`.
    pub async fn num_already_accepted(&self, proposal_id: u64) -> u32 {
        self.counts.read().await.get(&proposal_id).copied().unwrap_or(0)
    }

    /// Drop tracking state for `proposal_id` once its write attempt is
    /// resolved.
    pub async fn clear(&self, proposal_id: u64) {
        self.counts.write().await.remove(&proposal_id);
    }
}

/// Whether `count` acceptances out of `peer_count` total peers (excluding
/// self) constitutes a majority, including this node's own vote.
pub fn is_majority(count: u32, peer_count: usize) -> bool {
    count as usize > (peer_count + 1) / 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;

    fn msg(hash: &str, round: u64) -> Message {
        Message::new(1, hash, MessageKind::Accept, "v", "p1", round, 3)
    }

    fn msg_with_id(proposal_id: u64, hash: &str, round: u64) -> Message {
        Message::new(proposal_id, hash, MessageKind::Accept, "v", "p1", round, 3)
    }

    #[test]
    fn learn_value_appends_next_round() {
        let mut log = LearnerLog::default();
        log.learn_value(0, msg("h0", 0)).unwrap();
        log.learn_value(1, msg("h1", 1)).unwrap();
        assert_eq!(log.current_round(), 2);
        assert_eq!(log.get_log()[1].as_ref().unwrap().hash, "h1");
    }

    #[test]
    fn relearning_the_same_value_is_idempotent() {
        let mut log = LearnerLog::default();
        log.learn_value(0, msg("h0", 0)).unwrap();
        log.learn_value(0, msg("h0", 0)).unwrap();
        assert_eq!(log.current_round(), 1);
    }

    #[test]
    fn relearning_the_same_hash_at_a_different_round_is_a_noop() {
        let mut log = LearnerLog::default();
        assert!(log.learn_value(0, msg("h0", 0)).unwrap());
        assert!(!log.learn_value(1, msg("h0", 1)).unwrap());
        assert_eq!(log.current_round(), 1, "a retried write with the same hash must not create a second entry");
    }

    #[test]
    fn relearning_a_different_value_for_a_settled_round_errors() {
        let mut log = LearnerLog::default();
        log.learn_value(0, msg("h0", 0)).unwrap();
        let err = log.learn_value(0, msg("different", 0)).unwrap_err();
        assert!(matches!(err, Error::ValueForRoundInLogExists(0)));
    }

    #[test]
    fn learning_past_the_end_is_rejected() {
        let mut log = LearnerLog::default();
        let err = log.learn_value(5, msg("h5", 5)).unwrap_err();
        assert!(matches!(err, Error::InvalidLogIndex(5)));
    }

    #[tokio::test]
    async fn accepted_tracker_counts_by_proposal_id() {
        let tracker = AcceptedTracker::new();
        let m = msg_with_id(7, "h0", 0);
        assert_eq!(tracker.record_accepted(&m).await, 1);
        assert_eq!(tracker.record_accepted(&m).await, 2);
        assert_eq!(tracker.num_already_accepted(7).await, 2);
    }

    #[tokio::test]
    async fn accepted_tracker_keeps_distinct_proposal_ids_separate() {
        let tracker = AcceptedTracker::new();
        tracker.record_accepted(&msg_with_id(1, "h0", 0)).await;
        tracker.record_accepted(&msg_with_id(1, "h0", 0)).await;
        let count = tracker.record_accepted(&msg_with_id(2, "h0", 1)).await;
        assert_eq!(count, 1);
        assert_eq!(tracker.num_already_accepted(1).await, 2);
    }

    #[test]
    fn majority_rule_matches_strict_quorum() {
        assert!(!is_majority(1, 2));
        assert!(is_majority(2, 2));
        assert!(!is_majority(2, 4));
        assert!(is_majority(3, 4));
    }
}
