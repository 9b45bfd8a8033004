//! The replica: holds the three Paxos roles, owns peer connections, and
//! runs dissemination, retry, and join (§4.4–§4.8).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::acceptor::Acceptor;
use crate::config::ReplicaConfig;
use crate::error::{Error, Result};
use crate::learner::{is_majority, AcceptedTracker, LearnerLog};
use crate::message::Message;
use crate::proposer::Proposer;
use crate::rpc::peer_link::PeerLink;

/// `round` and the learner's log are kept under one lock (§5) so a reader
/// never observes one advance without the other.
struct ReplicaCore {
    round: u64,
    log: LearnerLog,
}

/// Result of fanning one message out to every current peer.
struct FanoutOutcome {
    /// Responses that matched our message by hash, including this node's
    /// own self-call.
    matched: u32,
    /// Peer addresses that timed out, errored, or didn't match.
    failed: Vec<String>,
}

/// Which `PeerLink` method a fan-out round issues, so `fan_out` stays
/// phase-agnostic.
#[derive(Clone, Copy)]
enum PeerCall {
    Prepare,
    Accept,
}

impl PeerCall {
    async fn send(self, link: &Arc<dyn PeerLink>, m: Message) -> Result<Message> {
        match self {
            PeerCall::Prepare => link.process_prepare(m).await,
            PeerCall::Accept => link.process_accept(m).await,
        }
    }
}

/// Owns this node's Proposer, Acceptor, and Learner, plus its peer
/// connections and the state needed to drive writes to consensus.
pub struct Replica {
    addr: String,
    peers: RwLock<HashMap<String, Arc<dyn PeerLink>>>,
    failed_peers: Mutex<HashSet<String>>,
    proposer: Proposer,
    acceptor: Acceptor,
    accepted: AcceptedTracker,
    core: RwLock<ReplicaCore>,
    config: ReplicaConfig,
    rng: Mutex<StdRng>,
}

impl Replica {
    /// Build a replica with an empty log and no peers. Call
    /// [`Replica::restore`] to hydrate durable acceptor state and
    /// [`Replica::join`] to catch up with an existing cluster.
    pub fn new(config: ReplicaConfig) -> Self {
        let addr = config.addr.clone();
        Self {
            acceptor: Acceptor::new(addr.clone(), config.backup_dir.clone()),
            proposer: Proposer::new(addr.clone()),
            accepted: AcceptedTracker::new(),
            peers: RwLock::new(HashMap::new()),
            failed_peers: Mutex::new(HashSet::new()),
            core: RwLock::new(ReplicaCore {
                round: 0,
                log: LearnerLog::default(),
            }),
            rng: Mutex::new(StdRng::from_entropy()),
            addr,
            config,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Hydrate durable acceptor state from disk. Call once at startup,
    /// before serving any RPCs.
    pub async fn restore(&self) {
        self.acceptor.restore_from_backup().await;
    }

    /// The learned log, concatenated with newline separators (the client
    /// façade's `Read`).
    pub async fn read(&self) -> String {
        let core = self.core.read().await;
        core.log
            .get_log()
            .iter()
            .filter_map(|entry| entry.as_ref())
            .map(|m| m.value.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub fn peer_timeout(&self) -> Duration {
        self.config.peer_timeout
    }

    // === Membership (§4.7) ===

    /// Dial `addr` and have it dial us back via `ConnectPeer`, then add it
    /// to our peer set.
    pub async fn join_peer(&self, addr: &str, link: Arc<dyn PeerLink>) -> Result<()> {
        link.connect_peer(&self.addr).await?;
        self.peers.write().await.insert(addr.to_string(), link);
        Ok(())
    }

    /// Inbound side of `join_peer`: a peer dialed us, so just record the
    /// connection back to it.
    pub async fn accept_peer(&self, addr: &str, link: Arc<dyn PeerLink>) {
        self.peers.write().await.insert(addr.to_string(), link);
    }

    pub async fn remove_failed_peer(&self, addr: &str) {
        self.peers.write().await.remove(addr);
    }

    /// Tell every peer to prune any of its own peers that fail `IsAlive`,
    /// used to collapse transient partitions after a majority loss.
    async fn notify_of_majority_failure(&self) {
        let peers: Vec<Arc<dyn PeerLink>> = self.peers.read().await.values().cloned().collect();
        let results = join_all(peers.iter().map(|p| p.clean_neighbours(&self.addr))).await;
        for result in results {
            if let Err(err) = result {
                debug!(error = %err, "clean_neighbours failed during majority-failure notification");
            }
        }
    }

    /// Inbound `CleanNeighbours`: probe every peer except `excluded`,
    /// pruning ones that don't answer `IsAlive` within the peer timeout.
    pub async fn handle_clean_neighbours(&self, excluded: &str) {
        let peers: Vec<(String, Arc<dyn PeerLink>)> = self
            .peers
            .read()
            .await
            .iter()
            .filter(|(addr, _)| addr.as_str() != excluded)
            .map(|(addr, link)| (addr.clone(), link.clone()))
            .collect();
        for (addr, link) in peers {
            let alive = tokio::time::timeout(self.config.peer_timeout, link.is_alive()).await;
            if !matches!(alive, Ok(Ok(true))) {
                warn!(peer = %addr, "pruning unresponsive peer during neighbour cleanup");
                self.remove_failed_peer(&addr).await;
            }
        }
    }

    // === Join protocol (§4.8) ===

    /// Establish bidirectional links to every peer the registry returned.
    pub async fn become_neighbours(&self, peers: Vec<(String, Arc<dyn PeerLink>)>) {
        for (addr, link) in peers {
            if let Err(err) = self.join_peer(&addr, link).await {
                warn!(peer = %addr, error = %err, "failed to establish link during join");
            }
        }
    }

    /// Adopt the longest log among current peers, then align `round` and
    /// this node's proposal id so it doesn't collide with what's already
    /// been proposed.
    pub async fn learn_latest_value_from_neighbours(&self) {
        let peers: Vec<Arc<dyn PeerLink>> = self.peers.read().await.values().cloned().collect();
        if peers.is_empty() {
            return;
        }
        let logs = join_all(peers.iter().map(|p| p.read_log())).await;
        let longest = logs
            .into_iter()
            .filter_map(|result| result.ok())
            .max_by_key(|log| log.len());
        let Some(longest) = longest else {
            return;
        };
        let last_proposal_id = longest.last().map(|m| m.proposal_id);
        let round = longest.len() as u64;
        {
            let mut core = self.core.write().await;
            core.log = LearnerLog::initialize_log(longest.into_iter().map(Some).collect());
            core.round = round;
        }
        if let Some(id) = last_proposal_id {
            self.proposer.update_message_id(id).await;
        }
        info!(round, "learned latest log from neighbours during join");
    }

    /// Full join sequence: link to every peer the registry handed back,
    /// then catch up the log and proposal numbering.
    pub async fn join(&self, peers: Vec<(String, Arc<dyn PeerLink>)>) {
        self.become_neighbours(peers).await;
        self.learn_latest_value_from_neighbours().await;
    }

    // === Inbound Peer RPC handlers ===

    /// A peer's prepare arrived. Per §4.5, seeing someone else's prepare
    /// first bumps our own proposer so any future proposal of ours
    /// outranks it.
    pub async fn handle_peer_prepare(&self, m: Message) -> Message {
        self.proposer.increment_message_id().await;
        let round = self.core.read().await.round;
        self.acceptor.process_prepare(m, round).await
    }

    /// A peer's accept arrived. Our own acceptance counts toward the
    /// gossiped majority view too (otherwise a two-node cluster could
    /// never cross the threshold from relayed notifies alone), and we
    /// asynchronously relay `NotifyAccepted` onward to our own peers so
    /// learners converge even without the original proposer reaching them
    /// directly.
    pub async fn handle_peer_accept(self: Arc<Self>, m: Message) -> Option<Message> {
        let round = self.core.read().await.round;
        let response = self.acceptor.process_accept(m.clone(), round).await;
        if let Some(accepted) = &response {
            if accepted.hash == m.hash {
                let this = Arc::clone(&self);
                let notify = accepted.clone();
                tokio::spawn(async move {
                    this.register_and_maybe_learn(notify.clone()).await;
                    this.propagate_notify_accepted(notify).await;
                });
            }
        }
        response
    }

    /// A peer told us `m` was accepted. Count it toward our own learner's
    /// majority view; if this crosses majority for the first time, learn
    /// it locally and keep the gossip spreading.
    pub async fn handle_notify_accepted(self: Arc<Self>, m: Message) -> bool {
        let newly_learned = self.register_and_maybe_learn(m.clone()).await;
        if newly_learned {
            let this = Arc::clone(&self);
            let notify = m.clone();
            tokio::spawn(async move { this.propagate_notify_accepted(notify).await });
        }
        true
    }

    /// Shared by the direct-accept and gossip-relay paths: record one more
    /// acceptance sighting of `m` and learn it locally the first time the
    /// count crosses majority.
    async fn register_and_maybe_learn(&self, m: Message) -> bool {
        let count = self.accepted.record_accepted(&m).await;
        let peer_count = self.peer_count().await;
        if !is_majority(count, peer_count) {
            return false;
        }
        let newly_learned = self.learn_if_current(&m).await;
        if newly_learned {
            self.accepted.clear(m.proposal_id).await;
        }
        newly_learned
    }

    async fn learn_if_current(&self, m: &Message) -> bool {
        let mut core = self.core.write().await;
        if core.log.current_round() != m.round {
            return false;
        }
        match core.log.learn_value(m.round, m.clone()) {
            Ok(true) => {
                core.round = m.round + 1;
                true
            }
            Ok(false) => false,
            Err(err) => {
                warn!(error = %err, round = m.round, "failed to learn gossiped value");
                false
            }
        }
    }

    async fn propagate_notify_accepted(&self, m: Message) {
        let peers: Vec<Arc<dyn PeerLink>> = self.peers.read().await.values().cloned().collect();
        let results = join_all(peers.iter().map(|p| p.notify_accepted(m.clone()))).await;
        for result in results {
            if let Err(err) = result {
                debug!(error = %err, "notify_accepted propagation to a peer failed");
            }
        }
    }

    /// Snapshot of learned values, for `ReadLog` and for peers joining.
    pub async fn handle_read_log(&self) -> Vec<Message> {
        self.core
            .read()
            .await
            .log
            .get_log()
            .iter()
            .filter_map(|entry| entry.clone())
            .collect()
    }

    /// Liveness probe: if this RPC completes at all, the node is alive.
    pub async fn handle_is_alive(&self) -> bool {
        true
    }

    /// Close out this node's peer connections, mirroring `start()`.
    pub async fn shutdown(&self) {
        self.peers.write().await.clear();
    }

    // === Write path (§4.4) ===

    /// Append `value` to the log, retrying under contention until a
    /// majority accepts it or `max_write_attempts` is exhausted.
    pub async fn write_to_paxos(&self, value: String) -> Result<()> {
        let hash = Message::random_hash();
        let mut ttl = self.config.ttl;

        for _ in 0..self.config.max_write_attempts {
            let round = self.core.read().await.round;

            let prepare = self.proposer.create_prepare(round, hash.clone(), ttl).await;
            let prepare_outcome = self.disseminate_prepare(&prepare, round).await;
            if !is_majority(prepare_outcome.matched, self.peer_count().await) {
                self.should_retry(&mut ttl).await;
                continue;
            }

            let accept = self
                .proposer
                .create_accept(value.clone(), hash.clone(), round, ttl)
                .await;
            let accept_outcome = self.disseminate_accept(&accept, round).await;
            if !is_majority(accept_outcome.matched, self.peer_count().await) {
                self.should_retry(&mut ttl).await;
                continue;
            }

            if self.learn_if_current(&accept).await {
                self.propagate_notify_accepted(accept).await;
            }
            return Ok(());
        }
        Err(Error::Timeout("write_to_paxos".to_string()))
    }

    /// Fan out a Prepare to every peer (self included), stopping early if
    /// a majority of peers have already failed (§4.5).
    async fn disseminate_prepare(&self, prepare: &Message, round: u64) -> FanoutOutcome {
        let self_response = self.acceptor.process_prepare(prepare.clone(), round).await;
        let matched = u32::from(self_response.hash == prepare.hash);
        self.fan_out(prepare, matched, PeerCall::Prepare).await
    }

    /// Fan out an Accept to every peer (self included), same abandon rule
    /// as Prepare.
    async fn disseminate_accept(&self, accept: &Message, round: u64) -> FanoutOutcome {
        let self_response = self.acceptor.process_accept(accept.clone(), round).await;
        let matched = u32::from(
            self_response
                .as_ref()
                .map(|m| m.hash == accept.hash)
                .unwrap_or(false),
        );
        self.fan_out(accept, matched, PeerCall::Accept).await
    }

    /// Send `message` to every current peer via `call`, counting
    /// responses that match by hash. Stops early once a majority of
    /// peers have already failed or disagreed (§4.5).
    async fn fan_out(&self, message: &Message, self_matched: u32, call: PeerCall) -> FanoutOutcome {
        let peers: Vec<(String, Arc<dyn PeerLink>)> = self
            .peers
            .read()
            .await
            .iter()
            .map(|(addr, link)| (addr.clone(), link.clone()))
            .collect();
        let total = peers.len();
        let timeout = self.config.peer_timeout;

        let mut matched = self_matched;
        let mut failed = Vec::new();
        let mut in_flight = FuturesUnordered::new();
        for (addr, link) in peers {
            let m = message.clone();
            in_flight.push(async move {
                let outcome = tokio::time::timeout(timeout, call.send(&link, m)).await;
                (addr, outcome)
            });
        }
        while let Some((addr, outcome)) = in_flight.next().await {
            match outcome {
                Ok(Ok(resp)) if resp.hash == message.hash => matched += 1,
                // A well-formed response that just didn't match means the
                // peer promised/accepted elsewhere, not a failure.
                Ok(Ok(_)) => {}
                _ => failed.push(addr),
            }
            if !failed.is_empty() && failed.len() * 2 >= total {
                break;
            }
        }
        if !failed.is_empty() {
            self.failed_peers.lock().await.extend(failed.iter().cloned());
        }
        FanoutOutcome { matched, failed }
    }

    /// Retry bookkeeping shared by both phases (§4.6): ttl countdown with
    /// jittered sleep at zero, failed-peer cleanup, and the single round
    /// advance that both the dissemination abandon rule and the retry
    /// itself describe.
    async fn should_retry(&self, ttl: &mut u32) {
        *ttl = ttl.saturating_sub(1);
        if *ttl == 0 {
            let sleep_secs = {
                let mut rng = self.rng.lock().await;
                rng.gen_range(0..=self.config.rand_offset_secs)
            };
            tokio::time::sleep(Duration::from_secs(sleep_secs)).await;
            *ttl = self.config.ttl;
        }
        self.failed_peers.lock().await.clear();
        self.notify_of_majority_failure().await;
        self.core.write().await.round += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::tempdir;

    /// A peer double that always promises/accepts whatever it's sent,
    /// echoing the request back.
    struct AgreeablePeer {
        addr: String,
    }

    #[async_trait]
    impl PeerLink for AgreeablePeer {
        fn addr(&self) -> &str {
            &self.addr
        }
        async fn process_prepare(&self, m: Message) -> Result<Message> {
            Ok(m)
        }
        async fn process_accept(&self, m: Message) -> Result<Message> {
            Ok(m)
        }
        async fn notify_accepted(&self, _m: Message) -> Result<()> {
            Ok(())
        }
        async fn read_log(&self) -> Result<Vec<Message>> {
            Ok(Vec::new())
        }
        async fn connect_peer(&self, _addr: &str) -> Result<()> {
            Ok(())
        }
        async fn clean_neighbours(&self, _excluded: &str) -> Result<()> {
            Ok(())
        }
        async fn is_alive(&self) -> Result<bool> {
            Ok(true)
        }
    }

    /// A peer double that never responds in time for our timeout.
    struct UnreachablePeer {
        addr: String,
    }

    #[async_trait]
    impl PeerLink for UnreachablePeer {
        fn addr(&self) -> &str {
            &self.addr
        }
        async fn process_prepare(&self, _m: Message) -> Result<Message> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            unreachable!("timed out before this resolves")
        }
        async fn process_accept(&self, _m: Message) -> Result<Message> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            unreachable!("timed out before this resolves")
        }
        async fn notify_accepted(&self, _m: Message) -> Result<()> {
            Ok(())
        }
        async fn read_log(&self) -> Result<Vec<Message>> {
            Ok(Vec::new())
        }
        async fn connect_peer(&self, _addr: &str) -> Result<()> {
            Ok(())
        }
        async fn clean_neighbours(&self, _excluded: &str) -> Result<()> {
            Ok(())
        }
        async fn is_alive(&self) -> Result<bool> {
            Ok(false)
        }
    }

    fn test_config(backup_dir: &std::path::Path) -> ReplicaConfig {
        ReplicaConfig {
            addr: "127.0.0.1:9000".to_string(),
            peer_timeout: Duration::from_millis(50),
            ttl: 3,
            rand_offset_secs: 0,
            max_write_attempts: 5,
            backup_dir: backup_dir.to_string_lossy().to_string(),
        }
    }

    #[tokio::test]
    async fn single_node_cluster_writes_in_one_round() {
        let dir = tempdir().unwrap();
        let replica = Replica::new(test_config(dir.path()));
        replica.write_to_paxos("hello".to_string()).await.unwrap();
        assert_eq!(replica.read().await, "hello");
    }

    #[tokio::test]
    async fn majority_of_two_peers_out_of_three_succeeds() {
        let dir = tempdir().unwrap();
        let replica = Replica::new(test_config(dir.path()));
        replica
            .accept_peer(
                "peer-a",
                Arc::new(AgreeablePeer { addr: "peer-a".to_string() }),
            )
            .await;
        replica
            .accept_peer(
                "peer-b",
                Arc::new(AgreeablePeer { addr: "peer-b".to_string() }),
            )
            .await;
        replica.write_to_paxos("quorum".to_string()).await.unwrap();
        assert_eq!(replica.read().await, "quorum");
    }

    #[tokio::test]
    async fn single_unreachable_peer_out_of_two_fails_majority_and_retries() {
        let mut config = test_config(tempdir().unwrap().path());
        config.max_write_attempts = 2;
        let replica = Replica::new(config);
        replica
            .accept_peer(
                "peer-a",
                Arc::new(UnreachablePeer { addr: "peer-a".to_string() }),
            )
            .await;
        let result = replica.write_to_paxos("never".to_string()).await;
        assert!(result.is_err(), "1 of 2 total participants is not a strict majority");
        assert_eq!(replica.read().await, "");
    }

    #[tokio::test]
    async fn retrying_a_write_already_learned_via_gossip_does_not_duplicate_the_entry() {
        // Mirrors the real race this guards against: a proposer's accept
        // responses time out at round 0 so it moves on to round 1, but its
        // peers did accept and the value reaches this replica's learner via
        // gossip at round 0 first. The stale retry must not be allowed to
        // re-append the same hash at round 1.
        let dir = tempdir().unwrap();
        let replica = Replica::new(test_config(dir.path()));
        let gossiped = Message::new(
            1,
            "retried-hash",
            crate::message::MessageKind::Accept,
            "first-try",
            "127.0.0.1:9000",
            0,
            3,
        );
        assert!(replica.learn_if_current(&gossiped).await);

        let stale_retry = Message::new(
            2,
            "retried-hash",
            crate::message::MessageKind::Accept,
            "first-try",
            "127.0.0.1:9000",
            1,
            3,
        );
        assert!(
            !replica.learn_if_current(&stale_retry).await,
            "same hash must not be learned twice under a different round"
        );
        assert_eq!(replica.read().await, "first-try");
    }

    #[tokio::test]
    async fn relearning_an_already_learned_round_does_not_duplicate_the_entry() {
        let dir = tempdir().unwrap();
        let replica = Replica::new(test_config(dir.path()));
        let m = Message::new(
            1,
            "fixed-hash",
            crate::message::MessageKind::Accept,
            "once",
            "127.0.0.1:9000",
            0,
            3,
        );
        assert!(replica.learn_if_current(&m).await, "first learn should succeed");
        assert!(
            !replica.learn_if_current(&m).await,
            "round 0 is no longer current once learned, so a repeat is a no-op"
        );
        assert_eq!(replica.read().await, "once");
    }
}
