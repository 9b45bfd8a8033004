//! In-process cluster scenarios wired with `LocalPeerLink`, covering the
//! write/read/join/partial-failure behaviours a real deployment exercises
//! over gRPC.

use std::sync::Arc;
use std::time::Duration;

use quorum_log::config::ReplicaConfig;
use quorum_log::replica::Replica;
use quorum_log::rpc::local_peer_link::LocalPeerLink;
use quorum_log::rpc::peer_link::PeerLink;

fn node_config(addr: &str, backup_dir: &std::path::Path) -> ReplicaConfig {
    ReplicaConfig {
        addr: addr.to_string(),
        peer_timeout: Duration::from_millis(200),
        ttl: 3,
        rand_offset_secs: 0,
        max_write_attempts: 10,
        backup_dir: backup_dir.join(addr.replace(':', "_")).to_string_lossy().to_string(),
    }
}

/// Poll `replica`'s read view until it matches `expected` or `timeout`
/// elapses. Dissemination to non-proposer nodes partly rides on
/// background-spawned gossip (`tokio::spawn` in `handle_peer_accept`), so
/// convergence isn't guaranteed the instant `write_to_paxos` returns.
async fn converge(replica: &Arc<Replica>, expected: &str, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if replica.read().await == expected {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "replica {} never converged to {:?}, last saw {:?}",
                replica.addr(),
                expected,
                replica.read().await
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Build `n` replicas, fully meshed via `LocalPeerLink`, wiring both
/// directions explicitly since `LocalPeerLink::connect_peer` is a no-op.
async fn build_cluster(n: usize, dir: &std::path::Path) -> Vec<Arc<Replica>> {
    let replicas: Vec<Arc<Replica>> = (0..n)
        .map(|i| Arc::new(Replica::new(node_config(&format!("127.0.0.1:{}", 9100 + i), dir))))
        .collect();

    for (i, a) in replicas.iter().enumerate() {
        for (j, b) in replicas.iter().enumerate() {
            if i == j {
                continue;
            }
            let link: Arc<dyn PeerLink> = Arc::new(LocalPeerLink::new(Arc::clone(b)));
            a.accept_peer(b.addr(), link).await;
        }
    }
    replicas
}

#[tokio::test]
async fn single_write_is_visible_on_every_node() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = build_cluster(3, dir.path()).await;

    cluster[0].write_to_paxos("hello".to_string()).await.unwrap();

    for replica in &cluster {
        converge(replica, "hello", Duration::from_secs(2)).await;
    }
}

#[tokio::test]
async fn two_sequential_writes_from_different_nodes_both_land() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = build_cluster(3, dir.path()).await;

    cluster[0].write_to_paxos("first".to_string()).await.unwrap();
    cluster[1].write_to_paxos("second".to_string()).await.unwrap();

    for replica in &cluster {
        converge(replica, "first\nsecond", Duration::from_secs(2)).await;
    }
}

#[tokio::test]
async fn three_interleaved_writers_all_succeed_without_losing_a_value() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = build_cluster(3, dir.path()).await;
    let (a, b, c) = (Arc::clone(&cluster[0]), Arc::clone(&cluster[1]), Arc::clone(&cluster[2]));

    let (r1, r2, r3) = tokio::join!(
        a.write_to_paxos("one".to_string()),
        b.write_to_paxos("two".to_string()),
        c.write_to_paxos("three".to_string()),
    );
    r1.unwrap();
    r2.unwrap();
    r3.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    let log = loop {
        let log = cluster[0].read().await;
        if ["one", "two", "three"].iter().all(|v| log.contains(v)) {
            break log;
        }
        assert!(tokio::time::Instant::now() < deadline, "writes never all landed: {log:?}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    let mut values: Vec<&str> = log.split('\n').collect();
    values.sort_unstable();
    assert_eq!(values, vec!["one", "three", "two"]);
    for replica in &cluster[1..] {
        converge(replica, &log, Duration::from_secs(2)).await;
    }
}

#[tokio::test]
async fn a_node_joining_after_writes_catches_up_via_read_log() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = build_cluster(2, dir.path()).await;
    cluster[0].write_to_paxos("before".to_string()).await.unwrap();
    cluster[0].write_to_paxos("join".to_string()).await.unwrap();

    let joiner = Arc::new(Replica::new(node_config("127.0.0.1:9199", dir.path())));
    let mut peers = Vec::new();
    for existing in &cluster {
        let to_existing: Arc<dyn PeerLink> = Arc::new(LocalPeerLink::new(Arc::clone(existing)));
        existing
            .accept_peer(joiner.addr(), Arc::new(LocalPeerLink::new(Arc::clone(&joiner))))
            .await;
        peers.push((existing.addr().to_string(), to_existing));
    }
    joiner.join(peers).await;

    assert_eq!(joiner.read().await, "before\njoin");
}

#[tokio::test]
async fn write_survives_a_single_peer_dropping_out_of_a_five_node_cluster() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = build_cluster(5, dir.path()).await;

    for replica in &cluster {
        replica.remove_failed_peer(cluster[4].addr()).await;
    }

    cluster[0].write_to_paxos("resilient".to_string()).await.unwrap();

    for replica in &cluster[..4] {
        converge(replica, "resilient", Duration::from_secs(2)).await;
    }
}

#[tokio::test]
async fn retrying_a_write_under_partial_failure_does_not_duplicate_the_entry() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = build_cluster(3, dir.path()).await;

    for replica in &cluster {
        replica.remove_failed_peer(cluster[2].addr()).await;
    }

    cluster[0].write_to_paxos("idempotent".to_string()).await.unwrap();
    cluster[0].write_to_paxos("idempotent".to_string()).await.unwrap();

    let log = cluster[0].read().await;
    assert_eq!(
        log.matches("idempotent").count(),
        2,
        "two distinct writes of the same text are two log entries, not deduplicated by value"
    );
}
