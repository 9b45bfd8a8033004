//! Coordination service tracking live replicas and handing joiners the
//! current membership (§4.9).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Accepts registrations, maintains a heartbeat table, and answers
/// membership queries. Not consulted for consensus safety; it's only for
/// discovery, and a stale view is corrected by the consensus layer's own
/// peer timeouts.
pub struct Registry {
    members: RwLock<HashMap<String, Instant>>,
    heartbeat_interval: Duration,
}

impl Registry {
    pub fn new(heartbeat_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            members: RwLock::new(HashMap::new()),
            heartbeat_interval,
        })
    }

    /// Register `addr`, returning every other currently known member and
    /// starting a heartbeat monitor for it. Rejects a duplicate address.
    pub async fn register(self: &Arc<Self>, addr: String) -> Result<Vec<String>> {
        let mut members = self.members.write().await;
        if members.contains_key(&addr) {
            return Err(Error::AddressAlreadyRegistered(addr));
        }
        let peers = members.keys().cloned().collect();
        members.insert(addr.clone(), Instant::now());
        drop(members);

        info!(addr = %addr, "replica registered");
        let this = Arc::clone(self);
        tokio::spawn(async move { this.monitor(addr).await });
        Ok(peers)
    }

    /// Update `addr`'s last-seen timestamp.
    pub async fn heartbeat(&self, addr: &str) -> Result<()> {
        let mut members = self.members.write().await;
        match members.get_mut(addr) {
            Some(last_seen) => {
                *last_seen = Instant::now();
                Ok(())
            }
            None => Err(Error::UnknownRegistryKey(addr.to_string())),
        }
    }

    /// Liveness of the registry process itself. Always true once this
    /// call is reachable at all.
    pub async fn check_alive(&self) -> bool {
        true
    }

    async fn monitor(&self, addr: String) {
        let mut ticker = interval(self.heartbeat_interval);
        loop {
            ticker.tick().await;
            let mut members = self.members.write().await;
            let Some(last_seen) = members.get(&addr) else {
                return;
            };
            if last_seen.elapsed() > self.heartbeat_interval {
                warn!(addr = %addr, "evicting replica with no recent heartbeat");
                members.remove(&addr);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_registrant_sees_no_peers() {
        let registry = Registry::new(Duration::from_secs(2));
        let peers = registry.register("a".to_string()).await.unwrap();
        assert!(peers.is_empty());
    }

    #[tokio::test]
    async fn later_registrants_see_earlier_members() {
        let registry = Registry::new(Duration::from_secs(2));
        registry.register("a".to_string()).await.unwrap();
        let peers = registry.register("b".to_string()).await.unwrap();
        assert_eq!(peers, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let registry = Registry::new(Duration::from_secs(2));
        registry.register("a".to_string()).await.unwrap();
        let err = registry.register("a".to_string()).await.unwrap_err();
        assert!(matches!(err, Error::AddressAlreadyRegistered(addr) if addr == "a"));
    }

    #[tokio::test]
    async fn heartbeat_from_unknown_address_errors() {
        let registry = Registry::new(Duration::from_secs(2));
        let err = registry.heartbeat("ghost").await.unwrap_err();
        assert!(matches!(err, Error::UnknownRegistryKey(addr) if addr == "ghost"));
    }

    #[tokio::test]
    async fn check_alive_is_always_true() {
        let registry = Registry::new(Duration::from_secs(2));
        assert!(registry.check_alive().await);
    }
}
