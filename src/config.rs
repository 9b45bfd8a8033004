//! Configuration for replicas and the registry.
//!
//! Mirrors the teacher's `Config`/`ClusterConfig`/`ConsensusConfig` shape
//! (plain `serde`-derived structs with `Duration` fields and a `Default`
//! impl carrying the spec's defaults), loadable from an optional TOML file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Per-replica configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// This node's stable address identity (`IP:port`).
    pub addr: String,

    /// Per-peer RPC timeout (spec's `T`, default 5s).
    #[serde(with = "duration_secs")]
    pub peer_timeout: Duration,

    /// Retries remaining before a write goes to sleep and resets (spec's
    /// `TTL`, default 3).
    pub ttl: u32,

    /// Upper bound, in seconds, of the random jitter slept between retry
    /// rounds (spec's `RANDOFFSET`, default 3).
    pub rand_offset_secs: u64,

    /// Outer cap on write attempts, resolving Open Question 2 (unbounded
    /// retry in the original). Generous but finite.
    pub max_write_attempts: u32,

    /// Directory backup files are written under.
    pub backup_dir: String,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:0".to_string(),
            peer_timeout: Duration::from_secs(5),
            ttl: 3,
            rand_offset_secs: 3,
            max_write_attempts: 1000,
            backup_dir: "quorum-backup".to_string(),
        }
    }
}

impl ReplicaConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any field the file omits by first overlaying onto `Default`.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|source| Error::Io {
            operation: format!("reading config file {}", path.as_ref().display()),
            source,
        })?;
        toml::from_str(&contents).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Address the registry binds to.
    pub bind_addr: String,

    /// Heartbeat monitor interval / staleness threshold (spec's `H`,
    /// default 2s).
    #[serde(with = "duration_secs")]
    pub heartbeat_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7000".to_string(),
            heartbeat_interval: Duration::from_secs(2),
        }
    }
}

impl RegistryConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|source| Error::Io {
            operation: format!("reading config file {}", path.as_ref().display()),
            source,
        })?;
        toml::from_str(&contents).map_err(|e| Error::Config(e.to_string()))
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
