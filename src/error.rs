//! Error types for the quorum log.

use thiserror::Error;

/// Errors the consensus core and its surrounding services can surface.
#[derive(Error, Debug)]
pub enum Error {
    /// Dissemination saw a message that is neither Prepare nor Accept.
    #[error("invalid message kind for this operation")]
    InvalidMessageKind,

    /// Could not open an RPC connection to a peer during join.
    #[error("failed to connect to peer {0}")]
    PeerConnectionFailed(String),

    /// Registry rejected a duplicate registration.
    #[error("address already registered: {0}")]
    AddressAlreadyRegistered(String),

    /// Heartbeat or lookup for an address the registry has never seen.
    #[error("unknown registry key: {0}")]
    UnknownRegistryKey(String),

    /// Learner was asked for a log index that doesn't exist.
    #[error("invalid log index: {0}")]
    InvalidLogIndex(usize),

    /// Learner invariant breach: a value already exists for this round.
    /// This indicates a programming bug, not a transient failure.
    #[error("value for round {0} already exists in the log")]
    ValueForRoundInLogExists(usize),

    /// A labeled RPC exceeded its timeout.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Filesystem I/O failure (durable acceptor state, config loading).
    #[error("i/o error during {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// Durable-state (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] Box<bincode::ErrorKind>),

    /// Underlying gRPC transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// A peer or registry responded with a gRPC error status.
    #[error("rpc failed: {0}")]
    Rpc(#[from] tonic::Status),

    /// Configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for tonic::Status {
    fn from(err: Error) -> Self {
        match err {
            Error::AddressAlreadyRegistered(addr) => {
                tonic::Status::already_exists(format!("address already registered: {addr}"))
            }
            Error::UnknownRegistryKey(addr) => {
                tonic::Status::not_found(format!("unknown registry key: {addr}"))
            }
            Error::InvalidLogIndex(i) => {
                tonic::Status::out_of_range(format!("invalid log index: {i}"))
            }
            Error::InvalidMessageKind => tonic::Status::invalid_argument(err.to_string()),
            other => tonic::Status::internal(other.to_string()),
        }
    }
}
