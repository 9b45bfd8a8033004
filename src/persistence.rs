//! Durable backup of acceptor state: write-temp-then-rename, bincode framing.
//!
//! The spec leaves the on-disk format unconstrained beyond round-trip
//! fidelity (§6); `bincode` gives that cheaply given `Message` is already
//! `serde`-derived.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Error, Result};
use crate::message::Message;

/// Path to the file backing a node's last-promised message.
pub fn promise_path(backup_dir: &Path, node_id: &str) -> PathBuf {
    backup_dir.join(format!("{node_id}.promise.bin"))
}

/// Path to the file backing a node's last-accepted message.
pub fn accept_path(backup_dir: &Path, node_id: &str) -> PathBuf {
    backup_dir.join(format!("{node_id}.accept.bin"))
}

/// Atomically overwrite `path` with the bincode-serialized form of `value`.
///
/// Crash-safety requires write-then-rename: the new content lands in a
/// sibling temp file first, then an atomic rename replaces the target. A
/// crash mid-write leaves the old file (or no file) intact, never a
/// half-written one.
pub async fn save_atomic(path: &Path, value: &Option<Message>) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| Error::Io {
                operation: format!("creating backup directory {}", parent.display()),
                source,
            })?;
    }
    let bytes = bincode::serialize(value)?;
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, &bytes)
        .await
        .map_err(|source| Error::Io {
            operation: format!("writing temp backup file {}", tmp_path.display()),
            source,
        })?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|source| Error::Io {
            operation: format!("renaming backup file into place at {}", path.display()),
            source,
        })?;
    Ok(())
}

/// Save `value`, logging (not propagating) any failure. A disk failure
/// during save must not undo a decision the in-memory acceptor already
/// made (§4.1).
pub async fn save_best_effort(path: &Path, value: &Option<Message>) {
    if let Err(err) = save_atomic(path, value).await {
        warn!(error = %err, path = %path.display(), "failed to persist acceptor backup");
    }
}

/// Read a backup file. A missing file means "no prior state"; a corrupt or
/// unreadable file is logged and also treated as "no prior state". Each
/// file is restored independently of the other.
pub async fn restore(path: &Path) -> Option<Message> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(error = %err, path = %path.display(), "failed to read backup file");
            return None;
        }
    };
    match bincode::deserialize::<Option<Message>>(&bytes) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, path = %path.display(), "failed to decode backup file");
            None
        }
    }
}
