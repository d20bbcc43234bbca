//! Process-wide state persisted as JSON files.
//!
//! Each store is an explicit object constructed once at startup and handed to
//! the components that need it. Files are written atomically (`.tmp` + rename)
//! so a crash mid-write leaves the previous file intact.

pub mod guilds;
pub mod ledger;
pub mod log_index;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use guilds::{GuildConfig, GuildConfigStore};
pub use ledger::{local_date, LedgerKey, LedgerStore, LEDGER_UTC_OFFSET_HOURS};
pub use log_index::LogIndex;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed state in {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

impl StoreError {
    pub(crate) fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        StoreError::Malformed {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// When a store writes its file after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitPolicy {
    /// Write after every changing mutation.
    #[default]
    Immediate,
    /// Write once `max_pending` changing mutations have accumulated, and on
    /// every explicit flush. At most `max_pending - 1` updates are lost on a
    /// crash.
    Batched { max_pending: usize },
}

impl CommitPolicy {
    /// `0` and `1` mean immediate; anything larger is a batch size.
    pub fn from_batch_size(size: usize) -> Self {
        if size <= 1 {
            CommitPolicy::Immediate
        } else {
            CommitPolicy::Batched { max_pending: size }
        }
    }

    fn should_commit(&self, pending: usize) -> bool {
        match self {
            CommitPolicy::Immediate => pending > 0,
            CommitPolicy::Batched { max_pending } => pending >= *max_pending,
        }
    }
}

/// Read a JSON file. A missing file is `Ok(None)`; an unparseable one is
/// `StoreError::Malformed`.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if contents.trim().is_empty() {
        return Ok(None);
    }

    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| StoreError::malformed(path, e.to_string()))
}

/// Write a JSON file atomically, creating parent directories as needed.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let json = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");

    let mut file = fs::File::create(&tmp_path).map_err(io_err)?;
    file.write_all(json.as_bytes()).map_err(io_err)?;
    file.sync_data().map_err(io_err)?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(io_err)?;
    Ok(())
}
