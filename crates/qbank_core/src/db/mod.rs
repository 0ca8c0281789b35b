//! SQLite storage bootstrap, collection naming and versioned provisioning.
//!
//! # Responsibility
//! - Open fresh SQLite handles with the base schema applied.
//! - Map role ids to per-role collections (tables).
//! - Create collections through exclusive, version-bumping migrations.
//!
//! # Invariants
//! - Schema version is tracked via `PRAGMA user_version`.
//! - Every collection creation advances the version by exactly one.
//! - Handles are opened per operation and never cached.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod collection;
pub mod migrations;
mod open;
pub mod provision;

pub use collection::CollectionName;
pub use open::{open_store, StoreHandle};
pub use provision::{MigrationOutcome, ProvisionError, Provisioner};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    /// The database file cannot be opened at all.
    StorageUnavailable {
        path: PathBuf,
        source: rusqlite::Error,
    },
    Sqlite(rusqlite::Error),
    /// Blocking storage task panicked or was cancelled.
    Background(tokio::task::JoinError),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StorageUnavailable { path, source } => {
                write!(f, "storage unavailable at `{}`: {source}", path.display())
            }
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Background(err) => write!(f, "storage task failed: {err}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageUnavailable { source, .. } => Some(source),
            Self::Sqlite(err) => Some(err),
            Self::Background(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
