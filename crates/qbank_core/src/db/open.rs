//! Connection bootstrap and the per-operation store handle.
//!
//! # Responsibility
//! - Open the database file, configure the connection and apply the base
//!   schema before returning a usable handle.
//! - Snapshot the schema version and known collection set at open time.
//!
//! # Invariants
//! - Returned handles have the base schema applied.
//! - Failure to open the file is reported as `StorageUnavailable`.
//! - Dropping a handle closes its connection.

use super::collection::{CollectionName, ROLES_COLLECTION};
use super::migrations::{apply_base_migrations, user_version};
use super::{DbError, DbResult};
use crate::config::StoreConfig;
use log::{debug, error};
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::time::Instant;

/// One open connection plus what the store looked like when it was opened.
pub struct StoreHandle {
    conn: Connection,
    version: u32,
    has_roles: bool,
    collections: BTreeSet<CollectionName>,
}

impl StoreHandle {
    /// Schema version observed at open time.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Whether the fixed roles collection exists.
    pub fn has_roles_collection(&self) -> bool {
        self.has_roles
    }

    /// Exact-name membership in the known collection set.
    pub fn has_collection(&self, name: &CollectionName) -> bool {
        self.collections.contains(name)
    }

    /// Per-role collections known at open time, in name order.
    pub fn collections(&self) -> impl Iterator<Item = &CollectionName> {
        self.collections.iter()
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    fn load(conn: Connection) -> DbResult<Self> {
        let version = user_version(&conn)?;
        let mut has_roles = false;
        let mut collections = BTreeSet::new();
        {
            let mut stmt =
                conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table';")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let name: String = row.get(0)?;
                if name == ROLES_COLLECTION {
                    has_roles = true;
                } else if let Some(collection) = CollectionName::parse(&name) {
                    collections.insert(collection);
                }
            }
        }

        Ok(Self {
            conn,
            version,
            has_roles,
            collections,
        })
    }
}

/// Opens the configured database file and returns a fresh handle.
///
/// # Side effects
/// - Creates the file and the base schema when absent.
/// - Emits `db_open` logging events with duration and status.
pub fn open_store(config: &StoreConfig) -> DbResult<StoreHandle> {
    let started_at = Instant::now();

    let mut conn = match Connection::open(config.db_path()) {
        Ok(conn) => conn,
        Err(source) => {
            error!(
                "event=db_open module=db status=error duration_ms={} error_code=storage_unavailable error={}",
                started_at.elapsed().as_millis(),
                source
            );
            return Err(DbError::StorageUnavailable {
                path: config.db_path().to_path_buf(),
                source,
            });
        }
    };

    let handle = bootstrap_connection(&mut conn, config).and_then(|()| StoreHandle::load(conn));
    match handle {
        Ok(handle) => {
            debug!(
                "event=db_open module=db status=ok duration_ms={} version={} collections={}",
                started_at.elapsed().as_millis(),
                handle.version,
                handle.collections.len()
            );
            Ok(handle)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection, config: &StoreConfig) -> DbResult<()> {
    conn.busy_timeout(config.busy_timeout())?;
    apply_base_migrations(conn)?;
    Ok(())
}
