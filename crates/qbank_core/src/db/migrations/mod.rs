//! Base schema registry and version helpers.
//!
//! # Responsibility
//! - Register the static base schema (the fixed `roles` collection).
//! - Apply pending base migrations atomically on open.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Versions above the base belong to per-role collection migrations and are
//!   never touched here.
//! - The version is re-read inside the write transaction, so concurrent first
//!   opens bump it at most once.

use crate::db::DbResult;
use rusqlite::{Connection, TransactionBehavior};

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

/// DDL for the fixed roles collection. Idempotent.
pub const ROLES_SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS roles (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_roles_name ON roles(name);
";

const BASE_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: ROLES_SCHEMA_SQL,
}];

/// Returns the version a freshly opened database has at minimum.
pub fn base_version() -> u32 {
    BASE_MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies base migrations the database has not seen yet.
pub fn apply_base_migrations(conn: &mut Connection) -> DbResult<()> {
    let base = base_version();
    if user_version(conn)? >= base {
        return Ok(());
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let current_version = user_version(&tx)?;
    if current_version >= base {
        return Ok(());
    }

    for migration in BASE_MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        set_user_version(&tx, migration.version)?;
    }
    tx.commit()?;

    Ok(())
}

/// Reads `PRAGMA user_version`.
pub fn user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

pub(crate) fn set_user_version(conn: &Connection, version: u32) -> DbResult<()> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))?;
    Ok(())
}
