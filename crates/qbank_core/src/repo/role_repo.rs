//! Role repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide list/get/upsert over the fixed `roles` collection.
//! - Publish `RoleEvent`s after successful saves.
//!
//! # Invariants
//! - `save` is an upsert keyed by id: `created_at` is written once,
//!   `updated_at` is refreshed on every save and never precedes `created_at`.
//! - Saving a role does not provision its bank collection.

use super::RepoResult;
use crate::context::{RoleEvent, StoreContext};
use crate::db::CollectionName;
use crate::model::role::{RoleInfo, RoleRecord};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::future::Future;
use std::time::{SystemTime, UNIX_EPOCH};

const ROLE_SELECT_SQL: &str = "SELECT id, name, created_at, updated_at FROM roles";

/// Async repository interface for role records.
pub trait RoleRepository {
    /// Full scan. Callers must not depend on the order.
    fn list_all(&self) -> impl Future<Output = RepoResult<Vec<RoleRecord>>> + Send;
    fn get(&self, role_id: &str) -> impl Future<Output = RepoResult<Option<RoleRecord>>> + Send;
    /// Creates or renames a role and returns the stored record.
    fn save(&self, role: &RoleInfo) -> impl Future<Output = RepoResult<RoleRecord>> + Send;
}

/// SQLite-backed role repository.
pub struct SqliteRoleRepository<'ctx> {
    ctx: &'ctx StoreContext,
}

impl<'ctx> SqliteRoleRepository<'ctx> {
    pub fn new(ctx: &'ctx StoreContext) -> Self {
        Self { ctx }
    }
}

impl RoleRepository for SqliteRoleRepository<'_> {
    async fn list_all(&self) -> RepoResult<Vec<RoleRecord>> {
        self.ctx
            .provisioner()
            .with_store(|handle| -> RepoResult<Vec<RoleRecord>> {
                let mut stmt = handle
                    .conn()
                    .prepare(&format!("{ROLE_SELECT_SQL} ORDER BY created_at ASC, id ASC;"))?;
                let mut rows = stmt.query([])?;
                let mut roles = Vec::new();
                while let Some(row) = rows.next()? {
                    roles.push(parse_role_row(row)?);
                }
                Ok(roles)
            })
            .await
    }

    async fn get(&self, role_id: &str) -> RepoResult<Option<RoleRecord>> {
        let role_id = role_id.to_string();
        self.ctx
            .provisioner()
            .with_store(move |handle| -> RepoResult<Option<RoleRecord>> {
                let role = handle
                    .conn()
                    .query_row(
                        &format!("{ROLE_SELECT_SQL} WHERE id = ?1;"),
                        [role_id.as_str()],
                        parse_role_row,
                    )
                    .optional()?;
                Ok(role)
            })
            .await
    }

    async fn save(&self, role: &RoleInfo) -> RepoResult<RoleRecord> {
        role.validate()?;
        CollectionName::for_role(&role.id)?;

        let role = role.clone();
        let (record, created) = self
            .ctx
            .provisioner()
            .with_store(move |handle| upsert_role(handle.conn_mut(), &role))
            .await?;

        info!(
            "event=role_save module=repo status=ok created={} updated_at={}",
            created, record.updated_at
        );
        self.ctx.publish_role(if created {
            RoleEvent::Created(record.clone())
        } else {
            RoleEvent::Updated(record.clone())
        });
        Ok(record)
    }
}

fn upsert_role(conn: &mut Connection, role: &RoleInfo) -> RepoResult<(RoleRecord, bool)> {
    let now = now_epoch_ms();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existing_created_at: Option<i64> = tx
        .query_row(
            "SELECT created_at FROM roles WHERE id = ?1;",
            [role.id.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    let record = match existing_created_at {
        Some(created_at) => {
            let updated_at = now.max(created_at);
            tx.execute(
                "UPDATE roles SET name = ?1, updated_at = ?2 WHERE id = ?3;",
                params![role.name.as_str(), updated_at, role.id.as_str()],
            )?;
            RoleRecord {
                id: role.id.clone(),
                name: role.name.clone(),
                created_at,
                updated_at,
            }
        }
        None => {
            tx.execute(
                "INSERT INTO roles (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?3);",
                params![role.id.as_str(), role.name.as_str(), now],
            )?;
            RoleRecord {
                id: role.id.clone(),
                name: role.name.clone(),
                created_at: now,
                updated_at: now,
            }
        }
    };
    tx.commit()?;

    Ok((record, existing_created_at.is_none()))
}

fn parse_role_row(row: &Row<'_>) -> rusqlite::Result<RoleRecord> {
    Ok(RoleRecord {
        id: row.get("id")?,
        name: row.get("name")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|elapsed| i64::try_from(elapsed.as_millis()).ok())
        .unwrap_or_default()
}
