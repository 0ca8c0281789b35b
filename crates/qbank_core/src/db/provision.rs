//! Versioned provisioning of per-role collections.
//!
//! # Responsibility
//! - Hand out fresh store handles per operation (`open`, `with_store`).
//! - Create per-role collections through version-bumping migrations.
//! - Serialize migrations behind one lock per provisioner.
//!
//! # Invariants
//! - At most one migration is in flight per provisioner.
//! - A caller that waited on the lock re-checks its collection before
//!   migrating, so one collection never costs two version bumps.
//! - Every migration also creates missing collections of all known roles.
//! - A failed, conflicting or timed-out migration leaves the version unchanged.
//! - A migration that commits after its bound expired is reported as
//!   `Migrated`, never as `MigrationTimeout`.

use super::collection::{CollectionName, InvalidRoleId};
use super::migrations::{set_user_version, user_version, ROLES_SCHEMA_SQL};
use super::open::{open_store, StoreHandle};
use super::{DbError, DbResult};
use crate::config::StoreConfig;
use log::{debug, error, info, warn};
use rusqlite::{Connection, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task;

/// Added to the busy timeout when waiting for a migration that outlived its
/// bound, since a commit can wait on locks for up to the busy timeout.
const COMMIT_GRACE_MARGIN: Duration = Duration::from_millis(250);

/// Result of `ensure_role_collection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The collection already existed; no version change.
    AlreadyPresent,
    /// A migration ran and advanced the version by one.
    Migrated {
        from_version: u32,
        to_version: u32,
        /// Collections of other known roles that were missing and got created.
        repaired: usize,
    },
}

#[derive(Debug)]
pub enum ProvisionError {
    InvalidRoleId(InvalidRoleId),
    Db(DbError),
    /// The migration did not finish within the configured bound.
    MigrationTimeout {
        collection: CollectionName,
        timeout: Duration,
    },
    /// Another writer moved the version between read and migration.
    VersionConflict { expected: u32, found: u32 },
    /// Migration abandoned before commit because its caller timed out.
    Cancelled { collection: CollectionName },
    /// Migration failed for any other reason.
    Failed {
        collection: CollectionName,
        source: DbError,
    },
}

impl Display for ProvisionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRoleId(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::MigrationTimeout {
                collection,
                timeout,
            } => write!(
                f,
                "migration for `{collection}` timed out after {}ms",
                timeout.as_millis()
            ),
            Self::VersionConflict { expected, found } => write!(
                f,
                "schema version conflict: expected {expected}, found {found}; retry the operation"
            ),
            Self::Cancelled { collection } => {
                write!(f, "migration for `{collection}` was cancelled")
            }
            Self::Failed { collection, source } => {
                write!(f, "migration for `{collection}` failed: {source}")
            }
        }
    }
}

impl Error for ProvisionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidRoleId(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Failed { source, .. } => Some(source),
            Self::MigrationTimeout { .. } => None,
            Self::VersionConflict { .. } => None,
            Self::Cancelled { .. } => None,
        }
    }
}

impl From<DbError> for ProvisionError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

/// Owner of the store location and the migration lock.
pub struct Provisioner {
    config: StoreConfig,
    migration_lock: Mutex<()>,
}

impl Provisioner {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            migration_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Opens a fresh handle at the current stored version.
    ///
    /// The caller owns the handle; dropping it closes the connection.
    pub async fn open(&self) -> DbResult<StoreHandle> {
        let config = self.config.clone();
        task::spawn_blocking(move || open_store(&config))
            .await
            .map_err(DbError::Background)?
    }

    /// Reads the schema version without retaining a handle.
    pub async fn current_version(&self) -> DbResult<u32> {
        self.with_store(|handle| Ok::<_, DbError>(handle.version()))
            .await
    }

    /// Exact-name check against the collections `handle` knows about.
    pub fn collection_exists(handle: &StoreHandle, role_id: &str) -> bool {
        CollectionName::for_role(role_id).map_or(false, |name| handle.has_collection(&name))
    }

    /// Runs `op` against a fresh handle on the blocking pool.
    ///
    /// The handle is dropped when `op` returns, on success and error alike.
    pub async fn with_store<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce(&mut StoreHandle) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DbError> + Send + 'static,
    {
        let config = self.config.clone();
        task::spawn_blocking(move || {
            let mut handle = open_store(&config)?;
            op(&mut handle)
        })
        .await
        .map_err(|err| E::from(DbError::Background(err)))?
    }

    /// Makes sure the collection for `role_id` exists.
    ///
    /// # Errors
    /// - `MigrationTimeout` when the migration exceeds the configured bound and
    ///   does not commit within the grace period that follows it.
    /// - `VersionConflict` when another writer advanced the version; the whole
    ///   call can be retried.
    /// - `Failed` for any other migration failure.
    pub async fn ensure_role_collection(
        &self,
        role_id: &str,
    ) -> Result<MigrationOutcome, ProvisionError> {
        let collection = CollectionName::for_role(role_id).map_err(ProvisionError::InvalidRoleId)?;
        let (present, _) = self.probe(&collection).await?;
        if present {
            return Ok(MigrationOutcome::AlreadyPresent);
        }

        let _guard = self.migration_lock.lock().await;

        let (present, version) = self.probe(&collection).await?;
        if present {
            debug!(
                "event=migration module=db status=skipped reason=created_while_waiting collection={}",
                collection
            );
            return Ok(MigrationOutcome::AlreadyPresent);
        }

        self.migrate(collection, version).await
    }

    async fn probe(&self, collection: &CollectionName) -> DbResult<(bool, u32)> {
        let collection = collection.clone();
        self.with_store(move |handle| {
            Ok::<_, DbError>((handle.has_collection(&collection), handle.version()))
        })
        .await
    }

    async fn migrate(
        &self,
        collection: CollectionName,
        from_version: u32,
    ) -> Result<MigrationOutcome, ProvisionError> {
        let started_at = Instant::now();
        let timeout = self.config.migration_timeout();
        info!(
            "event=migration module=db status=start collection={} from_version={}",
            collection, from_version
        );

        let mut handle = self.open().await?;
        let interrupt = handle.conn().get_interrupt_handle();
        let cancelled = Arc::new(AtomicBool::new(false));

        let mut job = {
            let collection = collection.clone();
            let cancelled = Arc::clone(&cancelled);
            task::spawn_blocking(move || {
                run_migration(handle.conn_mut(), &collection, from_version, &cancelled)
            })
        };

        let result = match tokio::time::timeout(timeout, &mut job).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(ProvisionError::Db(DbError::Background(join_err))),
            Err(_) => {
                cancelled.store(true, Ordering::SeqCst);
                interrupt.interrupt();
                // The job may already be past the cancel check and inside
                // COMMIT; its outcome decides what the caller sees.
                let grace = self.config.busy_timeout() + COMMIT_GRACE_MARGIN;
                match tokio::time::timeout(grace, &mut job).await {
                    Ok(Ok(Ok(repaired))) => {
                        warn!(
                            "event=migration module=db status=committed_after_timeout duration_ms={} collection={}",
                            started_at.elapsed().as_millis(),
                            collection
                        );
                        Ok(repaired)
                    }
                    _ => {
                        error!(
                            "event=migration module=db status=error duration_ms={} error_code=migration_timeout collection={}",
                            started_at.elapsed().as_millis(),
                            collection
                        );
                        return Err(ProvisionError::MigrationTimeout {
                            collection,
                            timeout,
                        });
                    }
                }
            }
        };

        match result {
            Ok(repaired) => {
                info!(
                    "event=migration module=db status=ok duration_ms={} collection={} from_version={} to_version={} repaired={}",
                    started_at.elapsed().as_millis(),
                    collection,
                    from_version,
                    from_version + 1,
                    repaired
                );
                Ok(MigrationOutcome::Migrated {
                    from_version,
                    to_version: from_version + 1,
                    repaired,
                })
            }
            Err(err) => {
                error!(
                    "event=migration module=db status=error duration_ms={} collection={} error={}",
                    started_at.elapsed().as_millis(),
                    collection,
                    err
                );
                Err(err)
            }
        }
    }
}

enum MigrationStep {
    Committed { repaired: usize },
    Conflict { found: u32 },
    Cancelled,
}

/// Runs one collection migration on `conn`, returning the repaired count.
pub(crate) fn run_migration(
    conn: &mut Connection,
    collection: &CollectionName,
    expected_version: u32,
    cancelled: &AtomicBool,
) -> Result<usize, ProvisionError> {
    match apply_collection_migration(conn, collection, expected_version, cancelled) {
        Ok(MigrationStep::Committed { repaired }) => Ok(repaired),
        Ok(MigrationStep::Conflict { found }) => {
            warn!(
                "event=migration module=db status=conflict collection={} expected_version={} found_version={}",
                collection, expected_version, found
            );
            Err(ProvisionError::VersionConflict {
                expected: expected_version,
                found,
            })
        }
        Ok(MigrationStep::Cancelled) => Err(ProvisionError::Cancelled {
            collection: collection.clone(),
        }),
        Err(source) => Err(ProvisionError::Failed {
            collection: collection.clone(),
            source,
        }),
    }
}

fn apply_collection_migration(
    conn: &mut Connection,
    collection: &CollectionName,
    expected_version: u32,
    cancelled: &AtomicBool,
) -> DbResult<MigrationStep> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let found = user_version(&tx)?;
    if found != expected_version {
        return Ok(MigrationStep::Conflict { found });
    }

    tx.execute_batch(ROLES_SCHEMA_SQL)?;

    let mut repaired = 0;
    for role_id in known_role_ids(&tx)? {
        let name = match CollectionName::for_role(&role_id) {
            Ok(name) => name,
            Err(err) => {
                warn!(
                    "event=migration module=db status=skip_role reason=invalid_role_id error={}",
                    err
                );
                continue;
            }
        };
        if name == *collection || table_exists(&tx, name.as_str())? {
            continue;
        }
        tx.execute_batch(&name.create_sql())?;
        repaired += 1;
    }

    tx.execute_batch(&collection.create_sql())?;
    set_user_version(&tx, expected_version + 1)?;

    if cancelled.load(Ordering::SeqCst) {
        return Ok(MigrationStep::Cancelled);
    }
    tx.commit()?;

    Ok(MigrationStep::Committed { repaired })
}

fn known_role_ids(conn: &Connection) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM roles;")?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn table_exists(conn: &Connection, table: &str) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
