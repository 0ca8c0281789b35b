//! Question bank repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Store one role's whole bank as a single JSON entry in its collection.
//! - Provision the collection lazily for roles that are already registered.
//!
//! # Invariants
//! - A bank can only be attached to a role saved through `RoleRepository`.
//! - `append = false` replaces the stored bank wholesale.
//! - `append = true` concatenates incoming questions after existing ones per
//!   type; types absent from the incoming bank are untouched. Incoming
//!   questions whose id is already stored are skipped.
//! - The bank written back never repeats a question id.
//! - If the stored bank cannot be read for merging, the save falls back to
//!   overwrite, logs a warning and returns `BankSaveOutcome::MergeFallback`.

use super::role_repo::RoleRepository;
use super::{RepoError, RepoResult};
use crate::context::StoreContext;
use crate::db::collection::BANK_ENTRY_KEY;
use crate::db::{CollectionName, StoreHandle};
use crate::model::question::QuestionBank;
use log::{debug, info, warn};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::future::Future;

/// How a bank save was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BankSaveOutcome {
    /// Stored bank replaced by the incoming one.
    Replaced,
    /// Incoming questions appended to the stored bank.
    Merged,
    /// Append was requested but the stored bank was unreadable, so it was
    /// overwritten. `reason` carries the read failure.
    MergeFallback { reason: String },
}

/// Async repository interface for per-role question banks.
pub trait QuestionBankRepository {
    fn save(
        &self,
        role_id: &str,
        bank: &QuestionBank,
        append: bool,
    ) -> impl Future<Output = RepoResult<BankSaveOutcome>> + Send;

    /// Returns `None` when the role has no collection or no questions.
    fn get(&self, role_id: &str) -> impl Future<Output = RepoResult<Option<QuestionBank>>> + Send;
}

/// SQLite-backed question bank repository.
pub struct SqliteQuestionBankRepository<'ctx> {
    ctx: &'ctx StoreContext,
}

impl<'ctx> SqliteQuestionBankRepository<'ctx> {
    pub fn new(ctx: &'ctx StoreContext) -> Self {
        Self { ctx }
    }
}

impl QuestionBankRepository for SqliteQuestionBankRepository<'_> {
    async fn save(
        &self,
        role_id: &str,
        bank: &QuestionBank,
        append: bool,
    ) -> RepoResult<BankSaveOutcome> {
        bank.validate()?;
        let collection = CollectionName::for_role(role_id)?;
        let provisioner = self.ctx.provisioner();

        let present = {
            let collection = collection.clone();
            provisioner
                .with_store(move |handle| -> RepoResult<bool> {
                    Ok(handle.has_collection(&collection))
                })
                .await?
        };
        if !present {
            if self.ctx.roles().get(role_id).await?.is_none() {
                return Err(RepoError::RoleNotFound(role_id.to_string()));
            }
            provisioner.ensure_role_collection(role_id).await?;
        }

        let incoming = bank.clone();
        let question_count = incoming.len();
        let outcome = provisioner
            .with_store(move |handle| write_bank(handle, &collection, incoming, append))
            .await?;

        info!(
            "event=bank_save module=repo status=ok append={} questions={} outcome={}",
            append,
            question_count,
            outcome_code(&outcome)
        );
        Ok(outcome)
    }

    async fn get(&self, role_id: &str) -> RepoResult<Option<QuestionBank>> {
        let Ok(collection) = CollectionName::for_role(role_id) else {
            return Ok(None);
        };

        let bank = self
            .ctx
            .provisioner()
            .with_store(move |handle| -> RepoResult<Option<QuestionBank>> {
                if !handle.has_collection(&collection) {
                    return Ok(None);
                }
                read_bank(handle.conn(), &collection)
            })
            .await?;

        debug!(
            "event=bank_get module=repo status=ok found={}",
            bank.as_ref().is_some_and(|bank| !bank.is_empty())
        );
        Ok(bank.filter(|bank| !bank.is_empty()))
    }
}

fn write_bank(
    handle: &mut StoreHandle,
    collection: &CollectionName,
    incoming: QuestionBank,
    append: bool,
) -> RepoResult<BankSaveOutcome> {
    if !handle.has_collection(collection) {
        return Err(RepoError::CollectionMissing(collection.clone()));
    }

    let tx = handle
        .conn_mut()
        .transaction_with_behavior(TransactionBehavior::Immediate)?;

    let (stored, outcome) = if append {
        match read_bank(&tx, collection) {
            Ok(Some(mut existing)) => {
                let skipped = existing.append(incoming);
                if skipped > 0 {
                    warn!(
                        "event=bank_merge module=repo status=skipped_duplicates collection={} skipped={}",
                        collection, skipped
                    );
                }
                (existing, BankSaveOutcome::Merged)
            }
            Ok(None) => (incoming, BankSaveOutcome::Merged),
            Err(err) => {
                warn!(
                    "event=bank_merge module=repo status=fallback action=overwrite collection={} error={}",
                    collection, err
                );
                (
                    incoming,
                    BankSaveOutcome::MergeFallback {
                        reason: err.to_string(),
                    },
                )
            }
        }
    } else {
        (incoming, BankSaveOutcome::Replaced)
    };

    stored.validate()?;
    let payload = serde_json::to_string(&stored)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode bank: {err}")))?;
    tx.execute(
        &collection.upsert_entry_sql(),
        params![BANK_ENTRY_KEY, payload],
    )?;
    tx.commit()?;

    Ok(outcome)
}

fn read_bank(conn: &Connection, collection: &CollectionName) -> RepoResult<Option<QuestionBank>> {
    let payload: Option<String> = conn
        .query_row(&collection.select_entry_sql(), [BANK_ENTRY_KEY], |row| {
            row.get(0)
        })
        .optional()?;

    payload
        .map(|payload| {
            serde_json::from_str::<QuestionBank>(&payload).map_err(|err| {
                RepoError::InvalidData(format!("bank entry in `{collection}` is not valid: {err}"))
            })
        })
        .transpose()
}

fn outcome_code(outcome: &BankSaveOutcome) -> &'static str {
    match outcome {
        BankSaveOutcome::Replaced => "replaced",
        BankSaveOutcome::Merged => "merged",
        BankSaveOutcome::MergeFallback { .. } => "merge_fallback",
    }
}
