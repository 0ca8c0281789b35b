//! Question import use-case service.
//!
//! # Responsibility
//! - Parse raw question JSON, group it by type and attach it to a role's bank.
//!
//! # Invariants
//! - Nothing is written when parsing fails.
//! - Storage semantics (replace vs append, merge fallback) are the
//!   repository's; this service only forwards them.

use super::ServiceError;
use crate::import::parse_questions;
use crate::model::question::QuestionBank;
use crate::repo::bank_repo::{BankSaveOutcome, QuestionBankRepository};

/// Result of one import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    /// Number of questions accepted from the raw input.
    pub imported: usize,
    pub outcome: BankSaveOutcome,
}

pub struct ImportService<B: QuestionBankRepository> {
    banks: B,
}

impl<B: QuestionBankRepository> ImportService<B> {
    pub fn new(banks: B) -> Self {
        Self { banks }
    }

    /// Imports a JSON array of raw questions into `role_id`'s bank.
    ///
    /// # Errors
    /// - `ServiceError::Validation` for rejected input.
    /// - `ServiceError::Repo` for unknown roles and storage failures.
    pub async fn import_json(
        &self,
        role_id: &str,
        raw: &str,
        append: bool,
    ) -> Result<ImportSummary, ServiceError> {
        let questions = parse_questions(raw)?;
        let imported = questions.len();
        let bank = QuestionBank::from_questions(questions);

        let outcome = self.banks.save(role_id, &bank, append).await?;
        Ok(ImportSummary { imported, outcome })
    }
}
