//! Paper generation use-case service.

use crate::paper::{generate_paper, GeneratedPaper, RatioMap};
use crate::repo::bank_repo::QuestionBankRepository;
use crate::repo::RepoResult;

pub struct PaperService<B: QuestionBankRepository> {
    banks: B,
}

impl<B: QuestionBankRepository> PaperService<B> {
    pub fn new(banks: B) -> Self {
        Self { banks }
    }

    /// Loads `role_id`'s bank and assembles a paper from it.
    ///
    /// A role without questions yields the empty paper.
    pub async fn generate_for_role(
        &self,
        role_id: &str,
        ratios: &RatioMap,
        target_score: f64,
    ) -> RepoResult<GeneratedPaper> {
        let bank = self.banks.get(role_id).await?;
        Ok(generate_paper(bank.as_ref(), ratios, target_score))
    }
}
