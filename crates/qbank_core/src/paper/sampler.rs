//! Weighted sampling without replacement across question types.
//!
//! # Invariants
//! - A question id is drawn at most once per paper, even if the bank repeats
//!   it.
//! - Only types with a positive initial weight can contribute questions.
//! - A type's live weight drops to zero once its pool is exhausted, so the
//!   loop ends when every eligible pool is empty, whatever the target.
//! - Eligible types are walked in `QuestionType` order; a zero roll selects
//!   the first eligible type.

use crate::model::question::{QuestionBank, QuestionRecord, QuestionType};
use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-type weights. Missing, zero, negative and non-finite weights exclude
/// the type.
pub type RatioMap = BTreeMap<QuestionType, f64>;

/// Assembled paper. Not persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPaper {
    pub list: Vec<QuestionRecord>,
    pub total_score: f64,
    /// `target - total`, present only when strictly positive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortfall: Option<f64>,
}

impl GeneratedPaper {
    /// Questions ordered by type, then by ascending difficulty.
    ///
    /// Draw order is kept among equal keys.
    pub fn sorted_for_display(&self) -> Vec<&QuestionRecord> {
        let mut sorted: Vec<&QuestionRecord> = self.list.iter().collect();
        sorted.sort_by(|a, b| {
            a.kind
                .cmp(&b.kind)
                .then_with(|| a.difficulty.total_cmp(&b.difficulty))
        });
        sorted
    }
}

/// Assembles a paper with the thread-local RNG.
pub fn generate_paper(
    bank: Option<&QuestionBank>,
    ratios: &RatioMap,
    target_score: f64,
) -> GeneratedPaper {
    generate_paper_with_rng(bank, ratios, target_score, &mut rand::thread_rng())
}

/// Assembles a paper drawing from `rng`.
///
/// An absent or empty bank yields an empty paper without a shortfall.
pub fn generate_paper_with_rng<R: Rng + ?Sized>(
    bank: Option<&QuestionBank>,
    ratios: &RatioMap,
    target_score: f64,
    rng: &mut R,
) -> GeneratedPaper {
    let Some(bank) = bank.filter(|bank| !bank.is_empty()) else {
        return GeneratedPaper::default();
    };

    let mut available: BTreeMap<QuestionType, Vec<QuestionRecord>> = bank
        .iter()
        .map(|(kind, questions)| (*kind, questions.clone()))
        .collect();
    let mut weights: RatioMap = ratios
        .iter()
        .filter(|(_, weight)| weight.is_finite() && **weight > 0.0)
        .map(|(kind, weight)| (*kind, *weight))
        .collect();

    let mut list = Vec::new();
    let mut total_score = 0.0;

    while total_score < target_score {
        let eligible: Vec<(QuestionType, f64)> = weights
            .iter()
            .filter(|(kind, weight)| {
                **weight > 0.0 && available.get(*kind).is_some_and(|pool| !pool.is_empty())
            })
            .map(|(kind, weight)| (*kind, *weight))
            .collect();
        let Some(chosen) = pick_weighted(&eligible, rng) else {
            break;
        };

        let pool = match available.get_mut(&chosen) {
            Some(pool) if !pool.is_empty() => pool,
            _ => {
                weights.insert(chosen, 0.0);
                continue;
            }
        };

        let question = pool.swap_remove(rng.gen_range(0..pool.len()));
        for (kind, pool) in available.iter_mut() {
            pool.retain(|other| other.id != question.id);
            if pool.is_empty() {
                if let Some(weight) = weights.get_mut(kind) {
                    *weight = 0.0;
                }
            }
        }
        total_score += question.score;
        list.push(question);
    }

    let gap = target_score - total_score;
    let shortfall = (gap > 0.0).then_some(gap);
    debug!(
        "event=paper_generate module=paper status=ok questions={} total_score={} target_score={} shortfall={}",
        list.len(),
        total_score,
        target_score,
        shortfall.unwrap_or(0.0)
    );

    GeneratedPaper {
        list,
        total_score,
        shortfall,
    }
}

fn pick_weighted<R: Rng + ?Sized>(
    eligible: &[(QuestionType, f64)],
    rng: &mut R,
) -> Option<QuestionType> {
    let (last, _) = *eligible.last()?;
    // Scaled by the largest weight so the sum stays finite.
    let max = eligible
        .iter()
        .map(|(_, weight)| *weight)
        .fold(f64::MIN_POSITIVE, f64::max);
    let sum: f64 = eligible.iter().map(|(_, weight)| weight / max).sum();

    let mut remaining = rng.gen::<f64>() * sum;
    for (kind, weight) in eligible {
        remaining -= weight / max;
        if remaining <= 0.0 {
            return Some(*kind);
        }
    }
    // Rounding can leave a sliver above zero after the last subtraction.
    Some(last)
}
