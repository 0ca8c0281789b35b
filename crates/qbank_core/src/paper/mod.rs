//! Exam paper assembly.
//!
//! # Responsibility
//! - Draw questions from an in-memory bank snapshot toward a target score.
//!
//! # Invariants
//! - Pure with respect to inputs: bank and weights are never mutated.
//! - No storage access.

pub mod sampler;

pub use sampler::{generate_paper, generate_paper_with_rng, GeneratedPaper, RatioMap};
