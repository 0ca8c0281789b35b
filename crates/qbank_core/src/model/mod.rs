//! Record shapes for roles and per-role question banks.
//!
//! # Responsibility
//! - Define canonical data structures shared by repositories and the sampler.
//! - Enforce record-level invariants through `validate()` helpers.
//!
//! # Invariants
//! - A role id never changes after the role is first saved.
//! - Question ids are unique within one role's bank, not globally.

pub mod question;
pub mod role;
