//! Core domain logic for role question banks and exam paper assembly.
//! This crate is the single source of truth for storage and sampling rules.

pub mod config;
pub mod context;
pub mod db;
pub mod import;
pub mod logging;
pub mod model;
pub mod paper;
pub mod repo;
pub mod service;

pub use config::{ConfigError, StoreConfig};
pub use context::{RoleEvent, StoreContext};
pub use db::{CollectionName, DbError, MigrationOutcome, ProvisionError, Provisioner, StoreHandle};
pub use import::{parse_questions, ValidationError};
pub use logging::{init_logging, logging_status, LogLevel, LoggingError};
pub use model::question::{
    QuestionBank, QuestionId, QuestionRecord, QuestionType, QuestionValidationError,
};
pub use model::role::{RoleId, RoleInfo, RoleRecord};
pub use paper::{generate_paper, generate_paper_with_rng, GeneratedPaper, RatioMap};
pub use repo::bank_repo::{BankSaveOutcome, QuestionBankRepository, SqliteQuestionBankRepository};
pub use repo::role_repo::{RoleRepository, SqliteRoleRepository};
pub use repo::{RepoError, RepoResult};
pub use service::import_service::{ImportService, ImportSummary};
pub use service::paper_service::PaperService;
pub use service::ServiceError;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
