//! Repository layer over the provisioned store.
//!
//! # Responsibility
//! - Define async data-access contracts for roles and question banks.
//! - Keep SQL and serialization details inside the persistence boundary.
//!
//! # Invariants
//! - Writes validate records before touching storage.
//! - Provisioner failures propagate unchanged as `RepoError::Provision`.
//! - The only swallowed failure is the append-merge fallback, which is
//!   logged and reported through `BankSaveOutcome::MergeFallback`.

use crate::db::collection::InvalidRoleId;
use crate::db::{CollectionName, DbError, ProvisionError};
use crate::model::question::QuestionValidationError;
use crate::model::role::{RoleId, RoleValidationError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod bank_repo;
pub mod role_repo;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Provision(ProvisionError),
    /// Bank operation on a role that was never saved.
    RoleNotFound(RoleId),
    InvalidRoleId(InvalidRoleId),
    InvalidRole(RoleValidationError),
    InvalidQuestion(QuestionValidationError),
    /// Provisioning reported success but the collection is still absent.
    CollectionMissing(CollectionName),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Provision(err) => write!(f, "{err}"),
            Self::RoleNotFound(id) => write!(f, "role not found: {id}; save the role first"),
            Self::InvalidRoleId(err) => write!(f, "{err}"),
            Self::InvalidRole(err) => write!(f, "{err}"),
            Self::InvalidQuestion(err) => write!(f, "{err}"),
            Self::CollectionMissing(name) => {
                write!(f, "collection `{name}` is missing after provisioning; retry")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Provision(err) => Some(err),
            Self::InvalidRoleId(err) => Some(err),
            Self::InvalidRole(err) => Some(err),
            Self::InvalidQuestion(err) => Some(err),
            Self::RoleNotFound(_) => None,
            Self::CollectionMissing(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ProvisionError> for RepoError {
    fn from(value: ProvisionError) -> Self {
        Self::Provision(value)
    }
}

impl From<InvalidRoleId> for RepoError {
    fn from(value: InvalidRoleId) -> Self {
        Self::InvalidRoleId(value)
    }
}

impl From<RoleValidationError> for RepoError {
    fn from(value: RoleValidationError) -> Self {
        Self::InvalidRole(value)
    }
}

impl From<QuestionValidationError> for RepoError {
    fn from(value: QuestionValidationError) -> Self {
        Self::InvalidQuestion(value)
    }
}
