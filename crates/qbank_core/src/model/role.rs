//! Role domain model.
//!
//! # Responsibility
//! - Define the caller-facing role input (`RoleInfo`) and the persisted
//!   record (`RoleRecord`).
//!
//! # Invariants
//! - `id` is immutable once created.
//! - `updated_at >= created_at` for every persisted record.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Role identifier. Caller-supplied or generated by [`RoleInfo::new`].
pub type RoleId = String;

/// Caller input for creating or renaming a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInfo {
    pub id: RoleId,
    pub name: String,
}

impl RoleInfo {
    /// Creates role input with a generated id.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().simple().to_string(), name)
    }

    /// Creates role input with a caller-provided id.
    pub fn with_id(id: impl Into<RoleId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Rejects blank ids and names before persistence.
    pub fn validate(&self) -> Result<(), RoleValidationError> {
        if self.id.trim().is_empty() {
            return Err(RoleValidationError::EmptyId);
        }
        if self.name.trim().is_empty() {
            return Err(RoleValidationError::EmptyName);
        }
        Ok(())
    }
}

/// Persisted role row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRecord {
    pub id: RoleId,
    pub name: String,
    /// Unix epoch milliseconds of the first save.
    pub created_at: i64,
    /// Unix epoch milliseconds of the latest save.
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleValidationError {
    EmptyId,
    EmptyName,
}

impl Display for RoleValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "role id cannot be empty"),
            Self::EmptyName => write!(f, "role name cannot be empty"),
        }
    }
}

impl Error for RoleValidationError {}
