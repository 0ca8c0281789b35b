//! Typed mapping from role ids to per-role collection (table) names.
//!
//! # Responsibility
//! - Derive an injection-safe table name for every role id.
//! - Recognize role collections among the tables of an opened store.
//!
//! # Invariants
//! - Names are `role_` + lowercase hex of the role id's UTF-8 bytes.
//! - Mapping is injective and reversible; raw role text never reaches SQL.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Fixed collection holding role rows.
pub const ROLES_COLLECTION: &str = "roles";
/// Key of the single entry inside a role collection.
pub const BANK_ENTRY_KEY: &str = "data";

const NAME_PREFIX: &str = "role_";
const MAX_ROLE_ID_BYTES: usize = 128;

static COLLECTION_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^role_(?:[0-9a-f]{2})+$").expect("valid collection name regex"));

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionName(String);

impl CollectionName {
    /// Derives the collection name for `role_id`.
    ///
    /// # Errors
    /// - Blank ids and ids over 128 bytes are rejected.
    pub fn for_role(role_id: &str) -> Result<Self, InvalidRoleId> {
        if role_id.trim().is_empty() {
            return Err(InvalidRoleId::Empty);
        }
        if role_id.len() > MAX_ROLE_ID_BYTES {
            return Err(InvalidRoleId::TooLong(role_id.len()));
        }

        let mut name = String::with_capacity(NAME_PREFIX.len() + role_id.len() * 2);
        name.push_str(NAME_PREFIX);
        for byte in role_id.as_bytes() {
            name.push_str(&format!("{byte:02x}"));
        }
        Ok(Self(name))
    }

    /// Accepts a stored table name only when it is a role collection.
    pub fn parse(table_name: &str) -> Option<Self> {
        if !COLLECTION_NAME_RE.is_match(table_name) {
            return None;
        }
        let name = Self(table_name.to_string());
        name.role_id().map(|_| name)
    }

    /// Decodes the role id this collection belongs to.
    pub fn role_id(&self) -> Option<String> {
        let hex = self.0.strip_prefix(NAME_PREFIX)?;
        let bytes = hex
            .as_bytes()
            .chunks(2)
            .map(|pair| {
                std::str::from_utf8(pair)
                    .ok()
                    .and_then(|digits| u8::from_str_radix(digits, 16).ok())
            })
            .collect::<Option<Vec<u8>>>()?;
        String::from_utf8(bytes).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn create_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            );",
            self.0
        )
    }

    pub(crate) fn select_entry_sql(&self) -> String {
        format!("SELECT value FROM \"{}\" WHERE key = ?1;", self.0)
    }

    pub(crate) fn upsert_entry_sql(&self) -> String {
        format!(
            "INSERT INTO \"{}\" (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
            self.0
        )
    }
}

impl Display for CollectionName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidRoleId {
    Empty,
    TooLong(usize),
}

impl Display for InvalidRoleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "role id cannot be empty"),
            Self::TooLong(len) => write!(
                f,
                "role id is {len} bytes; at most {MAX_ROLE_ID_BYTES} are allowed"
            ),
        }
    }
}

impl Error for InvalidRoleId {}

#[cfg(test)]
mod tests {
    use super::{CollectionName, InvalidRoleId};

    #[test]
    fn name_is_hex_of_role_id_and_round_trips() {
        let name = CollectionName::for_role("ab").unwrap();
        assert_eq!(name.as_str(), "role_6162");
        assert_eq!(name.role_id().as_deref(), Some("ab"));
    }

    #[test]
    fn hostile_role_ids_stay_inert() {
        let name = CollectionName::for_role("x\"; DROP TABLE roles; --").unwrap();
        assert!(name.as_str().chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        assert_eq!(
            name.role_id().as_deref(),
            Some("x\"; DROP TABLE roles; --")
        );
    }

    #[test]
    fn distinct_ids_never_collide() {
        let first = CollectionName::for_role("a_1").unwrap();
        let second = CollectionName::for_role("a1_").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn parse_only_accepts_role_collections() {
        assert!(CollectionName::parse("roles").is_none());
        assert!(CollectionName::parse("role_6").is_none());
        assert!(CollectionName::parse("role_ZZ").is_none());
        assert!(CollectionName::parse("role_6162").is_some());
    }

    #[test]
    fn blank_and_oversized_ids_are_rejected() {
        assert_eq!(CollectionName::for_role(" "), Err(InvalidRoleId::Empty));
        let long = "r".repeat(129);
        assert_eq!(
            CollectionName::for_role(&long),
            Err(InvalidRoleId::TooLong(129))
        );
    }
}
