//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for payloads, records
//!   and families.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Repository writes validate records before persistence.
//! - Uniqueness is enforced by the index (UNIQUE indexes), never only by a
//!   caller-side check.
//! - Repository APIs return semantic errors (`NotFound`, `AmbiguousMatch`,
//!   `Uniqueness`) in addition to DB transport errors.

pub mod content_repo;
pub mod family_repo;
pub mod record_repo;
mod schema;

use crate::db::DbError;
use crate::model::potcar::{ContentId, PotcarHash, RecordKind};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Why an insert would break the one-record-per-payload rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniquenessReason {
    /// A record of the same kind already has this hash.
    DuplicateHash,
    /// A record of the same kind has identical metadata but another hash.
    AttributeCollision,
}

/// Details of a rejected insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniquenessViolation {
    pub kind: RecordKind,
    pub hash: PotcarHash,
    pub reason: UniquenessReason,
}

impl Display for UniquenessViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.reason {
            UniquenessReason::DuplicateHash => write!(
                f,
                "a {} record already exists for hash {}",
                self.kind, self.hash
            ),
            UniquenessReason::AttributeCollision => write!(
                f,
                "a {} record with the same attributes but a different hash exists (new hash {})",
                self.kind, self.hash
            ),
        }
    }
}

/// Repository error for payload, record and family persistence.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Io(std::io::Error),
    /// No row matches; the payload describes the lookup.
    NotFound(String),
    /// More than one row matches a single-row lookup.
    AmbiguousMatch { query: String, matches: u64 },
    Uniqueness(UniquenessViolation),
    /// The payload entity already holds its one payload.
    CapacityExceeded(ContentId),
    /// A family with this name already exists.
    DuplicateFamily(String),
    /// Record rejected before reaching SQL.
    InvalidRecord(String),
    /// Persisted data cannot be converted to a valid model.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "payload stream failed: {err}"),
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::AmbiguousMatch { query, matches } => {
                write!(f, "{matches} records match `{query}`; expected exactly one")
            }
            Self::Uniqueness(violation) => write!(f, "uniqueness violation: {violation}"),
            Self::CapacityExceeded(content_id) => {
                write!(f, "payload entity {content_id} already holds a payload")
            }
            Self::DuplicateFamily(name) => write!(f, "family `{name}` already exists"),
            Self::InvalidRecord(message) => write!(f, "invalid record: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "potcar repositories require schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "potcar repositories require table `{table}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
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

impl From<std::io::Error> for RepoError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}
