//! Use-case error taxonomy shared by POTCAR services.

use crate::model::format::HeaderError;
use crate::model::potcar::PotcarHash;
use crate::repo::{RepoError, UniquenessViolation};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service error for ingest, recovery, family and multi-record use-cases.
#[derive(Debug)]
pub enum ServiceError {
    /// Payload is not a readable POTCAR record.
    Malformed(HeaderError),
    /// Insert would create a second record for one payload.
    Uniqueness(UniquenessViolation),
    /// Lookup matched nothing. Expected for shadows whose payload was removed.
    NotFound(String),
    /// Lookup meant for one record matched several.
    AmbiguousMatch { query: String, matches: u64 },
    /// Strict upload hit a payload that is already stored.
    DuplicateUpload { source: String, hash: PotcarHash },
    /// Requested elements with no covering member in the family.
    MissingElement {
        family: String,
        elements: Vec<String>,
    },
    /// Payload is not available for this record.
    ContentUnavailable(PotcarHash),
    /// A new family needs a description.
    MissingDescription(String),
    FamilyNotFound(String),
    /// Record at this position would not read back as the same single
    /// record from a concatenated file.
    UnterminatedRecord { index: usize },
    /// Lenient upload stopped on a fatal error; files before `source` stay
    /// committed.
    UploadInterrupted {
        source: String,
        found: usize,
        newly_stored: usize,
        skipped: usize,
        cause: Box<ServiceError>,
    },
    /// Upload source is neither a folder nor a supported archive.
    UnsupportedSource(PathBuf),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Shadow metadata could not be (de)serialized.
    Serialization(serde_json::Error),
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(err) => write!(f, "malformed POTCAR: {err}"),
            Self::Uniqueness(violation) => write!(f, "uniqueness violation: {violation}"),
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::AmbiguousMatch { query, matches } => {
                write!(f, "{matches} records match `{query}`; expected exactly one")
            }
            Self::DuplicateUpload { source, hash } => write!(
                f,
                "`{source}` is already stored (hash {hash}); upload stopped"
            ),
            Self::MissingElement { family, elements } => write!(
                f,
                "family `{family}` has no POTCAR for element(s): {}",
                elements.join(", ")
            ),
            Self::ContentUnavailable(hash) => {
                write!(f, "payload for hash {hash} is not available in this store")
            }
            Self::MissingDescription(name) => {
                write!(f, "new family `{name}` requires a description")
            }
            Self::FamilyNotFound(name) => write!(f, "family not found: `{name}`"),
            Self::UnterminatedRecord { index } => write!(
                f,
                "record #{index} would not read back unchanged from a concatenated file"
            ),
            Self::UploadInterrupted {
                source,
                found,
                newly_stored,
                skipped,
                cause,
            } => write!(
                f,
                "upload stopped at `{source}` after {found} file(s) found, {newly_stored} newly stored, {skipped} skipped: {cause}"
            ),
            Self::UnsupportedSource(path) => write!(
                f,
                "`{}` is neither a folder nor a .tar/.tar.gz/.tgz archive",
                path.display()
            ),
            Self::Io { path, source } => write!(f, "I/O failure on `{}`: {source}", path.display()),
            Self::Serialization(err) => write!(f, "shadow metadata serialization failed: {err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Malformed(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::Serialization(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::UploadInterrupted { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(what) => Self::NotFound(what),
            RepoError::AmbiguousMatch { query, matches } => Self::AmbiguousMatch { query, matches },
            RepoError::Uniqueness(violation) => Self::Uniqueness(violation),
            other => Self::Repo(other),
        }
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::from(value))
    }
}

impl From<HeaderError> for ServiceError {
    fn from(value: HeaderError) -> Self {
        Self::Malformed(value)
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

impl ServiceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable snake_case code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::Uniqueness(_) => "uniqueness",
            Self::NotFound(_) => "not_found",
            Self::AmbiguousMatch { .. } => "ambiguous_match",
            Self::DuplicateUpload { .. } => "duplicate_upload",
            Self::MissingElement { .. } => "missing_element",
            Self::ContentUnavailable(_) => "content_unavailable",
            Self::MissingDescription(_) => "missing_description",
            Self::FamilyNotFound(_) => "family_not_found",
            Self::UnterminatedRecord { .. } => "unterminated_record",
            Self::UploadInterrupted { .. } => "upload_interrupted",
            Self::UnsupportedSource(_) => "unsupported_source",
            Self::Io { .. } => "io",
            Self::Serialization(_) => "serialization",
            Self::Repo(_) => "repo",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ServiceError;
    use crate::model::potcar::{PotcarHash, RecordKind};
    use crate::repo::{RepoError, UniquenessReason, UniquenessViolation};

    #[test]
    fn repo_lookup_errors_keep_their_kind() {
        let err = ServiceError::from(RepoError::NotFound("record".to_string()));
        assert!(matches!(err, ServiceError::NotFound(_)));

        let violation = UniquenessViolation {
            kind: RecordKind::Full,
            hash: PotcarHash::of(b"x"),
            reason: UniquenessReason::AttributeCollision,
        };
        let err = ServiceError::from(RepoError::Uniqueness(violation.clone()));
        assert!(matches!(err, ServiceError::Uniqueness(v) if v == violation));
    }

    #[test]
    fn missing_element_lists_every_element() {
        let err = ServiceError::MissingElement {
            family: "pbe".to_string(),
            elements: vec!["Ga".to_string(), "In".to_string()],
        };
        assert_eq!(err.to_string(), "family `pbe` has no POTCAR for element(s): Ga, In");
        assert_eq!(err.code(), "missing_element");
    }
}
