//! Single-record I/O wrapper.
//!
//! # Responsibility
//! - Resolve a path, raw contents or a stored record into one uniform view
//!   of a POTCAR: hash, attributes and (when available) payload.
//!
//! # Invariants
//! - Identity and equality are the content hash only.
//! - A wrapper built from a shadow whose payload is absent stays usable for
//!   identity and attributes; only `content()` fails.
//! - Resolving never writes; `ingest()` is the only persisting operation.

use crate::model::format::parse_attributes;
use crate::model::potcar::{PotcarAttributes, PotcarHash, PotcarRecord};
use crate::repo::record_repo::RecordQuery;
use crate::service::potcar_service::PotcarService;
use crate::service::{ServiceError, ServiceResult};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Input accepted by [`PotcarIo::resolve`].
#[derive(Debug, Clone)]
pub enum RecordSource {
    Path(PathBuf),
    Contents(Vec<u8>),
    Record(PotcarRecord),
}

impl From<&Path> for RecordSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<PathBuf> for RecordSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<Vec<u8>> for RecordSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Contents(value)
    }
}

impl From<&[u8]> for RecordSource {
    fn from(value: &[u8]) -> Self {
        Self::Contents(value.to_vec())
    }
}

impl From<PotcarRecord> for RecordSource {
    fn from(value: PotcarRecord) -> Self {
        Self::Record(value)
    }
}

/// Uniform view over one POTCAR, stored or not.
#[derive(Debug, Clone)]
pub struct PotcarIo {
    attributes: PotcarAttributes,
    content: Option<Vec<u8>>,
    full: Option<PotcarRecord>,
}

impl PotcarIo {
    /// Resolves `source` against the store behind `service`.
    ///
    /// - Path / contents: hashed and parsed; linked to the full record when
    ///   the hash is stored, otherwise left unstored.
    /// - Full record: payload loaded from the store.
    /// - Shadow record: recovered through its attributes; metadata-only when
    ///   the payload is absent.
    pub fn resolve(
        service: &PotcarService<'_>,
        source: impl Into<RecordSource>,
    ) -> ServiceResult<Self> {
        match source.into() {
            RecordSource::Path(path) => {
                let contents =
                    std::fs::read(&path).map_err(|err| ServiceError::io(path.as_path(), err))?;
                Self::from_contents(service, contents)
            }
            RecordSource::Contents(contents) => Self::from_contents(service, contents),
            RecordSource::Record(record) if record.is_full() => Self::from_full(service, record),
            RecordSource::Record(shadow) => match service.recover_full(&shadow) {
                Ok(full) => Self::from_full(service, full),
                Err(ServiceError::NotFound(_)) => Ok(Self {
                    attributes: shadow.attributes,
                    content: None,
                    full: None,
                }),
                Err(err) => Err(err),
            },
        }
    }

    fn from_contents(service: &PotcarService<'_>, contents: Vec<u8>) -> ServiceResult<Self> {
        let hash = PotcarHash::of(&contents);
        let full = service.find_full_by_hash(&hash)?;
        let attributes = match &full {
            Some(full) => full.attributes.clone(),
            None => parse_attributes(&contents)?,
        };
        Ok(Self {
            attributes,
            content: Some(contents),
            full,
        })
    }

    fn from_full(service: &PotcarService<'_>, full: PotcarRecord) -> ServiceResult<Self> {
        let content = service.read_content(&full)?;
        Ok(Self {
            attributes: full.attributes.clone(),
            content: Some(content),
            full: Some(full),
        })
    }

    pub fn hash(&self) -> &PotcarHash {
        &self.attributes.hash
    }

    pub fn attributes(&self) -> &PotcarAttributes {
        &self.attributes
    }

    pub fn symbol(&self) -> &str {
        &self.attributes.symbol
    }

    pub fn element(&self) -> &str {
        &self.attributes.element
    }

    /// Payload bytes; `ContentUnavailable` for metadata-only wrappers.
    pub fn content(&self) -> ServiceResult<&[u8]> {
        self.content
            .as_deref()
            .ok_or_else(|| ServiceError::ContentUnavailable(self.attributes.hash.clone()))
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    /// Whether a full record for this payload exists in the store.
    pub fn is_stored(&self) -> bool {
        self.full.is_some()
    }

    pub fn full_record(&self) -> Option<&PotcarRecord> {
        self.full.as_ref()
    }

    /// Persists an unstored wrapper and links it to the new full record.
    ///
    /// A wrapper that is already stored is returned unchanged.
    pub fn ingest(&mut self, service: &PotcarService<'_>) -> ServiceResult<&PotcarRecord> {
        if self.full.is_none() {
            let outcome = service.ingest_detailed(self.content()?, None)?;
            self.attributes = outcome.full.attributes.clone();
            self.full = Some(outcome.full);
        }
        self.full
            .as_ref()
            .ok_or_else(|| {
                ServiceError::NotFound(format!("full record for hash {}", self.attributes.hash))
            })
    }

    /// Shadow record of a stored wrapper, derived on demand.
    pub fn shadow_record(&self, service: &PotcarService<'_>) -> ServiceResult<PotcarRecord> {
        match &self.full {
            Some(full) => Ok(service.get_or_create_shadow(full)?.0),
            None => service.find_shadow(&RecordQuery::shadow().hash(self.attributes.hash.clone())),
        }
    }
}

impl PartialEq for PotcarIo {
    fn eq(&self, other: &Self) -> bool {
        self.attributes.hash == other.attributes.hash
    }
}

impl Eq for PotcarIo {}

impl Hash for PotcarIo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.attributes.hash.hash(state);
    }
}
