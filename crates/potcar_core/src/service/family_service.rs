//! Family upload and membership queries.
//!
//! # Responsibility
//! - Bulk-upload a folder or archive of payloads into a named family.
//! - Select family members by element, and families by coverage.
//!
//! # Invariants
//! - Content hash is the only identity; file names are report labels.
//! - Strict uploads (`stop_if_existing`) check and write the whole batch
//!   under one write transaction: all files or none.
//! - Lenient uploads commit per file; malformed files and attribute
//!   collisions are reported and skipped. A fatal error keeps the files
//!   committed before it and reports their counts.

use super::error::{ServiceError, ServiceResult};
use super::potcar_service::PotcarService;
use crate::io::source::{collect_candidates, Candidate};
use crate::model::family::{FamilySpec, PotcarFamily};
use crate::model::format::parse_attributes;
use crate::model::potcar::{PotcarRecord, RecordKind};
use crate::repo::family_repo::FamilyRepository;
use crate::repo::record_repo::{RecordIndex, RecordQuery};
use crate::repo::{UniquenessReason, UniquenessViolation};
use log::{info, warn};
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;
use std::time::Instant;

/// Parameters of one family upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Folder or `.tar` / `.tar.gz` / `.tgz` archive.
    pub source: PathBuf,
    pub name: String,
    /// Required when the family does not exist yet.
    pub description: Option<String>,
    /// Fail with `DuplicateUpload` instead of re-filing stored payloads.
    pub stop_if_existing: bool,
}

impl UploadRequest {
    pub fn new(source: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
            description: None,
            stop_if_existing: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn stop_if_existing(mut self, stop_if_existing: bool) -> Self {
        self.stop_if_existing = stop_if_existing;
        self
    }

    fn family_spec(&self) -> FamilySpec {
        FamilySpec {
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }
}

/// A file skipped by a lenient upload.
#[derive(Debug)]
pub struct UploadFailure {
    /// Candidate label (file name or archive member).
    pub source: String,
    pub error: ServiceError,
}

/// Aggregate result of one upload.
#[derive(Debug)]
pub struct UploadReport {
    pub family: PotcarFamily,
    /// Candidate files found in the source.
    pub found: usize,
    /// Payloads that were not stored before this upload.
    pub newly_stored: usize,
    pub failures: Vec<UploadFailure>,
}

impl UploadReport {
    /// `(found, newly_stored)`
    pub fn counts(&self) -> (usize, usize) {
        (self.found, self.newly_stored)
    }
}

/// Family use-cases on top of [`PotcarService`].
pub struct FamilyService<'conn> {
    potcars: PotcarService<'conn>,
}

impl<'conn> FamilyService<'conn> {
    pub fn new(conn: &'conn Connection) -> ServiceResult<Self> {
        Ok(Self {
            potcars: PotcarService::new(conn)?,
        })
    }

    /// The ingest service sharing this connection.
    pub fn potcars(&self) -> &PotcarService<'conn> {
        &self.potcars
    }

    /// Uploads every candidate in `request.source` into the family.
    pub fn upload(&self, request: &UploadRequest) -> ServiceResult<UploadReport> {
        let started_at = Instant::now();
        let result = collect_candidates(&request.source).and_then(|candidates| {
            if request.stop_if_existing {
                self.upload_strict(request, &candidates)
            } else {
                self.upload_lenient(request, &candidates)
            }
        });

        match &result {
            Ok(report) => info!(
                "event=family_upload module=service status=ok family={} strict={} found={} newly_stored={} failed={} duration_ms={}",
                request.name,
                request.stop_if_existing,
                report.found,
                report.newly_stored,
                report.failures.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=family_upload module=service status=error family={} strict={} error_code={} duration_ms={} error={}",
                request.name,
                request.stop_if_existing,
                err.code(),
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    fn upload_strict(
        &self,
        request: &UploadRequest,
        candidates: &[Candidate],
    ) -> ServiceResult<UploadReport> {
        let spec = request.family_spec();
        let family = self.potcars.in_transaction(|| {
            self.preflight_strict(&spec, candidates)?;
            self.potcars.ensure_family(&spec)?;
            for candidate in candidates {
                let outcome = self
                    .potcars
                    .ingest_in_transaction(&candidate.contents, Some(&spec))?;
                if !outcome.full_created {
                    return Err(ServiceError::DuplicateUpload {
                        source: candidate.label.clone(),
                        hash: outcome.full.hash().clone(),
                    });
                }
                log_item(candidate, "stored", outcome.full.symbol());
            }
            self.potcars.ensure_family(&spec)
        })?;

        Ok(UploadReport {
            family,
            found: candidates.len(),
            newly_stored: candidates.len(),
            failures: Vec::new(),
        })
    }

    /// Rejects the batch before its first write. Checks the family
    /// description, stored or repeated hashes, malformed payloads and
    /// attribute collisions. Runs inside the upload transaction.
    fn preflight_strict(&self, spec: &FamilySpec, candidates: &[Candidate]) -> ServiceResult<()> {
        if spec.description.is_none() && self.get_family(&spec.name)?.is_none() {
            return Err(ServiceError::MissingDescription(spec.name.clone()));
        }

        let mut seen_hashes = HashSet::new();
        let mut seen_attributes = HashSet::new();
        for candidate in candidates {
            let attributes = parse_attributes(&candidate.contents)?;
            let already_stored = self.potcars.exists_full(&attributes.hash)?;
            if already_stored || !seen_hashes.insert(attributes.hash.clone()) {
                return Err(ServiceError::DuplicateUpload {
                    source: candidate.label.clone(),
                    hash: attributes.hash,
                });
            }

            let collides_in_store = self
                .potcars
                .records()
                .exists(&RecordQuery::colliding_with(RecordKind::Full, &attributes))?;
            let key = (
                attributes.title.clone(),
                attributes.functional.clone(),
                attributes.element.clone(),
                attributes.symbol.clone(),
            );
            if collides_in_store || !seen_attributes.insert(key) {
                return Err(ServiceError::Uniqueness(UniquenessViolation {
                    kind: RecordKind::Full,
                    hash: attributes.hash,
                    reason: UniquenessReason::AttributeCollision,
                }));
            }
        }
        Ok(())
    }

    fn upload_lenient(
        &self,
        request: &UploadRequest,
        candidates: &[Candidate],
    ) -> ServiceResult<UploadReport> {
        let spec = request.family_spec();
        self.potcars
            .in_transaction(|| self.potcars.ensure_family(&spec))?;

        let mut newly_stored = 0;
        let mut failures = Vec::new();
        for candidate in candidates {
            match self.potcars.ingest_detailed(&candidate.contents, Some(&spec)) {
                Ok(outcome) => {
                    let status = if outcome.full_created { "stored" } else { "existing" };
                    log_item(candidate, status, outcome.full.symbol());
                    if outcome.full_created {
                        newly_stored += 1;
                    }
                }
                Err(error @ (ServiceError::Malformed(_) | ServiceError::Uniqueness(_))) => {
                    warn!(
                        "event=family_upload_item module=service status=skipped source={} error_code={} error={}",
                        candidate.label,
                        error.code(),
                        error
                    );
                    failures.push(UploadFailure {
                        source: candidate.label.clone(),
                        error,
                    });
                }
                Err(err) => {
                    return Err(ServiceError::UploadInterrupted {
                        source: candidate.label.clone(),
                        found: candidates.len(),
                        newly_stored,
                        skipped: failures.len(),
                        cause: Box::new(err),
                    })
                }
            }
        }

        Ok(UploadReport {
            family: self.require_family(&request.name)?,
            found: candidates.len(),
            newly_stored,
            failures,
        })
    }

    pub fn get_family(&self, name: &str) -> ServiceResult<Option<PotcarFamily>> {
        Ok(self.potcars.families().get_family(name)?)
    }

    fn require_family(&self, name: &str) -> ServiceResult<PotcarFamily> {
        self.get_family(name)?
            .ok_or_else(|| ServiceError::FamilyNotFound(name.to_string()))
    }

    /// Members ordered by `element, symbol`.
    pub fn members(&self, family: &str) -> ServiceResult<Vec<PotcarRecord>> {
        self.require_family(family)?;
        Ok(self.potcars.families().list_members(family)?)
    }

    /// Every member whose element is requested.
    ///
    /// Fails with `MissingElement` naming every requested element that no
    /// member covers.
    pub fn members_covering<S: AsRef<str>>(
        &self,
        family: &str,
        elements: &[S],
    ) -> ServiceResult<Vec<PotcarRecord>> {
        let requested: BTreeSet<&str> = elements.iter().map(|element| element.as_ref()).collect();
        let members = self.members(family)?;

        let covered: HashSet<&str> = members.iter().map(PotcarRecord::element).collect();
        let missing = missing_in_order(elements, |element| covered.contains(element));
        if !missing.is_empty() {
            return Err(ServiceError::MissingElement {
                family: family.to_string(),
                elements: missing,
            });
        }

        Ok(members
            .into_iter()
            .filter(|member| requested.contains(member.element()))
            .collect())
    }

    /// All families ordered by name.
    pub fn list_families(&self) -> ServiceResult<Vec<PotcarFamily>> {
        Ok(self.potcars.families().list_families()?)
    }

    /// Families holding at least one member for every requested element.
    pub fn families_covering<S: AsRef<str>>(
        &self,
        elements: &[S],
    ) -> ServiceResult<Vec<PotcarFamily>> {
        let mut covering = Vec::new();
        for family in self.list_families()? {
            let members = self.potcars.families().list_members(&family.name)?;
            let covered: HashSet<&str> = members.iter().map(PotcarRecord::element).collect();
            if elements.iter().all(|element| covered.contains(element.as_ref())) {
                covering.push(family);
            }
        }
        Ok(covering)
    }

    /// Names of the families a full record belongs to.
    pub fn family_names(&self, full: &PotcarRecord) -> ServiceResult<Vec<String>> {
        Ok(self.potcars.families().family_names_of(full.uuid)?)
    }

    /// One member per element, in the caller's element order.
    ///
    /// The member is looked up by symbol: `mapping[element]` when present,
    /// otherwise the element itself.
    pub fn potcars_for_elements<S: AsRef<str>>(
        &self,
        family: &str,
        elements: &[S],
        mapping: &BTreeMap<String, String>,
    ) -> ServiceResult<Vec<PotcarRecord>> {
        self.require_family(family)?;

        let mut found = Vec::with_capacity(elements.len());
        let mut unresolved = HashSet::new();
        for element in elements {
            let element = element.as_ref();
            let symbol = mapping.get(element).map_or(element, String::as_str);
            let query = RecordQuery::full().in_family(family).symbol(symbol);
            match self.potcars.records().find_optional(&query)? {
                Some(record) => found.push(record),
                None => {
                    unresolved.insert(element.to_string());
                }
            }
        }

        let missing = missing_in_order(elements, |element| !unresolved.contains(element));

        if !missing.is_empty() {
            return Err(ServiceError::MissingElement {
                family: family.to_string(),
                elements: missing,
            });
        }
        Ok(found)
    }
}

fn missing_in_order<S: AsRef<str>>(
    elements: &[S],
    is_covered: impl Fn(&str) -> bool,
) -> Vec<String> {
    let mut missing: Vec<String> = Vec::new();
    for element in elements {
        let element = element.as_ref();
        if !is_covered(element) && !missing.iter().any(|known| known == element) {
            missing.push(element.to_string());
        }
    }
    missing
}

fn log_item(candidate: &Candidate, status: &str, symbol: &str) {
    info!(
        "event=family_upload_item module=service status={status} source={} symbol={symbol}",
        candidate.label
    );
}

#[cfg(test)]
mod tests {
    use super::missing_in_order;

    #[test]
    fn missing_elements_keep_request_order_without_repeats() {
        let missing = missing_in_order(&["Ga", "As", "In", "Ga"], |element| element == "As");
        assert_eq!(missing, vec!["Ga".to_string(), "In".to_string()]);
    }
}
