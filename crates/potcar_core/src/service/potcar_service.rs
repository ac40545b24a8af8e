//! POTCAR ingest and recovery service.
//!
//! # Responsibility
//! - Turn raw payloads into full records (with stored payload) and their
//!   shadow records.
//! - Recover the full record behind a shadow record.
//! - Export and import license-neutral shadow metadata.
//!
//! # Invariants
//! - Each `ingest` runs in one `BEGIN IMMEDIATE` transaction; a failure
//!   leaves no partial payload, record or membership behind.
//! - Re-ingesting a stored payload creates nothing new and returns the same
//!   shadow record.
//! - Shadow records never reference their full record; recovery always goes
//!   through an attribute query.

use super::error::{ServiceError, ServiceResult};
use crate::model::family::{FamilySpec, PotcarFamily};
use crate::model::format::parse_header;
use crate::model::potcar::{PotcarHash, PotcarRecord, RecordKind};
use crate::repo::content_repo::{ContentStore, SqliteContentStore};
use crate::repo::family_repo::{FamilyRepository, SqliteFamilyRepository};
use crate::repo::record_repo::{RecordIndex, RecordQuery, SqliteRecordIndex};
use crate::repo::{RepoError, UniquenessReason, UniquenessViolation};
use log::{info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::io::Read;
use std::time::Instant;
use uuid::Uuid;

/// Result of one ingest with creation flags for both tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub full: PotcarRecord,
    pub shadow: PotcarRecord,
    /// `true` when the payload was not stored before this call.
    pub full_created: bool,
    pub shadow_created: bool,
}

/// Ingest/recovery facade over the three SQLite repositories.
pub struct PotcarService<'conn> {
    conn: &'conn Connection,
    contents: SqliteContentStore<'conn>,
    records: SqliteRecordIndex<'conn>,
    families: SqliteFamilyRepository<'conn>,
}

impl<'conn> PotcarService<'conn> {
    /// Creates the service over a migrated connection.
    pub fn new(conn: &'conn Connection) -> ServiceResult<Self> {
        Ok(Self {
            conn,
            contents: SqliteContentStore::try_new(conn)?,
            records: SqliteRecordIndex::try_new(conn)?,
            families: SqliteFamilyRepository::try_new(conn)?,
        })
    }

    pub(crate) fn records(&self) -> &SqliteRecordIndex<'conn> {
        &self.records
    }

    pub(crate) fn families(&self) -> &SqliteFamilyRepository<'conn> {
        &self.families
    }

    /// Runs `work` inside one IMMEDIATE transaction; rolls back on error.
    pub(crate) fn in_transaction<T>(
        &self,
        work: impl FnOnce() -> ServiceResult<T>,
    ) -> ServiceResult<T> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let value = work()?;
        tx.commit()?;
        Ok(value)
    }

    /// Stores `payload` (if new), optionally files it into a family and
    /// returns its shadow record.
    pub fn ingest(
        &self,
        payload: &[u8],
        family: Option<&FamilySpec>,
    ) -> ServiceResult<PotcarRecord> {
        Ok(self.ingest_detailed(payload, family)?.shadow)
    }

    /// Same as [`PotcarService::ingest`] but reports what was created.
    pub fn ingest_detailed(
        &self,
        payload: &[u8],
        family: Option<&FamilySpec>,
    ) -> ServiceResult<IngestOutcome> {
        let started_at = Instant::now();
        let result = self.in_transaction(|| self.ingest_in_transaction(payload, family));
        match &result {
            Ok(outcome) => info!(
                "event=potcar_ingest module=service status=ok hash={} symbol={} full_created={} shadow_created={} family={} duration_ms={}",
                outcome.full.hash(),
                outcome.full.symbol(),
                outcome.full_created,
                outcome.shadow_created,
                family.map_or("-", |spec| spec.name.as_str()),
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=potcar_ingest module=service status=error error_code={} duration_ms={} error={}",
                err.code(),
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    /// Ingest steps without transaction control; callers own the transaction.
    pub(crate) fn ingest_in_transaction(
        &self,
        payload: &[u8],
        family: Option<&FamilySpec>,
    ) -> ServiceResult<IngestOutcome> {
        let (full, full_created) = self.get_or_create_full(payload)?;
        if let Some(spec) = family {
            self.ensure_family(spec)?;
            self.families.add_member(&spec.name, &full)?;
        }
        let (shadow, shadow_created) = self.get_or_create_shadow(&full)?;
        Ok(IngestOutcome {
            full,
            shadow,
            full_created,
            shadow_created,
        })
    }

    /// Returns the full record for `payload`, storing the payload first when
    /// its hash is unknown.
    pub fn get_or_create_full(&self, payload: &[u8]) -> ServiceResult<(PotcarRecord, bool)> {
        let hash = PotcarHash::of(payload);
        if let Some(full) = self.records.find_optional(&RecordQuery::full().hash(hash.clone()))? {
            return Ok((full, false));
        }

        let attributes = parse_header(payload)?.into_attributes(hash);
        if self
            .records
            .exists(&RecordQuery::colliding_with(RecordKind::Full, &attributes))?
        {
            // Checked before storing so a rejected payload never reaches the archive.
            return Err(ServiceError::Uniqueness(UniquenessViolation {
                kind: RecordKind::Full,
                hash: attributes.hash,
                reason: UniquenessReason::AttributeCollision,
            }));
        }

        let content_id = self.contents.store(payload)?;
        let full = PotcarRecord::new_full(attributes, content_id);
        self.records.insert(&full)?;
        Ok((full, true))
    }

    /// Returns the shadow record for `full`, deriving it when missing.
    pub fn get_or_create_shadow(&self, full: &PotcarRecord) -> ServiceResult<(PotcarRecord, bool)> {
        let query = RecordQuery::shadow().hash(full.hash().clone());
        if let Some(shadow) = self.records.find_optional(&query)? {
            return Ok((shadow, false));
        }
        let shadow = PotcarRecord::shadow_of(full);
        self.records.insert(&shadow)?;
        Ok((shadow, true))
    }

    /// Returns the target family, creating it or updating its description.
    pub fn ensure_family(&self, spec: &FamilySpec) -> ServiceResult<PotcarFamily> {
        match self.families.get_family(&spec.name)? {
            Some(mut existing) => {
                if let Some(description) = spec.description.as_deref() {
                    if description != existing.description {
                        self.families.set_description(&spec.name, description)?;
                        existing.description = description.to_string();
                    }
                }
                Ok(existing)
            }
            None => {
                let description = spec
                    .description
                    .as_deref()
                    .ok_or_else(|| ServiceError::MissingDescription(spec.name.clone()))?;
                Ok(self.families.create_family(&spec.name, description)?)
            }
        }
    }

    /// Finds the full record carrying exactly the attributes of `shadow`.
    ///
    /// `NotFound` means the payload is not (or no longer) in this store.
    pub fn recover_full(&self, shadow: &PotcarRecord) -> ServiceResult<PotcarRecord> {
        let query = RecordQuery::matching(RecordKind::Full, &shadow.attributes);
        let result = self.records.find(&query).map_err(ServiceError::from);
        match &result {
            Ok(full) => info!(
                "event=potcar_recover module=service status=ok hash={} full={}",
                shadow.hash(),
                full.uuid
            ),
            Err(err) => info!(
                "event=potcar_recover module=service status=miss hash={} error_code={}",
                shadow.hash(),
                err.code()
            ),
        }
        result
    }

    /// Single full record matching `query` (kind is forced to full).
    pub fn find_full(&self, query: &RecordQuery) -> ServiceResult<PotcarRecord> {
        let query = with_kind(query, RecordKind::Full);
        Ok(self.records.find(&query)?)
    }

    /// Single shadow record matching `query` (kind is forced to shadow).
    pub fn find_shadow(&self, query: &RecordQuery) -> ServiceResult<PotcarRecord> {
        let query = with_kind(query, RecordKind::Shadow);
        Ok(self.records.find(&query)?)
    }

    /// Full record stored for `hash`, if any.
    pub fn find_full_by_hash(&self, hash: &PotcarHash) -> ServiceResult<Option<PotcarRecord>> {
        Ok(self
            .records
            .find_optional(&RecordQuery::full().hash(hash.clone()))?)
    }

    pub fn exists_full(&self, hash: &PotcarHash) -> ServiceResult<bool> {
        Ok(self.records.exists(&RecordQuery::full().hash(hash.clone()))?)
    }

    pub fn count(&self, query: &RecordQuery) -> ServiceResult<u64> {
        Ok(self.records.count(query)?)
    }

    pub fn list(&self, query: &RecordQuery) -> ServiceResult<Vec<PotcarRecord>> {
        Ok(self.records.list(query)?)
    }

    /// Reads the whole payload of a full record.
    pub fn read_content(&self, full: &PotcarRecord) -> ServiceResult<Vec<u8>> {
        let content_id = full
            .content_id
            .ok_or_else(|| ServiceError::ContentUnavailable(full.hash().clone()))?;
        Ok(self.contents.read_all(content_id)?)
    }

    /// Opens a fresh stream over the payload of a full record.
    pub fn open_content(&self, full: &PotcarRecord) -> ServiceResult<Box<dyn Read + '_>> {
        let content_id = full
            .content_id
            .ok_or_else(|| ServiceError::ContentUnavailable(full.hash().clone()))?;
        Ok(self.contents.open(content_id)?)
    }

    /// Deletes the full record, its memberships and its payload.
    ///
    /// The shadow record stays; afterwards it resolves to metadata only.
    pub fn remove_full(&self, hash: &PotcarHash) -> ServiceResult<PotcarRecord> {
        let removed = self.in_transaction(|| {
            let full = self.records.find(&RecordQuery::full().hash(hash.clone()))?;
            self.records.delete(full.uuid)?;
            if let Some(content_id) = full.content_id {
                self.contents.remove(content_id)?;
            }
            Ok(full)
        })?;
        info!(
            "event=potcar_remove module=service status=ok hash={} symbol={}",
            removed.hash(),
            removed.symbol()
        );
        Ok(removed)
    }

    /// All shadow records ordered by `element, symbol`.
    pub fn export_shadows(&self) -> ServiceResult<Vec<PotcarRecord>> {
        self.list(&RecordQuery::shadow())
    }

    /// Shadow records as a pretty-printed JSON array.
    pub fn export_shadows_json(&self) -> ServiceResult<String> {
        Ok(serde_json::to_string_pretty(&self.export_shadows()?)?)
    }

    /// Inserts shadow records exported from another store.
    ///
    /// Records whose hash is already known as a shadow are skipped. Returns
    /// the number of newly inserted shadows. The whole import is atomic.
    pub fn import_shadows(&self, shadows: &[PotcarRecord]) -> ServiceResult<usize> {
        let imported = self.in_transaction(|| {
            let mut imported = 0;
            for shadow in shadows {
                if shadow.kind != RecordKind::Shadow || shadow.content_id.is_some() {
                    return Err(RepoError::InvalidRecord(format!(
                        "record {} is not a shadow record",
                        shadow.uuid
                    ))
                    .into());
                }
                if PotcarHash::from_hex(shadow.hash().as_str()).is_none() {
                    return Err(RepoError::InvalidRecord(format!(
                        "record {} has an invalid hash `{}`",
                        shadow.uuid,
                        shadow.hash()
                    ))
                    .into());
                }
                if self
                    .records
                    .exists(&RecordQuery::shadow().hash(shadow.hash().clone()))?
                {
                    continue;
                }
                let fresh = PotcarRecord {
                    uuid: Uuid::new_v4(),
                    ..shadow.clone()
                };
                self.records.insert(&fresh)?;
                imported += 1;
            }
            Ok(imported)
        })?;
        info!(
            "event=shadow_import module=service status=ok received={} imported={}",
            shadows.len(),
            imported
        );
        Ok(imported)
    }

    /// Parses a JSON array produced by [`PotcarService::export_shadows_json`]
    /// and imports it.
    pub fn import_shadows_json(&self, json: &str) -> ServiceResult<usize> {
        let shadows: Vec<PotcarRecord> = serde_json::from_str(json)?;
        self.import_shadows(&shadows)
    }
}

fn with_kind(query: &RecordQuery, kind: RecordKind) -> RecordQuery {
    RecordQuery {
        kind: Some(kind),
        ..query.clone()
    }
}
