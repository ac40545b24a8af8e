//! Record index contracts and SQLite implementation.
//!
//! # Responsibility
//! - Map the five identifying attributes (plus record kind and family
//!   membership) to lookups through a typed query builder.
//! - Enforce one record per hash and per attribute set, per record kind.
//!
//! # Invariants
//! - `find` returns exactly one row or fails with `NotFound`/`AmbiguousMatch`.
//! - Full and shadow records live in independent uniqueness namespaces.
//! - UNIQUE indexes on `(kind, hash)` and `(kind, title, functional, element,
//!   symbol)` are the final arbiter; a losing concurrent writer gets
//!   `RepoError::Uniqueness`, never a merged row.

use super::schema::ensure_connection_ready;
use super::{RepoError, RepoResult, UniquenessReason, UniquenessViolation};
use crate::model::potcar::{PotcarAttributes, PotcarHash, PotcarRecord, RecordId, RecordKind};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const RECORD_SELECT_SQL: &str = "SELECT
    r.uuid,
    r.kind,
    r.hash,
    r.title,
    r.functional,
    r.element,
    r.symbol,
    r.content_id
FROM potcar_records r";

/// Typed filter over the record index.
///
/// Every `Some` field narrows the match; an empty query matches every row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    pub kind: Option<RecordKind>,
    pub hash: Option<PotcarHash>,
    pub title: Option<String>,
    pub functional: Option<String>,
    pub element: Option<String>,
    pub symbol: Option<String>,
    /// Only records that are members of this family.
    pub family: Option<String>,
}

impl RecordQuery {
    pub fn full() -> Self {
        Self::of_kind(RecordKind::Full)
    }

    pub fn shadow() -> Self {
        Self::of_kind(RecordKind::Shadow)
    }

    pub fn of_kind(kind: RecordKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Query matching the complete attribute set, hash included.
    pub fn matching(kind: RecordKind, attributes: &PotcarAttributes) -> Self {
        Self::colliding_with(kind, attributes).hash(attributes.hash.clone())
    }

    /// Query matching every attribute except the hash.
    pub fn colliding_with(kind: RecordKind, attributes: &PotcarAttributes) -> Self {
        Self::of_kind(kind)
            .title(attributes.title.as_str())
            .functional(attributes.functional.as_str())
            .element(attributes.element.as_str())
            .symbol(attributes.symbol.as_str())
    }

    pub fn hash(mut self, hash: PotcarHash) -> Self {
        self.hash = Some(hash);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn functional(mut self, functional: impl Into<String>) -> Self {
        self.functional = Some(functional.into());
        self
    }

    pub fn element(mut self, element: impl Into<String>) -> Self {
        self.element = Some(element.into());
        self
    }

    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn in_family(mut self, family: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self
    }

    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut sql = String::from(" WHERE 1 = 1");
        let mut bind_values = Vec::new();

        let text_filters = [
            ("r.kind", self.kind.map(|kind| kind.as_str().to_string())),
            ("r.hash", self.hash.as_ref().map(|hash| hash.to_string())),
            ("r.title", self.title.clone()),
            ("r.functional", self.functional.clone()),
            ("r.element", self.element.clone()),
            ("r.symbol", self.symbol.clone()),
        ];
        for (column, value) in text_filters {
            if let Some(value) = value {
                sql.push_str(&format!(" AND {column} = ?"));
                bind_values.push(Value::Text(value));
            }
        }

        if let Some(family) = self.family.as_ref() {
            sql.push_str(
                " AND EXISTS (
                    SELECT 1
                    FROM potcar_family_members m
                    WHERE m.record_uuid = r.uuid
                      AND m.family_name = ?
                )",
            );
            bind_values.push(Value::Text(family.clone()));
        }

        (sql, bind_values)
    }
}

impl Display for RecordQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(kind) = self.kind {
            parts.push(format!("kind={kind}"));
        }
        if let Some(hash) = &self.hash {
            parts.push(format!("hash={hash}"));
        }
        for (name, value) in [
            ("title", &self.title),
            ("functional", &self.functional),
            ("element", &self.element),
            ("symbol", &self.symbol),
            ("family", &self.family),
        ] {
            if let Some(value) = value {
                parts.push(format!("{name}={value}"));
            }
        }
        if parts.is_empty() {
            f.write_str("<any record>")
        } else {
            f.write_str(&parts.join(" "))
        }
    }
}

/// Attribute-based lookup and insertion of full and shadow records.
pub trait RecordIndex {
    /// Inserts one record, rejecting duplicates and attribute collisions.
    fn insert(&self, record: &PotcarRecord) -> RepoResult<()>;
    /// Returns the single record matching `query`.
    fn find(&self, query: &RecordQuery) -> RepoResult<PotcarRecord>;
    /// Like `find`, but zero matches is `Ok(None)`.
    fn find_optional(&self, query: &RecordQuery) -> RepoResult<Option<PotcarRecord>>;
    fn exists(&self, query: &RecordQuery) -> RepoResult<bool>;
    fn count(&self, query: &RecordQuery) -> RepoResult<u64>;
    /// Lists all matches ordered by `element, symbol, uuid`.
    fn list(&self, query: &RecordQuery) -> RepoResult<Vec<PotcarRecord>>;
    /// Removes one record by id.
    fn delete(&self, uuid: RecordId) -> RepoResult<()>;
}

/// SQLite-backed record index.
pub struct SqliteRecordIndex<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRecordIndex<'conn> {
    /// Creates the index from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn select(&self, query: &RecordQuery, limit: Option<u32>) -> RepoResult<Vec<PotcarRecord>> {
        let (where_sql, mut bind_values) = query.where_clause();
        let mut sql = format!(
            "{RECORD_SELECT_SQL}{where_sql} ORDER BY r.element ASC, r.symbol ASC, r.uuid ASC"
        );
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record_row(row)?);
        }
        Ok(records)
    }

    fn violation(record: &PotcarRecord, reason: UniquenessReason) -> RepoError {
        RepoError::Uniqueness(UniquenessViolation {
            kind: record.kind,
            hash: record.hash().clone(),
            reason,
        })
    }
}

impl RecordIndex for SqliteRecordIndex<'_> {
    fn insert(&self, record: &PotcarRecord) -> RepoResult<()> {
        record.validate().map_err(RepoError::InvalidRecord)?;

        if self.exists(&RecordQuery::of_kind(record.kind).hash(record.hash().clone()))? {
            return Err(Self::violation(record, UniquenessReason::DuplicateHash));
        }
        if self.exists(&RecordQuery::colliding_with(record.kind, &record.attributes))? {
            return Err(Self::violation(record, UniquenessReason::AttributeCollision));
        }

        let attributes = &record.attributes;
        self.conn
            .execute(
                "INSERT INTO potcar_records (
                    uuid,
                    kind,
                    hash,
                    title,
                    functional,
                    element,
                    symbol,
                    content_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
                params![
                    record.uuid.to_string(),
                    record.kind.as_str(),
                    attributes.hash.as_str(),
                    attributes.title.as_str(),
                    attributes.functional.as_str(),
                    attributes.element.as_str(),
                    attributes.symbol.as_str(),
                    record.content_id.map(|content_id| content_id.to_string()),
                ],
            )
            .map_err(|err| map_insert_error(err, record))?;

        Ok(())
    }

    fn find(&self, query: &RecordQuery) -> RepoResult<PotcarRecord> {
        let mut records = self.select(query, Some(2))?;
        match records.len() {
            0 => Err(RepoError::NotFound(format!("record matching `{query}`"))),
            1 => Ok(records.remove(0)),
            _ => Err(RepoError::AmbiguousMatch {
                query: query.to_string(),
                matches: self.count(query)?,
            }),
        }
    }

    fn find_optional(&self, query: &RecordQuery) -> RepoResult<Option<PotcarRecord>> {
        match self.find(query) {
            Ok(record) => Ok(Some(record)),
            Err(RepoError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn exists(&self, query: &RecordQuery) -> RepoResult<bool> {
        Ok(self.count(query)? > 0)
    }

    fn count(&self, query: &RecordQuery) -> RepoResult<u64> {
        let (where_sql, bind_values) = query.where_clause();
        let sql = format!("SELECT COUNT(*) FROM potcar_records r{where_sql};");
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(bind_values), |row| row.get(0))?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative record count {count}")))
    }

    fn list(&self, query: &RecordQuery) -> RepoResult<Vec<PotcarRecord>> {
        self.select(query, None)
    }

    fn delete(&self, uuid: RecordId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM potcar_records WHERE uuid = ?1;",
            [uuid.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(format!("record {uuid}")));
        }
        Ok(())
    }
}

pub(crate) fn parse_record_row(row: &Row<'_>) -> RepoResult<PotcarRecord> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = parse_uuid(&uuid_text, "potcar_records.uuid")?;

    let kind_text: String = row.get("kind")?;
    let kind = RecordKind::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid record kind `{kind_text}` in potcar_records.kind"))
    })?;

    let hash_text: String = row.get("hash")?;
    let hash = PotcarHash::from_hex(&hash_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid hash `{hash_text}` in potcar_records.hash"))
    })?;

    let content_id = row
        .get::<_, Option<String>>("content_id")?
        .map(|value| parse_uuid(&value, "potcar_records.content_id"))
        .transpose()?;

    let record = PotcarRecord {
        uuid,
        kind,
        attributes: PotcarAttributes {
            hash,
            title: row.get("title")?,
            functional: row.get("functional")?,
            element: row.get("element")?,
            symbol: row.get("symbol")?,
        },
        content_id,
    };
    record.validate().map_err(RepoError::InvalidData)?;
    Ok(record)
}

fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn map_insert_error(err: rusqlite::Error, record: &PotcarRecord) -> RepoError {
    if let rusqlite::Error::SqliteFailure(failure, message) = &err {
        if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
            let reason = if message
                .as_deref()
                .is_some_and(|message| message.contains("potcar_records.hash"))
            {
                UniquenessReason::DuplicateHash
            } else {
                UniquenessReason::AttributeCollision
            };
            return SqliteRecordIndex::violation(record, reason);
        }
    }
    RepoError::from(err)
}

#[cfg(test)]
mod tests {
    use super::RecordQuery;
    use crate::model::potcar::{PotcarAttributes, PotcarHash, RecordKind};

    #[test]
    fn matching_query_pins_every_attribute() {
        let attributes = PotcarAttributes {
            hash: PotcarHash::of(b"x"),
            title: "PAW_PBE As 22Sep2009".to_string(),
            functional: "PBE".to_string(),
            element: "As".to_string(),
            symbol: "As".to_string(),
        };
        let query = RecordQuery::matching(RecordKind::Full, &attributes);
        assert_eq!(query.kind, Some(RecordKind::Full));
        assert_eq!(query.hash.as_ref(), Some(&attributes.hash));
        assert_eq!(query.symbol.as_deref(), Some("As"));
        assert!(query.family.is_none());

        let (sql, binds) = query.where_clause();
        assert_eq!(binds.len(), 6);
        assert!(sql.contains("r.functional = ?"));
    }

    #[test]
    fn empty_query_describes_itself() {
        assert_eq!(RecordQuery::default().to_string(), "<any record>");
        assert_eq!(
            RecordQuery::full().element("In").in_family("pbe").to_string(),
            "kind=full element=In family=pbe"
        );
    }
}
