//! Payload archive contracts and SQLite implementation.
//!
//! # Responsibility
//! - Keep exactly one immutable POTCAR payload per content entity.
//! - Expose stored payloads as byte streams.
//!
//! # Invariants
//! - A populated entity never accepts a second payload (`CapacityExceeded`).
//! - Every `open` returns an independent stream positioned at byte 0.
//! - Payload bytes are stored verbatim; hashing happens above this layer.

use super::schema::ensure_connection_ready;
use super::{RepoError, RepoResult};
use crate::model::potcar::ContentId;
use rusqlite::{params, Connection, DatabaseName, OptionalExtension};
use std::io::Read;
use uuid::Uuid;

/// Archive of immutable payload entities.
pub trait ContentStore {
    /// Creates a new entity holding `payload` and returns its id.
    fn store(&self, payload: &[u8]) -> RepoResult<ContentId> {
        let content_id = Uuid::new_v4();
        self.attach(content_id, payload)?;
        Ok(content_id)
    }
    /// Places `payload` into the entity `content_id`; fails when it is
    /// already populated.
    fn attach(&self, content_id: ContentId, payload: &[u8]) -> RepoResult<()>;
    /// Opens a fresh read stream over the payload.
    fn open(&self, content_id: ContentId) -> RepoResult<Box<dyn Read + '_>>;
    /// Reads the whole payload into memory.
    fn read_all(&self, content_id: ContentId) -> RepoResult<Vec<u8>> {
        let mut stream = self.open(content_id)?;
        let mut payload = Vec::new();
        stream.read_to_end(&mut payload)?;
        Ok(payload)
    }
    fn contains(&self, content_id: ContentId) -> RepoResult<bool>;
    /// Drops the entity and its payload.
    fn remove(&self, content_id: ContentId) -> RepoResult<()>;
}

/// SQLite-backed payload archive using incremental BLOB I/O for reads.
pub struct SqliteContentStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContentStore<'conn> {
    /// Creates the store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn rowid_of(&self, content_id: ContentId) -> RepoResult<i64> {
        self.conn
            .query_row(
                "SELECT rowid FROM potcar_contents WHERE content_id = ?1;",
                [content_id.to_string()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| RepoError::NotFound(format!("payload {content_id}")))
    }
}

impl ContentStore for SqliteContentStore<'_> {
    fn attach(&self, content_id: ContentId, payload: &[u8]) -> RepoResult<()> {
        if self.contains(content_id)? {
            return Err(RepoError::CapacityExceeded(content_id));
        }

        let size = i64::try_from(payload.len()).map_err(|_| {
            RepoError::InvalidRecord(format!("payload of {} bytes is too large", payload.len()))
        })?;
        let inserted = self.conn.execute(
            "INSERT INTO potcar_contents (content_id, payload, size_bytes)
             VALUES (?1, ?2, ?3);",
            params![content_id.to_string(), payload, size],
        );

        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                Err(RepoError::CapacityExceeded(content_id))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn open(&self, content_id: ContentId) -> RepoResult<Box<dyn Read + '_>> {
        let rowid = self.rowid_of(content_id)?;
        let blob = self
            .conn
            .blob_open(DatabaseName::Main, "potcar_contents", "payload", rowid, true)?;
        Ok(Box::new(blob))
    }

    fn contains(&self, content_id: ContentId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM potcar_contents WHERE content_id = ?1);",
            [content_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn remove(&self, content_id: ContentId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM potcar_contents WHERE content_id = ?1;",
            [content_id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(format!("payload {content_id}")));
        }
        Ok(())
    }
}
