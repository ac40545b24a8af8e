//! Family contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist named families and their membership of full records.
//! - Answer membership questions in both directions.
//!
//! # Invariants
//! - Only full records can be members.
//! - Adding an existing member is a no-op; membership is a set.
//! - Removing a record drops its memberships (`ON DELETE CASCADE`).

use super::record_repo::{RecordIndex, RecordQuery, SqliteRecordIndex};
use super::schema::ensure_connection_ready;
use super::{RepoError, RepoResult};
use crate::model::family::PotcarFamily;
use crate::model::potcar::{PotcarRecord, RecordId};
use rusqlite::{params, Connection, OptionalExtension, Row};

const FAMILY_SELECT_SQL: &str = "SELECT
    f.name,
    f.description,
    (SELECT COUNT(*) FROM potcar_family_members m WHERE m.family_name = f.name) AS member_count
FROM potcar_families f";

/// Storage contract for families.
pub trait FamilyRepository {
    /// Creates an empty family; fails with `DuplicateFamily` if the name exists.
    fn create_family(&self, name: &str, description: &str) -> RepoResult<PotcarFamily>;
    fn get_family(&self, name: &str) -> RepoResult<Option<PotcarFamily>>;
    fn set_description(&self, name: &str, description: &str) -> RepoResult<()>;
    /// Adds a full record; returns `false` when it was already a member.
    fn add_member(&self, name: &str, record: &PotcarRecord) -> RepoResult<bool>;
    /// Members ordered by `element, symbol`.
    fn list_members(&self, name: &str) -> RepoResult<Vec<PotcarRecord>>;
    /// All families ordered by name.
    fn list_families(&self) -> RepoResult<Vec<PotcarFamily>>;
    /// Names of the families a record belongs to, ordered by name.
    fn family_names_of(&self, record_uuid: RecordId) -> RepoResult<Vec<String>>;
}

/// SQLite-backed family repository.
pub struct SqliteFamilyRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteFamilyRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn require_family(&self, name: &str) -> RepoResult<()> {
        if self.get_family(name)?.is_none() {
            return Err(RepoError::NotFound(format!("family `{name}`")));
        }
        Ok(())
    }
}

impl FamilyRepository for SqliteFamilyRepository<'_> {
    fn create_family(&self, name: &str, description: &str) -> RepoResult<PotcarFamily> {
        if name.trim().is_empty() {
            return Err(RepoError::InvalidRecord(
                "family name must not be empty".to_string(),
            ));
        }
        if self.get_family(name)?.is_some() {
            return Err(RepoError::DuplicateFamily(name.to_string()));
        }

        let inserted = self.conn.execute(
            "INSERT INTO potcar_families (name, description) VALUES (?1, ?2);",
            params![name, description],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                return Err(RepoError::DuplicateFamily(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        }

        Ok(PotcarFamily {
            name: name.to_string(),
            description: description.to_string(),
            member_count: 0,
        })
    }

    fn get_family(&self, name: &str) -> RepoResult<Option<PotcarFamily>> {
        let sql = format!("{FAMILY_SELECT_SQL} WHERE f.name = ?1;");
        self.conn
            .query_row(&sql, [name], |row| Ok(parse_family_row(row)))
            .optional()?
            .transpose()
    }

    fn set_description(&self, name: &str, description: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE potcar_families
             SET description = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE name = ?1;",
            params![name, description],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(format!("family `{name}`")));
        }
        Ok(())
    }

    fn add_member(&self, name: &str, record: &PotcarRecord) -> RepoResult<bool> {
        if !record.is_full() {
            return Err(RepoError::InvalidRecord(format!(
                "only full records can join family `{name}`; {} is a shadow record",
                record.uuid
            )));
        }
        self.require_family(name)?;

        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO potcar_family_members (family_name, record_uuid)
             VALUES (?1, ?2);",
            params![name, record.uuid.to_string()],
        )?;
        if changed > 0 {
            self.conn.execute(
                "UPDATE potcar_families
                 SET updated_at = (strftime('%s', 'now') * 1000)
                 WHERE name = ?1;",
                [name],
            )?;
        }
        Ok(changed > 0)
    }

    fn list_members(&self, name: &str) -> RepoResult<Vec<PotcarRecord>> {
        self.require_family(name)?;
        SqliteRecordIndex::try_new(self.conn)?.list(&RecordQuery::full().in_family(name))
    }

    fn list_families(&self) -> RepoResult<Vec<PotcarFamily>> {
        let sql = format!("{FAMILY_SELECT_SQL} ORDER BY f.name ASC;");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut families = Vec::new();
        while let Some(row) = rows.next()? {
            families.push(parse_family_row(row)?);
        }
        Ok(families)
    }

    fn family_names_of(&self, record_uuid: RecordId) -> RepoResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT family_name
             FROM potcar_family_members
             WHERE record_uuid = ?1
             ORDER BY family_name ASC;",
        )?;
        let names = stmt
            .query_map([record_uuid.to_string()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

fn parse_family_row(row: &Row<'_>) -> RepoResult<PotcarFamily> {
    let member_count: i64 = row.get("member_count")?;
    let member_count = u64::try_from(member_count).map_err(|_| {
        RepoError::InvalidData(format!("negative member count {member_count}"))
    })?;
    Ok(PotcarFamily {
        name: row.get("name")?,
        description: row.get("description")?,
        member_count,
    })
}
