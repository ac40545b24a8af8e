mod common;

use potcar_core::db::open_db_in_memory;
use potcar_core::model::format::parse_attributes;
use potcar_core::repo::content_repo::{ContentStore, SqliteContentStore};
use potcar_core::repo::record_repo::{RecordIndex, SqliteRecordIndex};
use potcar_core::{PotcarRecord, RecordKind, RecordQuery, RepoError, UniquenessReason};
use rusqlite::Connection;

fn stored_full(conn: &Connection, payload: &[u8]) -> PotcarRecord {
    let contents = SqliteContentStore::try_new(conn).unwrap();
    let content_id = contents.store(payload).unwrap();
    PotcarRecord::new_full(parse_attributes(payload).unwrap(), content_id)
}

#[test]
fn insert_then_find_by_each_attribute() {
    let conn = open_db_in_memory().unwrap();
    let index = SqliteRecordIndex::try_new(&conn).unwrap();
    let full = stored_full(&conn, &common::pbe("In_d", "In"));
    index.insert(&full).unwrap();

    let by_hash = index
        .find(&RecordQuery::full().hash(full.hash().clone()))
        .unwrap();
    assert_eq!(by_hash, full);

    let by_symbol = index.find(&RecordQuery::full().symbol("In_d")).unwrap();
    assert_eq!(by_symbol.uuid, full.uuid);
    assert_eq!(by_symbol.functional(), "PBE");
    assert_eq!(by_symbol.element(), "In");
    assert_eq!(by_symbol.title(), "PAW_PBE In_d 06Sep2000");

    assert!(index.exists(&RecordQuery::full().element("In")).unwrap());
    assert!(!index.exists(&RecordQuery::full().element("Ga")).unwrap());
    assert_eq!(index.count(&RecordQuery::default()).unwrap(), 1);
}

#[test]
fn find_distinguishes_zero_and_many_matches() {
    let conn = open_db_in_memory().unwrap();
    let index = SqliteRecordIndex::try_new(&conn).unwrap();
    index
        .insert(&stored_full(&conn, &common::pbe("In_d", "In")))
        .unwrap();
    index
        .insert(&stored_full(&conn, &common::pbe("In", "In")))
        .unwrap();

    let err = index.find(&RecordQuery::full().symbol("Ga")).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(_)));

    let err = index.find(&RecordQuery::full().element("In")).unwrap_err();
    match err {
        RepoError::AmbiguousMatch { matches, .. } => assert_eq!(matches, 2),
        other => panic!("unexpected error: {other}"),
    }

    let listed = index.list(&RecordQuery::full().element("In")).unwrap();
    let symbols: Vec<_> = listed.iter().map(PotcarRecord::symbol).collect();
    assert_eq!(symbols, vec!["In", "In_d"]);
    assert!(index
        .find_optional(&RecordQuery::full().symbol("Ga"))
        .unwrap()
        .is_none());
}

#[test]
fn duplicate_hash_is_rejected_per_kind() {
    let conn = open_db_in_memory().unwrap();
    let index = SqliteRecordIndex::try_new(&conn).unwrap();
    let payload = common::pbe("As", "As");
    let full = stored_full(&conn, &payload);
    index.insert(&full).unwrap();

    let again = stored_full(&conn, &payload);
    let err = index.insert(&again).unwrap_err();
    match err {
        RepoError::Uniqueness(violation) => {
            assert_eq!(violation.kind, RecordKind::Full);
            assert_eq!(violation.reason, UniquenessReason::DuplicateHash);
            assert_eq!(&violation.hash, full.hash());
        }
        other => panic!("unexpected error: {other}"),
    }

    // Shadow records live in their own namespace.
    index.insert(&PotcarRecord::shadow_of(&full)).unwrap();
    let err = index.insert(&PotcarRecord::shadow_of(&full)).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Uniqueness(violation) if violation.kind == RecordKind::Shadow
    ));
}

#[test]
fn same_attributes_with_other_hash_is_a_collision() {
    let conn = open_db_in_memory().unwrap();
    let index = SqliteRecordIndex::try_new(&conn).unwrap();
    index
        .insert(&stored_full(&conn, &common::pbe("As", "As")))
        .unwrap();

    let revision = stored_full(&conn, &common::pbe_revision("As", "As"));
    let err = index.insert(&revision).unwrap_err();
    match err {
        RepoError::Uniqueness(violation) => {
            assert_eq!(violation.reason, UniquenessReason::AttributeCollision);
            assert_eq!(&violation.hash, revision.hash());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(index.count(&RecordQuery::full()).unwrap(), 1);
}

#[test]
fn unique_indexes_reject_raw_duplicate_rows() {
    let conn = open_db_in_memory().unwrap();
    let index = SqliteRecordIndex::try_new(&conn).unwrap();
    let full = stored_full(&conn, &common::pbe("As", "As"));
    index.insert(&full).unwrap();

    let result = conn.execute(
        "INSERT INTO potcar_records (uuid, kind, hash, title, functional, element, symbol, content_id)
         VALUES ('dup', 'full', ?1, 'other', 'PBE', 'As', 'As_x', ?2);",
        rusqlite::params![full.hash().as_str(), full.content_id.unwrap().to_string()],
    );
    assert!(result.is_err());
}

#[test]
fn shadow_cannot_carry_a_payload() {
    let conn = open_db_in_memory().unwrap();
    let index = SqliteRecordIndex::try_new(&conn).unwrap();
    let full = stored_full(&conn, &common::pbe("As", "As"));
    let mut shadow = PotcarRecord::shadow_of(&full);
    shadow.content_id = full.content_id;

    let err = index.insert(&shadow).unwrap_err();
    assert!(matches!(err, RepoError::InvalidRecord(_)));
}

#[test]
fn delete_removes_only_the_given_record() {
    let conn = open_db_in_memory().unwrap();
    let index = SqliteRecordIndex::try_new(&conn).unwrap();
    let full = stored_full(&conn, &common::pbe("As", "As"));
    let shadow = PotcarRecord::shadow_of(&full);
    index.insert(&full).unwrap();
    index.insert(&shadow).unwrap();

    index.delete(full.uuid).unwrap();
    assert!(!index.exists(&RecordQuery::full()).unwrap());
    assert!(index.exists(&RecordQuery::shadow()).unwrap());

    let err = index.delete(full.uuid).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(_)));
}
