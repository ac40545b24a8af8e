use potcar_core::db::open_db_in_memory;
use potcar_core::repo::content_repo::{ContentStore, SqliteContentStore};
use potcar_core::RepoError;
use std::io::Read;
use uuid::Uuid;

#[test]
fn store_and_read_back_verbatim() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteContentStore::try_new(&conn).unwrap();
    let payload = b"TITEL = PAW_PBE As 22Sep2009\r\n  data\r\nEnd of Dataset\r\n";

    let content_id = store.store(payload).unwrap();
    assert!(store.contains(content_id).unwrap());
    assert_eq!(store.read_all(content_id).unwrap(), payload.to_vec());
}

#[test]
fn every_open_starts_at_byte_zero() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteContentStore::try_new(&conn).unwrap();
    let content_id = store.store(b"0123456789").unwrap();

    let mut first = store.open(content_id).unwrap();
    let mut head = [0_u8; 4];
    first.read_exact(&mut head).unwrap();
    assert_eq!(&head, b"0123");

    let mut second = store.open(content_id).unwrap();
    let mut all = Vec::new();
    second.read_to_end(&mut all).unwrap();
    assert_eq!(all, b"0123456789");

    let mut rest = Vec::new();
    first.read_to_end(&mut rest).unwrap();
    assert_eq!(rest, b"456789");
}

#[test]
fn populated_entity_rejects_second_payload() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteContentStore::try_new(&conn).unwrap();
    let content_id = Uuid::new_v4();

    store.attach(content_id, b"first").unwrap();
    let err = store.attach(content_id, b"second").unwrap_err();
    assert!(matches!(err, RepoError::CapacityExceeded(id) if id == content_id));
    assert_eq!(store.read_all(content_id).unwrap(), b"first");
}

#[test]
fn missing_payload_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteContentStore::try_new(&conn).unwrap();
    let content_id = store.store(b"payload").unwrap();
    store.remove(content_id).unwrap();

    assert!(!store.contains(content_id).unwrap());
    assert!(matches!(
        store.open(content_id).err().unwrap(),
        RepoError::NotFound(_)
    ));
    assert!(matches!(
        store.remove(content_id).unwrap_err(),
        RepoError::NotFound(_)
    ));
}
