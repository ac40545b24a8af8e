mod common;

use potcar_core::db::open_db_in_memory;
use potcar_core::{
    MultiPotcarIo, PotcarHash, PotcarIo, PotcarService, RecordQuery, ServiceError,
};
use std::collections::HashSet;

#[test]
fn contents_resolve_to_stored_or_unstored_wrappers() {
    let conn = open_db_in_memory().unwrap();
    let service = PotcarService::new(&conn).unwrap();
    let stored_payload = common::pbe("In_d", "In");
    service.ingest(&stored_payload, None).unwrap();

    let stored = PotcarIo::resolve(&service, stored_payload.as_slice()).unwrap();
    assert!(stored.is_stored());
    assert_eq!(stored.content().unwrap(), stored_payload.as_slice());

    let fresh_payload = common::pbe("As", "As");
    let mut fresh = PotcarIo::resolve(&service, fresh_payload.clone()).unwrap();
    assert!(!fresh.is_stored());
    assert_eq!(fresh.symbol(), "As");
    assert_eq!(fresh.hash(), &PotcarHash::of(&fresh_payload));
    assert_eq!(service.count(&RecordQuery::full()).unwrap(), 1);

    let full = fresh.ingest(&service).unwrap().clone();
    assert!(fresh.is_stored());
    assert_eq!(full.hash(), fresh.hash());
    assert_eq!(service.count(&RecordQuery::full()).unwrap(), 2);
    assert_eq!(fresh.shadow_record(&service).unwrap().hash(), full.hash());
}

#[test]
fn path_and_records_resolve_to_equal_wrappers() {
    let conn = open_db_in_memory().unwrap();
    let service = PotcarService::new(&conn).unwrap();
    let payload = common::pbe("Ga_d", "Ga");
    let shadow = service.ingest(&payload, None).unwrap();
    let full = service.recover_full(&shadow).unwrap();

    let dir = tempfile::tempdir().unwrap();
    common::write_file(dir.path(), "POTCAR", &payload);

    let from_path = PotcarIo::resolve(&service, dir.path().join("POTCAR")).unwrap();
    let from_full = PotcarIo::resolve(&service, full).unwrap();
    let from_shadow = PotcarIo::resolve(&service, shadow).unwrap();

    assert_eq!(from_path, from_full);
    assert_eq!(from_full, from_shadow);
    assert_eq!(from_shadow.content().unwrap(), payload.as_slice());

    let distinct: HashSet<_> = [from_path, from_full, from_shadow].into_iter().collect();
    assert_eq!(distinct.len(), 1);
}

#[test]
fn missing_path_is_an_io_error() {
    let conn = open_db_in_memory().unwrap();
    let service = PotcarService::new(&conn).unwrap();
    let dir = tempfile::tempdir().unwrap();

    let err = PotcarIo::resolve(&service, dir.path().join("absent")).unwrap_err();
    assert!(matches!(err, ServiceError::Io { .. }));
}

#[test]
fn multi_record_round_trip_preserves_order() {
    let conn = open_db_in_memory().unwrap();
    let service = PotcarService::new(&conn).unwrap();
    let payloads = [
        common::pbe("In_d", "In"),
        common::pbe("As", "As"),
        common::pbe("Ga_d", "Ga"),
    ];
    service.ingest(&payloads[1], None).unwrap();

    let potcars: Vec<_> = payloads
        .iter()
        .map(|payload| PotcarIo::resolve(&service, payload.as_slice()).unwrap())
        .collect();
    let multi = MultiPotcarIo::new(potcars);

    let mut written = Vec::new();
    let size = multi.write(&mut written).unwrap();
    assert_eq!(size, written.len());
    assert_eq!(written, payloads.concat());

    let read_back = MultiPotcarIo::read(&service, &written).unwrap();
    assert_eq!(read_back.hashes(), multi.hashes());
    let stored: Vec<_> = read_back.potcars().iter().map(PotcarIo::is_stored).collect();
    assert_eq!(stored, vec![false, true, false]);
}

#[test]
fn write_file_then_read_file() {
    let conn = open_db_in_memory().unwrap();
    let service = PotcarService::new(&conn).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("POTCAR");

    let multi = MultiPotcarIo::new(vec![
        PotcarIo::resolve(&service, common::lda("As", "As")).unwrap(),
        PotcarIo::resolve(&service, common::lda("In", "In")).unwrap(),
    ]);
    multi.write_file(&path).unwrap();

    let read_back = MultiPotcarIo::read_file(&service, &path).unwrap();
    assert_eq!(read_back, multi);
    assert_eq!(read_back.len(), 2);
}

#[test]
fn write_without_content_fails_before_any_byte() {
    let conn = open_db_in_memory().unwrap();
    let service = PotcarService::new(&conn).unwrap();
    let kept = service.ingest(&common::pbe("In_d", "In"), None).unwrap();
    let removed = service.ingest(&common::pbe("As", "As"), None).unwrap();
    service.remove_full(removed.hash()).unwrap();

    let multi = MultiPotcarIo::new(vec![
        PotcarIo::resolve(&service, kept).unwrap(),
        PotcarIo::resolve(&service, removed.clone()).unwrap(),
    ]);

    let mut written = Vec::new();
    let err = multi.write(&mut written).unwrap_err();
    assert!(matches!(err, ServiceError::ContentUnavailable(hash) if &hash == removed.hash()));
    assert!(written.is_empty());
}

fn round_trip(service: &PotcarService<'_>, payloads: &[Vec<u8>]) -> MultiPotcarIo {
    let potcars = payloads
        .iter()
        .map(|payload| PotcarIo::resolve(service, payload.clone()).unwrap())
        .collect();
    let multi = MultiPotcarIo::new(potcars);
    let written = multi.to_bytes().unwrap();
    assert_eq!(written, payloads.concat());

    let read_back = MultiPotcarIo::read(service, &written).unwrap();
    assert_eq!(read_back.hashes(), multi.hashes());
    read_back
}

#[test]
fn dotted_end_record_reads_back_alone_and_after_others() {
    let conn = open_db_in_memory().unwrap();
    let service = PotcarService::new(&conn).unwrap();
    let minimal = b"TITEL = PAW As\n...END".to_vec();

    let alone = round_trip(&service, &[minimal.clone()]);
    assert_eq!(alone.potcars()[0].symbol(), "As");

    let trailing = round_trip(&service, &[common::pbe("In", "In"), minimal]);
    assert_eq!(trailing.len(), 2);
}

#[test]
fn blank_lines_after_a_record_stay_with_it() {
    let conn = open_db_in_memory().unwrap();
    let service = PotcarService::new(&conn).unwrap();
    let mut padded = common::pbe("Ga_d", "Ga");
    padded.extend_from_slice(b"\n  \n");

    let read_back = round_trip(&service, &[padded.clone(), common::pbe("In", "In")]);
    assert_eq!(read_back.potcars()[0].content().unwrap(), padded.as_slice());

    round_trip(&service, &[common::pbe("In", "In"), padded]);
}

#[test]
fn text_after_terminator_is_rejected_before_any_byte() {
    let conn = open_db_in_memory().unwrap();
    let service = PotcarService::new(&conn).unwrap();
    let mut annotated = common::pbe("Al", "Al");
    annotated.extend_from_slice(b"checked against reference set\n");

    for order in [[0, 1], [1, 0]] {
        let candidates = [annotated.clone(), common::pbe("In", "In")];
        let multi = MultiPotcarIo::new(
            order
                .iter()
                .map(|&idx| PotcarIo::resolve(&service, candidates[idx].clone()).unwrap())
                .collect(),
        );
        let annotated_at = order.iter().position(|&idx| idx == 0).unwrap();

        let mut written = Vec::new();
        let err = multi.write(&mut written).unwrap_err();
        assert!(
            matches!(err, ServiceError::UnterminatedRecord { index } if index == annotated_at)
        );
        assert!(written.is_empty());
    }
}

#[test]
fn record_needs_terminator_and_line_break_to_lead() {
    let conn = open_db_in_memory().unwrap();
    let service = PotcarService::new(&conn).unwrap();

    let no_line_break = MultiPotcarIo::new(vec![
        PotcarIo::resolve(&service, b"TITEL = PAW As\nEND".to_vec()).unwrap(),
        PotcarIo::resolve(&service, common::pbe("In", "In")).unwrap(),
    ]);
    assert!(matches!(
        no_line_break.to_bytes().unwrap_err(),
        ServiceError::UnterminatedRecord { index: 0 }
    ));

    let no_terminator = MultiPotcarIo::new(vec![PotcarIo::resolve(
        &service,
        b"TITEL = PAW As\nsome data\n".to_vec(),
    )
    .unwrap()]);
    assert!(matches!(
        no_terminator.to_bytes().unwrap_err(),
        ServiceError::UnterminatedRecord { index: 0 }
    ));
}

#[test]
fn ingest_without_content_is_unavailable() {
    let conn = open_db_in_memory().unwrap();
    let service = PotcarService::new(&conn).unwrap();
    let shadow = service.ingest(&common::pbe("As", "As"), None).unwrap();
    service.remove_full(shadow.hash()).unwrap();

    let mut metadata_only = PotcarIo::resolve(&service, shadow.clone()).unwrap();
    assert!(!metadata_only.has_content());
    assert!(matches!(
        metadata_only.ingest(&service).unwrap_err(),
        ServiceError::ContentUnavailable(hash) if &hash == shadow.hash()
    ));
}

#[test]
fn trailing_garbage_is_malformed() {
    let conn = open_db_in_memory().unwrap();
    let service = PotcarService::new(&conn).unwrap();
    let mut contents = common::pbe("In", "In");
    contents.extend_from_slice(b"TITEL = PAW As\n");

    let err = MultiPotcarIo::read(&service, &contents).unwrap_err();
    assert!(matches!(err, ServiceError::Malformed(_)));
}
