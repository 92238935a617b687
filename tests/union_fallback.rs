//! Union reads across migration stages.
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use cogtrace::{
    BackfillService, NormalizedRow, ProgressService, RowSource, SessionId, SessionRowsService,
    aggregate,
};
use common::TestDb;

fn sorted_rows(service: &SessionRowsService, session: i64) -> (RowSource, Vec<NormalizedRow>) {
    let rows = service.rows_for_session(SessionId::new(session)).unwrap();
    let source = rows.source();
    let mut rows: Vec<_> = rows.collect();
    rows.sort();
    (source, rows)
}

#[test]
fn test_session_reads_the_same_before_and_after_backfill() {
    let db = TestDb::new();
    let conn = db.raw();
    common::legacy_schema(&conn);
    common::domain_catalogs(&conn);
    common::legacy_rows(
        &conn,
        &[(1, 10, "1", 500), (1, 10, "0", 700), (1, 11, "1", 400), (2, 11, "1", 999)],
    );

    let store = db.store();
    let reader = SessionRowsService::new(store.clone());
    let (source, before) = sorted_rows(&reader, 1);
    assert_eq!(source, RowSource::LegacyJoined);
    assert_eq!(
        before,
        vec![
            NormalizedRow::new("MCP", "UNK", false, 700),
            NormalizedRow::new("MCP", "UNK", true, 500),
            NormalizedRow::new("VPM", "UNK", true, 400),
        ]
    );

    // Partial migration: only session 2 moves.
    BackfillService::new(store.clone())
        .backfill(Some(SessionId::new(2)))
        .unwrap();
    let (source, partial) = sorted_rows(&reader, 1);
    assert_eq!(source, RowSource::Union);
    assert_eq!(partial, before);

    BackfillService::new(store.clone()).backfill(None).unwrap();
    let (source, after) = sorted_rows(&reader, 1);
    assert_eq!(source, RowSource::Union);
    assert_eq!(after, before);

    let progress = ProgressService::new(store).session_progress(SessionId::new(1)).unwrap();
    let expected = aggregate(before);
    assert_eq!(progress.by_domain, expected.by_domain);
    assert_eq!(progress.by_exercise, expected.by_exercise);
    assert_eq!(progress.source, RowSource::Union);
}

#[test]
fn test_unmigrated_rows_appear_next_to_migrated_ones() {
    let db = TestDb::new();
    let conn = db.raw();
    common::legacy_schema(&conn);
    common::domain_catalogs(&conn);
    common::legacy_rows(&conn, &[(1, 10, "1", 500)]);

    let store = db.store();
    BackfillService::new(store.clone()).backfill(None).unwrap();
    common::legacy_rows(&conn, &[(1, 11, "0", 650)]);

    let (source, rows) = sorted_rows(&SessionRowsService::new(store), 1);
    assert_eq!(source, RowSource::Union);
    assert_eq!(
        rows,
        vec![
            NormalizedRow::new("MCP", "UNK", true, 500),
            NormalizedRow::new("VPM", "UNK", false, 650),
        ]
    );
}

#[test]
fn test_live_canonical_rows_join_the_union() {
    let db = TestDb::new();
    let conn = db.raw();
    common::legacy_schema(&conn);
    common::domain_catalogs(&conn);
    common::legacy_rows(&conn, &[(5, 10, "1", 500)]);

    let store = db.store();
    cogtrace::IngestService::new(store.clone())
        .upsert_batch(&[cogtrace::TrialRecord::new(SessionId::new(5), "INH", "GO_NOGO", "A1", true, 320)])
        .unwrap();

    let (source, rows) = sorted_rows(&SessionRowsService::new(store), 5);
    assert_eq!(source, RowSource::Union);
    assert_eq!(
        rows,
        vec![
            NormalizedRow::new("INH", "GO_NOGO", true, 320),
            NormalizedRow::new("MCP", "UNK", true, 500),
        ]
    );
}

#[test]
fn test_bare_legacy_then_empty() {
    let db = TestDb::new();
    let conn = db.raw();
    common::legacy_schema(&conn);
    common::legacy_rows(&conn, &[(3, 10, "yes", 200)]);

    let reader = SessionRowsService::new(db.store());
    let (source, rows) = sorted_rows(&reader, 3);
    assert_eq!(source, RowSource::LegacyBare);
    assert_eq!(rows, vec![NormalizedRow::new("UNK", "UNK", true, 200)]);

    let (_, none) = sorted_rows(&reader, 4);
    assert!(none.is_empty());

    let empty = TestDb::new();
    let (source, rows) = sorted_rows(&SessionRowsService::new(empty.store()), 1);
    assert_eq!(source, RowSource::Empty);
    assert!(rows.is_empty());
}
