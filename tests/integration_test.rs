//! Integration tests for cogtrace.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::doc_markdown)]

mod common;

use cogtrace::{CogtraceConfig, Error, SessionId, TelemetryStore};

#[test]
fn test_error_types() {
    let err = Error::InvalidInput("session id 'abc' is not numeric".to_string());
    let display = format!("{err}");
    assert!(display.contains("invalid input"));
    assert!(display.contains("abc"));

    let err = Error::Transient {
        operation: "backfill".to_string(),
        cause: "database is locked".to_string(),
    };
    assert!(err.is_retryable());
    assert!(format!("{err}").contains("transient"));

    let err = Error::StorageUnavailable {
        operation: "open_database".to_string(),
        cause: "unable to open database file".to_string(),
    };
    assert!(!err.is_retryable());
    assert!(format!("{err}").contains("open_database"));
}

#[test]
fn test_session_id_parsing_rejects_non_numeric() {
    assert_eq!(SessionId::parse(" 42 ").unwrap(), SessionId::new(42));
    assert!(matches!(SessionId::parse("abc"), Err(Error::InvalidInput(_))));
}

#[test]
fn test_invalid_table_name_rejected_before_opening() {
    let mut config = CogtraceConfig::default();
    config.tables.canonical = "trial response".to_string();
    assert!(matches!(
        TelemetryStore::in_memory(&config),
        Err(Error::InvalidInput(_))
    ));
}

#[test]
fn test_unopenable_database_is_storage_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let config = CogtraceConfig::default().with_db_path(dir.path().join("missing").join("x.db"));
    assert!(matches!(
        TelemetryStore::open(&config),
        Err(Error::StorageUnavailable { .. })
    ));
}

/// Deployments rename tables; everything flows through the configured names.
mod custom_tables {
    use super::common;
    use cogtrace::{BackfillService, CogtraceConfig, ProgressService, SessionId, TelemetryStore};
    use std::sync::Arc;

    #[test]
    fn test_configured_table_names_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("renamed.db");
        let config_path = common::write_file(
            dir.path(),
            "config.toml",
            &format!(
                r#"
                db_path = "{}"
                migration_tag = "OLD"

                [tables]
                canonical = "respuesta_v2"
                legacy = "respuesta"
                item = "reactivo"
                domain_catalog = "ccp"
                "#,
                db_path.display()
            ),
        );
        let config = CogtraceConfig::load_from_file(&config_path).unwrap();

        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE respuesta (session_id INTEGER, item_id INTEGER, correct, reaction_ms INTEGER);
             CREATE TABLE reactivo (item_id INTEGER PRIMARY KEY, domain_id INTEGER, exercise_id INTEGER);
             CREATE TABLE ccp (domain_id INTEGER PRIMARY KEY, code TEXT);
             INSERT INTO ccp VALUES (1, 'MCP');
             INSERT INTO reactivo VALUES (10, 1, NULL);
             INSERT INTO respuesta VALUES (1, 10, 1, 500), (1, 10, 0, 700);",
        )
        .unwrap();

        let store = Arc::new(TelemetryStore::open(&config).unwrap());
        let result = BackfillService::new(Arc::clone(&store)).backfill(None).unwrap();
        assert_eq!(result.inserted, 2);
        assert_eq!(common::count(&conn, "respuesta_v2"), 2);

        let tag: String = conn
            .query_row("SELECT DISTINCT payload FROM respuesta_v2", [], |r| r.get(0))
            .unwrap();
        assert_eq!(tag, "OLD");

        let progress = ProgressService::new(store).session_progress(SessionId::new(1)).unwrap();
        assert_eq!(progress.by_domain.len(), 1);
        assert_eq!(progress.by_domain[0].domain_code, "MCP");
        assert!((progress.by_domain[0].accuracy_pct - 50.0).abs() < f64::EPSILON);
    }
}

/// Missing or partial schemas degrade to documented fallbacks instead of failing.
mod graceful_degradation {
    use super::common;
    use cogtrace::{BackfillService, ProgressService, RowSource, SessionId};
    use common::TestDb;

    #[test]
    fn test_legacy_table_without_required_columns() {
        let db = TestDb::new();
        db.raw()
            .execute_batch("CREATE TABLE legacy_response (session_id INTEGER, item_id INTEGER);")
            .unwrap();

        let result = BackfillService::new(db.store()).backfill(None).unwrap();
        assert_eq!(result.inserted, 0);
        assert!(result.note.unwrap().contains("lacks required columns"));
    }

    #[test]
    fn test_progress_without_any_source() {
        let db = TestDb::new();
        let progress = ProgressService::new(db.store())
            .session_progress(SessionId::new(1))
            .unwrap();
        assert_eq!(progress.source, RowSource::Empty);
        assert!(progress.note.is_some());
    }

    #[test]
    fn test_catalog_without_exercise_table_keeps_domain() {
        let db = TestDb::new();
        let conn = db.raw();
        common::legacy_schema(&conn);
        common::domain_catalogs(&conn);
        common::legacy_rows(&conn, &[(1, 10, "1", 500)]);

        BackfillService::new(db.store()).backfill(None).unwrap();
        let codes: (String, String) = conn
            .query_row(
                "SELECT domain_code, exercise_code FROM trial_response",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(codes, ("MCP".to_string(), "UNK".to_string()));
    }
}
