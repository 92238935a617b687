//! SQL helper functions for the embedded store.
//!
//! - Error classification from `rusqlite` errors into the crate taxonomy
//! - The truthy-correctness expression shared by every statement that reads a
//!   stored correctness flag
//! - Scope clauses for optional session filters

use crate::{Error, UNKNOWN_CODE};
use rusqlite::ErrorCode;

/// Classifies a `rusqlite` error raised during `operation`.
///
/// | `SQLite` code | Error |
/// |---------------|-------|
/// | `SQLITE_CONSTRAINT` | [`Error::ConstraintViolation`] |
/// | `SQLITE_BUSY`, `SQLITE_LOCKED` | [`Error::Transient`] |
/// | anything else | [`Error::StorageUnavailable`] |
pub fn storage_error(operation: &str, e: &rusqlite::Error) -> Error {
    let operation = operation.to_string();
    let cause = e.to_string();
    match e.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => Error::ConstraintViolation { operation, cause },
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            Error::Transient { operation, cause }
        },
        _ => Error::StorageUnavailable { operation, cause },
    }
}

/// Returns a closure mapping `rusqlite` errors for `operation`, for use with `map_err`.
pub fn map_storage_error(operation: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| storage_error(operation, &e)
}

/// SQL expression normalizing a stored correctness value to `0` or `1`.
///
/// Mirrors [`crate::Correctness::from_sql`]: numbers are correct when
/// non-zero, text when it is one of `1`, `t`, `true`, `y`, `yes` (trimmed,
/// any case), and `NULL` or blobs are incorrect.
#[must_use]
pub fn correct_flag_sql(expr: &str) -> String {
    format!(
        "(CASE WHEN {expr} IS NULL THEN 0 \
         WHEN typeof({expr}) IN ('integer', 'real') THEN ({expr} <> 0) \
         WHEN typeof({expr}) = 'text' AND lower(trim({expr})) IN ('1', 't', 'true', 'y', 'yes') THEN 1 \
         ELSE 0 END)"
    )
}

/// SQL expression substituting the unknown sentinel for a null code.
#[must_use]
pub fn code_or_unknown_sql(expr: &str) -> String {
    format!("COALESCE({expr}, '{UNKNOWN_CODE}')")
}

/// Returns `AND <column> = ?<n>` when a session scope is set, else nothing.
#[must_use]
pub fn session_scope_clause(column: &str, scoped: bool, placeholder: usize) -> String {
    if scoped {
        format!(" AND {column} = ?{placeholder}")
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Correctness;
    use rusqlite::Connection;
    use test_case::test_case;

    #[test]
    fn test_storage_error_classifies_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY); INSERT INTO t VALUES (1);")
            .unwrap();
        let err = conn.execute("INSERT INTO t VALUES (1)", []).unwrap_err();
        assert!(matches!(
            storage_error("insert", &err),
            Error::ConstraintViolation { ref operation, .. } if operation == "insert"
        ));
    }

    #[test]
    fn test_storage_error_defaults_to_unavailable() {
        let conn = Connection::open_in_memory().unwrap();
        let err = conn.execute("SELECT * FROM missing_table", []).unwrap_err();
        assert!(matches!(
            storage_error("read", &err),
            Error::StorageUnavailable { .. }
        ));
    }

    #[test_case("1" ; "integer one")]
    #[test_case("0" ; "integer zero")]
    #[test_case("-2" ; "negative")]
    #[test_case("0.5" ; "real")]
    #[test_case("'true'" ; "text true")]
    #[test_case("' YES '" ; "text yes padded")]
    #[test_case("'no'" ; "text no")]
    #[test_case("'0'" ; "text zero")]
    #[test_case("NULL" ; "null")]
    #[test_case("x'01'" ; "blob")]
    fn test_correct_flag_sql_matches_rust_normalization(literal: &str) {
        let conn = Connection::open_in_memory().unwrap();
        let sql = format!(
            "SELECT {}, v FROM (SELECT {literal} AS v)",
            correct_flag_sql("v")
        );
        let (flag, normalized): (i64, bool) = conn
            .query_row(&sql, [], |row| {
                Ok((row.get(0)?, Correctness::from_sql(row.get_ref(1)?).is_correct()))
            })
            .unwrap();
        assert_eq!(flag == 1, normalized);
    }

    #[test]
    fn test_session_scope_clause() {
        assert_eq!(session_scope_clause("r.session_id", false, 1), "");
        assert_eq!(
            session_scope_clause("r.session_id", true, 2),
            " AND r.session_id = ?2"
        );
    }
}
