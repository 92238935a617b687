//! Batch ingestion of externally produced trial records.
//!
//! Records are applied as upserts keyed by `(session_id, exercise_code,
//! item_id)`. Each batch runs in one immediate transaction that first
//! collapses pre-existing duplicates of the key onto their oldest row, then
//! establishes the unique index, then applies the records in order, so a
//! later record with the same key overwrites an earlier one.

use crate::config::IngestDefaults;
use crate::io::jsonl;
use crate::models::{TrialRecord, UpsertResult};
use crate::storage::sqlite::{SqliteCatalogResolver, map_storage_error, schema};
use crate::storage::{CatalogResolver, TelemetryStore};
use crate::{Error, Result};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

/// Applies trial records to the canonical table.
pub struct IngestService {
    store: Arc<TelemetryStore>,
}

impl IngestService {
    /// Creates an ingestion service over a shared store.
    #[must_use]
    pub const fn new(store: Arc<TelemetryStore>) -> Self {
        Self { store }
    }

    /// Upserts a batch of records.
    ///
    /// The whole batch is validated before storage is touched, and applied
    /// atomically.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if any record is malformed,
    /// [`Error::Transient`] if a uniqueness race or the write lock persists
    /// past the retry budget, and [`Error::StorageUnavailable`] for other
    /// storage faults. Nothing is committed on error.
    #[instrument(skip(self, records), fields(operation = "upsert_batch", backend = "sqlite", records = records.len()))]
    pub fn upsert_batch(&self, records: &[TrialRecord]) -> Result<UpsertResult> {
        for record in records {
            record.validate()?;
        }
        if records.is_empty() {
            return Ok(UpsertResult::default());
        }

        let config = self.store.config();
        let table = config.tables.canonical.as_str();
        let default_payload = config.ingest.payload_tag.as_str();

        let result = self.store.write("upsert_batch", |tx| {
            schema::ensure_canonical_table(tx, table)?;
            let duplicates_removed = schema::ensure_natural_key(tx, table)?;
            let applied = apply_records(tx, table, default_payload, records)?;
            Ok(UpsertResult {
                inserted_or_replaced: applied,
                duplicates_removed,
            })
        })?;

        tracing::info!(
            applied = result.inserted_or_replaced,
            duplicates_removed = result.duplicates_removed,
            "Upsert batch complete"
        );
        Ok(result)
    }

    /// Reads one session JSONL file and upserts its records.
    ///
    /// Answers without codes are resolved through the store's item catalogs.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or the upsert fails.
    pub fn ingest_file(&self, path: &Path) -> Result<UpsertResult> {
        let records = self.read_with_catalog("read_session_file", |defaults, catalog| {
            jsonl::read_session_file(path, defaults, catalog)
        })?;
        self.upsert_batch(&records)
    }

    /// Reads every `session_*.jsonl` file in a directory, in name order, and
    /// upserts all of their records as one batch.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or parsed, or the upsert fails.
    pub fn ingest_dir(&self, dir: &Path) -> Result<UpsertResult> {
        let records = self.read_with_catalog("read_session_dir", |defaults, catalog| {
            jsonl::read_session_dir(dir, defaults, catalog)
        })?;
        self.upsert_batch(&records)
    }

    /// Parses input against one catalog snapshot.
    fn read_with_catalog<F>(&self, operation: &'static str, read: F) -> Result<Vec<TrialRecord>>
    where
        F: FnOnce(&IngestDefaults, &dyn CatalogResolver) -> Result<Vec<TrialRecord>>,
    {
        let config = self.store.config();
        self.store.read(operation, |tx| {
            read(&config.ingest, &SqliteCatalogResolver::new(tx, &config.tables))
        })
    }
}

fn apply_records(
    conn: &Connection,
    table: &str,
    default_payload: &str,
    records: &[TrialRecord],
) -> Result<u64> {
    let map_err = map_storage_error("upsert_record");
    let mut stmt = conn
        .prepare(&format!(
            "INSERT INTO {table} \
               (session_id, domain_code, exercise_code, item_id, payload, correct, reaction_ms, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, COALESCE(?8, CURRENT_TIMESTAMP)) \
             ON CONFLICT (session_id, exercise_code, item_id) DO UPDATE SET \
               domain_code = excluded.domain_code, \
               payload = excluded.payload, \
               correct = excluded.correct, \
               reaction_ms = excluded.reaction_ms, \
               created_at = excluded.created_at"
        ))
        .map_err(&map_err)?;

    let mut applied = 0_u64;
    for record in records {
        let changed = stmt
            .execute(params![
                record.session_id.get(),
                record.domain_code,
                record.exercise_code,
                record.item_id,
                record.payload.as_deref().unwrap_or(default_payload),
                i64::from(record.correct),
                record.reaction_ms,
                record.event_time_sql(),
            ])
            .map_err(&map_err)?;
        if changed == 0 {
            return Err(Error::StorageUnavailable {
                operation: "upsert_record".to_string(),
                cause: format!(
                    "no row written for {}/{}/{}",
                    record.session_id, record.exercise_code, record.item_id
                ),
            });
        }
        applied += 1;
    }
    Ok(applied)
}
