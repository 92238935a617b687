//! Benchmarks for aggregation and session reads.
//!
//! These benchmarks cover:
//! - In-memory aggregation of normalized rows
//! - Full session progress (union read plus aggregation) after backfill

// Criterion macros generate items without docs - this is expected for benchmarks
// Benchmarks use expect/unwrap for simplicity - panics are acceptable in benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::cast_possible_wrap)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use cogtrace::{
    BackfillService, CogtraceConfig, NormalizedRow, ProgressService, SessionId, TelemetryStore,
    aggregate,
};

const DOMAINS: [&str; 4] = ["MCP", "VPM", "INH", "UNK"];
const EXERCISES: [&str; 3] = ["E1", "E2", "UNK"];

fn rows(count: usize) -> Vec<NormalizedRow> {
    (0..count)
        .map(|i| {
            NormalizedRow::new(
                DOMAINS[i % DOMAINS.len()],
                EXERCISES[i % EXERCISES.len()],
                i % 3 != 0,
                300 + (i % 700) as i64,
            )
        })
        .collect()
}

/// Creates a store whose session 1 has `count` migrated legacy rows.
fn backfilled_store(count: usize) -> Arc<TelemetryStore> {
    let store = Arc::new(TelemetryStore::in_memory(&CogtraceConfig::default()).unwrap());
    store
        .with_connection(|conn| {
            conn.execute_batch(
                "CREATE TABLE legacy_response (session_id INTEGER, item_id INTEGER, correct, reaction_ms INTEGER);
                 CREATE TABLE item (item_id INTEGER PRIMARY KEY, domain_id INTEGER, exercise_id INTEGER);
                 CREATE TABLE domain_catalog (domain_id INTEGER PRIMARY KEY, code TEXT);
                 INSERT INTO domain_catalog VALUES (1, 'MCP'), (2, 'VPM');
                 INSERT INTO item VALUES (1, 1, NULL), (2, 2, NULL);",
            )
            .unwrap();
            let tx = conn.transaction().unwrap();
            for i in 0..count {
                tx.execute(
                    "INSERT INTO legacy_response VALUES (1, ?1, ?2, ?3)",
                    rusqlite::params![(i % 3) as i64, (i % 2) as i64, i as i64],
                )
                .unwrap();
            }
            tx.commit().unwrap();
            Ok(())
        })
        .unwrap();
    BackfillService::new(Arc::clone(&store)).backfill(None).unwrap();
    store
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");
    for count in [100, 1_000, 10_000] {
        let input = rows(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
            b.iter(|| aggregate(black_box(input.clone())));
        });
    }
    group.finish();
}

fn bench_session_progress(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_progress");
    group.measurement_time(Duration::from_secs(10));
    for count in [100, 1_000, 10_000] {
        let service = ProgressService::new(backfilled_store(count));
        group.bench_function(BenchmarkId::from_parameter(count), |b| {
            b.iter(|| service.session_progress(black_box(SessionId::new(1))).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_aggregate, bench_session_progress);
criterion_main!(benches);
