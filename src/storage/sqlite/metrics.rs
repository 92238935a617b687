//! Metrics recording for storage operations.

use std::time::Instant;

/// Records operation metrics for a storage operation.
///
/// Emits two series, both labelled by backend, operation and status:
/// 1. `storage_operations_total` - counter
/// 2. `storage_operation_duration_ms` - histogram of latency
///
/// # Examples
///
/// ```ignore
/// use std::time::Instant;
/// use cogtrace::storage::sqlite::record_operation_metrics;
///
/// let start = Instant::now();
/// // ... perform operation ...
/// let status = if result.is_ok() { "success" } else { "error" };
/// record_operation_metrics("sqlite", "backfill", start, status);
/// ```
pub fn record_operation_metrics(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "storage_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Records one retried transaction attempt.
pub fn record_retry(backend: &'static str, operation: &'static str) {
    metrics::counter!(
        "storage_retries_total",
        "backend" => backend,
        "operation" => operation
    )
    .increment(1);
}

/// Maps a result onto the status label used by [`record_operation_metrics`].
pub const fn status_label<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() { "success" } else { "error" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_record_operation_metrics_without_recorder() {
        // No recorder is installed in unit tests; recording must be a no-op.
        let start = Instant::now();
        thread::sleep(Duration::from_millis(1));

        record_operation_metrics("sqlite", "backfill", start, "success");
        record_operation_metrics("sqlite", "upsert_batch", start, "error");
        record_retry("sqlite", "upsert_batch");
    }

    #[test]
    fn test_status_label() {
        let ok: Result<(), ()> = Ok(());
        let err: Result<(), ()> = Err(());
        assert_eq!(status_label(&ok), "success");
        assert_eq!(status_label(&err), "error");
    }
}
