use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec,
    HistogramVec, IntCounterVec, IntGaugeVec,
};

lazy_static! {
    /// Latency of each comment store call (`create`, `insert`, `get`,
    /// `delete`, `by_media_item`, `count`), by table and outcome.
    pub static ref DATABASE_OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "comment_store_operation_duration_seconds",
        "Comment store operation duration in seconds",
        &["operation", "table", "status"]
    ).unwrap();

    /// Comment store calls, by table and outcome. A `delete` of a missing
    /// comment counts as a failure.
    pub static ref OPERATION_COUNTER: IntCounterVec = register_int_counter_vec!(
        "comment_store_operations_total",
        "Total number of comment store operations",
        &["operation", "table", "status"]
    ).unwrap();

    /// CQL statements re-sent after a transient error, labelled with the
    /// statement name passed to the backoff policy.
    pub static ref STATEMENT_RETRIES: IntCounterVec = register_int_counter_vec!(
        "comment_store_statement_retries_total",
        "Statements re-sent after a transient storage error",
        &["statement"]
    ).unwrap();

    /// Session leases currently held per keyspace. Returns to its previous
    /// value once every in-flight operation has finished.
    pub static ref ACTIVE_SESSIONS: IntGaugeVec = register_int_gauge_vec!(
        "comment_store_active_sessions",
        "Number of session leases currently held",
        &["keyspace"]
    ).unwrap();
}

/// Records one finished comment store call against `table`.
pub fn record_operation(operation: &str, table: &str, success: bool, duration: f64) {
    let status = if success { "success" } else { "failure" };
    DATABASE_OPERATION_DURATION
        .with_label_values(&[operation, table, status])
        .observe(duration);
    OPERATION_COUNTER
        .with_label_values(&[operation, table, status])
        .inc();
}

pub fn record_retry(statement: &str) {
    STATEMENT_RETRIES.with_label_values(&[statement]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_operation_counts_by_table_and_status() {
        let failures = OPERATION_COUNTER.with_label_values(&["metrics_test", "comments", "failure"]);
        let other_table = OPERATION_COUNTER.with_label_values(&["metrics_test", "archive", "failure"]);
        let (before, other_before) = (failures.get(), other_table.get());

        record_operation("metrics_test", "comments", false, 0.01);

        assert_eq!(failures.get(), before + 1);
        assert_eq!(other_table.get(), other_before);
        assert_eq!(
            DATABASE_OPERATION_DURATION
                .with_label_values(&["metrics_test", "comments", "failure"])
                .get_sample_count(),
            before + 1
        );
    }
}
