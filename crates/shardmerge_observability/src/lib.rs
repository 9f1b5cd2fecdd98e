//! Observability setup: structured logging and merge metrics.

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,shardmerge=debug";

/// Initialize the global tracing subscriber with structured logging.
///
/// Returns `false` when a global subscriber was already installed, which
/// lets test binaries call this from every test.
pub fn init_tracing() -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
}

/// Record the outcome of one merged cursor.
pub fn record_merge_metrics(strategy: &str, rows_emitted: u64, groups_built: u64, success: bool) {
    metrics::counter!(
        "shardmerge_merges_total",
        "strategy" => strategy.to_string(),
        "success" => success.to_string()
    )
    .increment(1);
    metrics::counter!("shardmerge_rows_emitted_total", "strategy" => strategy.to_string())
        .increment(rows_emitted);
    if groups_built > 0 {
        metrics::histogram!("shardmerge_groups_per_merge", "strategy" => strategy.to_string())
            .record(groups_built as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice() {
        init_tracing();
        assert!(!init_tracing());
        tracing::debug!("tracing initialized");
    }

    #[test]
    fn test_record_without_recorder_is_noop() {
        record_merge_metrics("iterator", 10, 0, true);
        record_merge_metrics("group-by-memory", 3, 3, false);
    }
}
