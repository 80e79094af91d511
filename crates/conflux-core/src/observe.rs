//! Optional metrics instrumentation for conflux.
//!
//! When the `observe` feature is enabled, queues and transform logs emit
//! counters and histograms via the [`metrics`] crate. A downstream
//! application must install a metrics recorder (e.g. `metrics-exporter-prometheus`)
//! to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record a task executed by a queue (counter + latency histogram).
///
/// - `conflux.queue.tasks_total` – counter with `queue`, `task` and `outcome` labels
/// - `conflux.queue.task_duration_seconds` – histogram with a `queue` label
#[inline]
pub fn record_task(queue: &str, task: &'static str, duration: std::time::Duration, success: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if success { "ok" } else { "fail" };
        metrics::counter!(
            "conflux.queue.tasks_total",
            "queue" => queue.to_string(),
            "task" => task,
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!("conflux.queue.task_duration_seconds", "queue" => queue.to_string())
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (queue, task, duration, success);
    }
}

/// Set the pending task gauge of a queue.
///
/// - `conflux.queue.pending` – gauge with a `queue` label
#[inline]
pub fn set_queue_depth(queue: &str, depth: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::gauge!("conflux.queue.pending", "queue" => queue.to_string()).set(depth as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (queue, depth);
    }
}

/// Record a transform id appended to a log.
///
/// - `conflux.log.appends_total` – counter with a `log` label
#[inline]
pub fn record_append(log: &str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("conflux.log.appends_total", "log" => log.to_string()).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = log;
    }
}

/// Record entries removed from a log by truncation.
///
/// - `conflux.log.truncated_total` – counter with a `log` label
#[inline]
pub fn record_truncate(log: &str, removed: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("conflux.log.truncated_total", "log" => log.to_string())
            .increment(removed as u64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (log, removed);
    }
}

/// Record a propagation failure that was isolated from the source operation.
///
/// - `conflux.strategy.isolated_failures_total` – counter with a `strategy` label
#[inline]
pub fn record_isolated_failure(strategy: &str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!(
            "conflux.strategy.isolated_failures_total",
            "strategy" => strategy.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = strategy;
    }
}
