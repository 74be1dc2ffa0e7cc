pub use metrics::*;
use std::sync::LazyLock;

pub static KEYSHARE_PROCESSOR_WORK_EVENTS_SUBMITTED_COUNT: LazyLock<Result<IntCounterVec>> =
    LazyLock::new(|| {
        try_create_int_counter_vec(
            "keyshare_processor_work_events_submitted_count",
            "Count of work items submitted",
            &["type"],
        )
    });
pub static KEYSHARE_PROCESSOR_WORK_EVENTS_STARTED_COUNT: LazyLock<Result<IntCounterVec>> =
    LazyLock::new(|| {
        try_create_int_counter_vec(
            "keyshare_processor_work_events_started_count",
            "Count of work items which have been started by a worker",
            &["type"],
        )
    });
pub static KEYSHARE_PROCESSOR_WORKER_TIME: LazyLock<Result<HistogramVec>> = LazyLock::new(|| {
    try_create_histogram_vec(
        "keyshare_processor_worker_time",
        "Time taken for a worker to fully process a work item.",
        &["type"],
    )
});
pub static KEYSHARE_PROCESSOR_WORKERS_ACTIVE_TOTAL: LazyLock<Result<IntGauge>> =
    LazyLock::new(|| {
        try_create_int_gauge(
            "keyshare_processor_workers_active_total",
            "Count of active workers, with or without permit.",
        )
    });
pub static KEYSHARE_PROCESSOR_PERMIT_WORKERS_ACTIVE_TOTAL: LazyLock<Result<IntGauge>> =
    LazyLock::new(|| {
        try_create_int_gauge(
            "keyshare_processor_permit_workers_active_total",
            "Count of active key derivation workers, each holding one permit.",
        )
    });

/// Errors and Debugging Stats
pub static KEYSHARE_PROCESSOR_SEND_ERROR_PER_WORK_TYPE: LazyLock<Result<IntCounterVec>> =
    LazyLock::new(|| {
        try_create_int_counter_vec(
            "keyshare_processor_send_error_per_work_type",
            "Total number of processor send errors per work type",
            &["type"],
        )
    });
