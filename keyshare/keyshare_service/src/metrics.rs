pub use metrics::*;
use std::sync::LazyLock;

pub static KEYSHARE_SUBMISSIONS_TOTAL: LazyLock<Result<IntCounterVec>> = LazyLock::new(|| {
    try_create_int_counter_vec(
        "keyshare_submissions_total",
        "Count of keyshare submissions by outcome",
        &["outcome"],
    )
});
pub static KEYSHARE_ROTATIONS_TOTAL: LazyLock<Result<IntCounterVec>> = LazyLock::new(|| {
    try_create_int_counter_vec(
        "keyshare_rotations_total",
        "Count of share rotation events by outcome",
        &["outcome"],
    )
});
pub static KEYSHARE_DERIVATION_SECONDS: LazyLock<Result<Histogram>> = LazyLock::new(|| {
    try_create_histogram(
        "keyshare_derivation_seconds",
        "Time taken to derive a partial decryption key and its commitment.",
    )
});
pub static KEYSHARE_LATEST_OBSERVED_HEIGHT: LazyLock<Result<IntGauge>> = LazyLock::new(|| {
    try_create_int_gauge(
        "keyshare_latest_observed_height",
        "Height of the most recent block header received from the chain.",
    )
});
