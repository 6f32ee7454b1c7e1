//! Prometheus collectors for the regeneration core.
//!
//! Each crate in this workspace defines its own metrics module against a small set of shared
//! registration helpers; since this crate doesn't depend on a separate metrics-registration
//! workspace member, the thin `try_create_*` wrappers are inlined here instead (see DESIGN.md).
//! The call-site convention — `metrics::inc_counter_vec(&metrics::FOO, labels)` — matches the
//! pattern used elsewhere in the workspace, e.g. `data_availability_checker.rs`.

use once_cell::sync::Lazy;
use prometheus::{HistogramVec, IntCounterVec, IntGauge, Opts};

fn try_create_int_counter_vec(
    name: &str,
    help: &str,
    label_names: &[&str],
) -> prometheus::Result<IntCounterVec> {
    let counter = IntCounterVec::new(Opts::new(name, help), label_names)?;
    prometheus::default_registry().register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn try_create_histogram_vec(
    name: &str,
    help: &str,
    label_names: &[&str],
) -> prometheus::Result<HistogramVec> {
    let histogram = HistogramVec::new(prometheus::HistogramOpts::new(name, help), label_names)?;
    prometheus::default_registry().register(Box::new(histogram.clone()))?;
    Ok(histogram)
}

fn try_create_int_gauge(name: &str, help: &str) -> prometheus::Result<IntGauge> {
    let gauge = IntGauge::new(name, help)?;
    prometheus::default_registry().register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

/// One increment per facade operation that misses its fast-path cache and reaches the queue,
/// labeled `(caller, entrypoint)`.
pub static REGEN_FN_REQUESTS_TOTAL: Lazy<prometheus::Result<IntCounterVec>> = Lazy::new(|| {
    try_create_int_counter_vec(
        "regen_fn_requests_total",
        "Count of regen requests submitted to the bounded job queue",
        &["caller", "entrypoint"],
    )
});

/// Job execution wall time, labeled `(caller, entrypoint)`.
pub static REGEN_FN_DURATION_SECONDS: Lazy<prometheus::Result<HistogramVec>> = Lazy::new(|| {
    try_create_histogram_vec(
        "regen_fn_duration_seconds",
        "Wall time spent executing a regen job",
        &["caller", "entrypoint"],
    )
});

/// Count of regen jobs that failed, labeled `(caller, entrypoint)`.
pub static REGEN_FN_TOTAL_ERRORS: Lazy<prometheus::Result<IntCounterVec>> = Lazy::new(|| {
    try_create_int_counter_vec(
        "regen_fn_total_errors",
        "Count of regen jobs that failed",
        &["caller", "entrypoint"],
    )
});

/// Current pending + in-flight count in the bounded job queue.
pub static REGEN_QUEUE_LEN: Lazy<prometheus::Result<IntGauge>> =
    Lazy::new(|| try_create_int_gauge("regen_queue_len", "Current length of the regen job queue"));

pub fn inc_counter_vec(metric: &prometheus::Result<IntCounterVec>, labels: &[&str]) {
    if let Ok(metric) = metric {
        metric.with_label_values(labels).inc();
    }
}

/// Starts a timer against a `(caller, entrypoint)`-labeled histogram; call `.observe_duration()`
/// on the returned timer when the job finishes.
pub fn start_timer(
    metric: &prometheus::Result<HistogramVec>,
    labels: &[&str],
) -> Option<prometheus::HistogramTimer> {
    metric
        .as_ref()
        .ok()
        .map(|metric| metric.with_label_values(labels).start_timer())
}

pub fn set_gauge(metric: &prometheus::Result<IntGauge>, value: i64) {
    if let Ok(metric) = metric {
        metric.set(value);
    }
}
