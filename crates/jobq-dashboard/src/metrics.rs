use jobq_core::QueueStatus;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntGauge, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static JOBS_PENDING: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("jobs_pending", "Jobs waiting to run").unwrap());

pub static JOBS_PROCESSING: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("jobs_processing", "Jobs currently claimed").unwrap());

pub static JOBS_COMPLETED: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("jobs_completed", "Jobs finished successfully").unwrap());

pub static JOBS_FAILED: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("jobs_failed", "Jobs awaiting a retry").unwrap());

pub static JOBS_DEAD: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("jobs_dead", "Jobs moved to the dead letter queue").unwrap());

pub static ACTIVE_WORKERS: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("active_workers", "Workers with a fresh heartbeat").unwrap());

pub fn init_metrics() {
    // Ignore errors if called multiple times (common in tests)
    let _ = REGISTRY.register(Box::new(JOBS_PENDING.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_PROCESSING.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_COMPLETED.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_FAILED.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_DEAD.clone()));
    let _ = REGISTRY.register(Box::new(ACTIVE_WORKERS.clone()));
}

/// Snapshot the queue counts into the gauges; called per scrape.
pub fn record(status: &QueueStatus) {
    JOBS_PENDING.set(status.pending);
    JOBS_PROCESSING.set(status.processing);
    JOBS_COMPLETED.set(status.completed);
    JOBS_FAILED.set(status.failed);
    JOBS_DEAD.set(status.dead);
    ACTIVE_WORKERS.set(status.active_workers);
}

pub fn gather() -> String {
    let metric_families = REGISTRY.gather();
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&metric_families, &mut buf).unwrap();
    String::from_utf8(buf).unwrap()
}
