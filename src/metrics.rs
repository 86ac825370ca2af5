//! # Metrics
//!
//! Prometheus metrics for monitoring sync activity, exposed by the
//! webhook listener's `/metrics` endpoint.
//!
//! ## Metrics Exposed
//!
//! - `secret_sync_runs_total` - Total number of sync runs
//! - `secret_sync_failures_total` - Total number of per-platform sync failures
//! - `secret_sync_secrets_added_total` - Secrets added per platform
//! - `secret_sync_secrets_rewritten_total` - Secrets rewritten per platform
//! - `secret_sync_secrets_removed_total` - Secrets removed per platform

use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static SYNC_RUNS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("secret_sync_runs_total", "Total number of sync runs")
        .expect("Failed to create SYNC_RUNS_TOTAL metric - this should never happen")
});

static SYNC_FAILURES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "secret_sync_failures_total",
            "Total number of per-platform sync failures",
        ),
        &["platform"],
    )
    .expect("Failed to create SYNC_FAILURES_TOTAL metric - this should never happen")
});

static SECRETS_ADDED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "secret_sync_secrets_added_total",
            "Total number of secrets added per platform",
        ),
        &["platform"],
    )
    .expect("Failed to create SECRETS_ADDED_TOTAL metric - this should never happen")
});

static SECRETS_REWRITTEN_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "secret_sync_secrets_rewritten_total",
            "Total number of secrets rewritten per platform",
        ),
        &["platform"],
    )
    .expect("Failed to create SECRETS_REWRITTEN_TOTAL metric - this should never happen")
});

static SECRETS_REMOVED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "secret_sync_secrets_removed_total",
            "Total number of secrets removed per platform",
        ),
        &["platform"],
    )
    .expect("Failed to create SECRETS_REMOVED_TOTAL metric - this should never happen")
});

/// Register all metrics with the registry. Called once at listener
/// startup; the CLI path records into unregistered collectors, which is
/// harmless.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(SYNC_RUNS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SYNC_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SECRETS_ADDED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SECRETS_REWRITTEN_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SECRETS_REMOVED_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_sync_runs() {
    SYNC_RUNS_TOTAL.inc();
}

pub fn increment_sync_failures(platform: &str) {
    SYNC_FAILURES_TOTAL.with_label_values(&[platform]).inc();
}

pub fn record_platform_counts(platform: &str, added: usize, rewritten: usize, removed: usize) {
    SECRETS_ADDED_TOTAL
        .with_label_values(&[platform])
        .inc_by(added as u64);
    SECRETS_REWRITTEN_TOTAL
        .with_label_values(&[platform])
        .inc_by(rewritten as u64);
    SECRETS_REMOVED_TOTAL
        .with_label_values(&[platform])
        .inc_by(removed as u64);
}
