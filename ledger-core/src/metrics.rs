//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `ledger_commits_total{status}` - Committed audit records by status
//! - `ledger_commit_duration_seconds` - Histogram of commit latencies
//! - `ledger_persistence_failures_total` - Commits rolled back by storage
//! - `ledger_reservations_active` - Outstanding admission holds
//! - `ledger_remaining_budget` - Balance after the last commit

use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
///
/// Each instance owns its registry, so several ledgers can live in one process.
#[derive(Clone)]
pub struct Metrics {
    /// Commits by status
    pub commits_total: IntCounterVec,

    /// Commit duration histogram
    pub commit_duration: Histogram,

    /// Failed atomic commits
    pub persistence_failures: IntCounter,

    /// Outstanding reservations
    pub reservations_active: IntGauge,

    /// Remaining budget
    pub remaining_budget: Gauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("reservations_active", &self.reservations_active.get())
            .field("persistence_failures", &self.persistence_failures.get())
            .finish()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let commits_total = IntCounterVec::new(
            Opts::new("ledger_commits_total", "Committed audit records by status"),
            &["status"],
        )?;
        registry.register(Box::new(commits_total.clone()))?;

        let commit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_commit_duration_seconds",
                "Histogram of atomic commit latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
        )?;
        registry.register(Box::new(commit_duration.clone()))?;

        let persistence_failures = IntCounter::new(
            "ledger_persistence_failures_total",
            "Atomic commits rolled back by the storage backend",
        )?;
        registry.register(Box::new(persistence_failures.clone()))?;

        let reservations_active = IntGauge::new(
            "ledger_reservations_active",
            "Outstanding admission reservations",
        )?;
        registry.register(Box::new(reservations_active.clone()))?;

        let remaining_budget = Gauge::new(
            "ledger_remaining_budget",
            "Remaining budget after the last commit",
        )?;
        registry.register(Box::new(remaining_budget.clone()))?;

        Ok(Self {
            commits_total,
            commit_duration,
            persistence_failures,
            reservations_active,
            remaining_budget,
            registry,
        })
    }

    /// Record a committed audit record
    pub fn record_commit(&self, status: &str, duration_seconds: f64) {
        self.commits_total.with_label_values(&[status]).inc();
        self.commit_duration.observe(duration_seconds);
    }

    /// Record a rolled-back commit
    pub fn record_persistence_failure(&self) {
        self.persistence_failures.inc();
    }

    /// Update outstanding reservation count
    pub fn set_reservations(&self, count: usize) {
        self.reservations_active.set(count as i64);
    }

    /// Update remaining budget gauge
    pub fn set_remaining_budget(&self, amount: f64) {
        self.remaining_budget.set(amount);
    }

    /// Commits recorded for a status
    pub fn commits(&self, status: &str) -> u64 {
        self.commits_total.with_label_values(&[status]).get()
    }

    /// Text exposition format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.commits("success"), 0);
        assert_eq!(metrics.persistence_failures.get(), 0);
    }

    #[test]
    fn test_independent_registries() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_commit("blocked", 0.001);

        assert_eq!(a.commits("blocked"), 1);
        assert_eq!(b.commits("blocked"), 0);
    }

    #[test]
    fn test_render_exposition() {
        let metrics = Metrics::new().unwrap();
        metrics.record_commit("success", 0.002);
        metrics.set_reservations(2);
        metrics.set_remaining_budget(9.95);

        let text = metrics.render().unwrap();
        assert!(text.contains("ledger_commits_total{status=\"success\"} 1"));
        assert!(text.contains("ledger_reservations_active 2"));
        assert!(text.contains("ledger_remaining_budget 9.95"));
    }
}
