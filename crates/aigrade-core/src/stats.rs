//! Per-pipeline atomic counters.
//!
//! A [`GradingStats`] is shared by `Arc` with whatever grades through it.
//! Increments are silent; [`GradingStats::flush`] emits one `info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct GradingStats {
    passes_attempted: AtomicU64,
    passes_failed: AtomicU64,
    consensus_runs: AtomicU64,
    retries: AtomicU64,
    scorer_fallbacks: AtomicU64,
    results_accepted: AtomicU64,
    requests_failed: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub passes_attempted: u64,
    pub passes_failed: u64,
    pub consensus_runs: u64,
    pub retries: u64,
    pub scorer_fallbacks: u64,
    pub results_accepted: u64,
    pub requests_failed: u64,
}

impl GradingStats {
    pub const fn new() -> Self {
        Self {
            passes_attempted: AtomicU64::new(0),
            passes_failed: AtomicU64::new(0),
            consensus_runs: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            scorer_fallbacks: AtomicU64::new(0),
            results_accepted: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
        }
    }

    pub fn add_passes(&self, attempted: usize, failed: usize) {
        self.passes_attempted
            .fetch_add(attempted as u64, Ordering::Relaxed);
        self.passes_failed.fetch_add(failed as u64, Ordering::Relaxed);
    }

    pub fn inc_consensus_runs(&self) {
        self.consensus_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_scorer_fallbacks(&self, n: usize) {
        self.scorer_fallbacks.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn inc_results_accepted(&self) {
        self.results_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_requests_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            passes_attempted: self.passes_attempted.load(Ordering::Relaxed),
            passes_failed: self.passes_failed.load(Ordering::Relaxed),
            consensus_runs: self.consensus_runs.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            scorer_fallbacks: self.scorer_fallbacks.load(Ordering::Relaxed),
            results_accepted: self.results_accepted.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
        }
    }

    /// Emit all counters as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            passes_attempted = s.passes_attempted,
            passes_failed = s.passes_failed,
            consensus_runs = s.consensus_runs,
            retries = s.retries,
            scorer_fallbacks = s.scorer_fallbacks,
            results_accepted = s.results_accepted,
            requests_failed = s.requests_failed,
        );
    }
}
