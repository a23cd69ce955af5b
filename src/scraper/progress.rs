//! Thread-safe progress counters with derived rate and ETA.

use std::sync::RwLock;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Default)]
struct Counters {
    processed: u64,
    success: u64,
    failed: u64,
    skipped: u64,
    exact_match: u64,
    fuzzy_match: u64,
    no_match: u64,
    total_requests: u64,
    network_errors: u64,
    rate_limit_hits: u64,
    current_vehicle: String,
    last_error: String,
}

/// Shared between the workers, the feeder and the HTTP monitor.
pub struct ProgressTracker {
    started_at: DateTime<Utc>,
    started_instant: Instant,
    total: u64,
    counters: RwLock<Counters>,
}

impl ProgressTracker {
    pub fn new(total: u64) -> Self {
        Self {
            started_at: Utc::now(),
            started_instant: Instant::now(),
            total,
            counters: RwLock::new(Counters::default()),
        }
    }

    pub fn inc_processed(&self) {
        self.counters.write().unwrap().processed += 1;
    }

    pub fn inc_success(&self) {
        self.counters.write().unwrap().success += 1;
    }

    pub fn inc_failed(&self, error: &str) {
        let mut c = self.counters.write().unwrap();
        c.failed += 1;
        c.last_error = error.to_string();
    }

    pub fn inc_skipped(&self) {
        self.counters.write().unwrap().skipped += 1;
    }

    pub fn inc_exact_match(&self) {
        self.counters.write().unwrap().exact_match += 1;
    }

    pub fn inc_fuzzy_match(&self) {
        self.counters.write().unwrap().fuzzy_match += 1;
    }

    pub fn inc_no_match(&self) {
        self.counters.write().unwrap().no_match += 1;
    }

    pub fn inc_requests(&self) {
        self.counters.write().unwrap().total_requests += 1;
    }

    pub fn inc_network_errors(&self) {
        self.counters.write().unwrap().network_errors += 1;
    }

    pub fn inc_rate_limit_hits(&self) {
        self.counters.write().unwrap().rate_limit_hits += 1;
    }

    pub fn set_current_vehicle(&self, label: &str) {
        self.counters.write().unwrap().current_vehicle = label.to_string();
    }

    /// Immutable point-in-time view with derived figures.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let c = self.counters.read().unwrap();
        let elapsed = self.started_instant.elapsed().as_secs_f64();

        let percentage = if self.total > 0 {
            (c.processed as f64 / self.total as f64) * 100.0
        } else {
            0.0
        };
        let requests_per_sec = if elapsed > 0.0 {
            c.total_requests as f64 / elapsed
        } else {
            0.0
        };
        let avg_secs_per_vehicle = if c.processed > 0 {
            elapsed / c.processed as f64
        } else {
            0.0
        };

        let remaining = self.total.saturating_sub(c.processed);
        let remaining_secs = avg_secs_per_vehicle * remaining as f64;
        let estimated_completion = if c.processed > 0 {
            Some(Utc::now() + chrono::Duration::milliseconds((remaining_secs * 1000.0) as i64))
        } else {
            None
        };

        ProgressSnapshot {
            started_at: self.started_at,
            elapsed_secs: elapsed,
            total: self.total,
            processed: c.processed,
            success: c.success,
            failed: c.failed,
            skipped: c.skipped,
            percentage,
            exact_match: c.exact_match,
            fuzzy_match: c.fuzzy_match,
            no_match: c.no_match,
            total_requests: c.total_requests,
            network_errors: c.network_errors,
            rate_limit_hits: c.rate_limit_hits,
            requests_per_sec,
            avg_secs_per_vehicle,
            remaining,
            remaining_secs,
            estimated_completion,
            current_vehicle: c.current_vehicle.clone(),
            last_error: c.last_error.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub total: u64,
    pub processed: u64,
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
    pub percentage: f64,
    pub exact_match: u64,
    pub fuzzy_match: u64,
    pub no_match: u64,
    pub total_requests: u64,
    pub network_errors: u64,
    pub rate_limit_hits: u64,
    pub requests_per_sec: f64,
    pub avg_secs_per_vehicle: f64,
    pub remaining: u64,
    pub remaining_secs: f64,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub current_vehicle: String,
    pub last_error: String,
}
