use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use powgate_core::ErrorCode;

/// Cheap-to-clone handle over the server's runtime counters.
#[derive(Clone)]
pub struct ServerObservability {
    started_at: Instant,
    quotes_served_total: Arc<AtomicU64>,
    rejected_total: Arc<dashmap::DashMap<&'static str, AtomicU64>>,
}

impl ServerObservability {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            quotes_served_total: Arc::new(AtomicU64::new(0)),
            rejected_total: Arc::new(dashmap::DashMap::new()),
        }
    }

    pub fn record_quote_served(&self) {
        self.quotes_served_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self, code: ErrorCode) {
        let entry = self
            .rejected_total
            .entry(rejection_label(code))
            .or_insert_with(|| AtomicU64::new(0));
        entry.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> ObservabilitySnapshot {
        let mut rejected = BTreeMap::new();
        for item in self.rejected_total.iter() {
            rejected.insert(*item.key(), item.value().load(Ordering::Relaxed));
        }
        ObservabilitySnapshot {
            uptime: self.started_at.elapsed(),
            quotes_served_total: self.quotes_served_total.load(Ordering::Relaxed),
            rejected_total: rejected,
        }
    }
}

impl Default for ServerObservability {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct ObservabilitySnapshot {
    pub uptime: Duration,
    pub quotes_served_total: u64,
    pub rejected_total: BTreeMap<&'static str, u64>,
}

fn rejection_label(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::InvalidMessage => "invalid_message",
        ErrorCode::InvalidSolution => "invalid_solution",
        ErrorCode::RateLimitExceeded => "rate_limited",
        ErrorCode::Timeout => "timeout",
        ErrorCode::InternalError => "internal",
    }
}
