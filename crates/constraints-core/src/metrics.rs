//! Global atomic counters for the request loop.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (at shutdown, or when the guard fires).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    requests: AtomicU64,
    pings: AtomicU64,
    successes: AtomicU64,
    diagnostics: AtomicU64,
    panics: AtomicU64,
    timeouts: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            pings: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            diagnostics: AtomicU64::new(0),
            panics: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        }
    }

    /// A line was read (any kind, pings included).
    pub fn inc_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "requests", "counter incremented");
    }

    pub fn inc_pings(&self) {
        self.pings.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "pings", "counter incremented");
    }

    pub fn inc_successes(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "successes", "counter incremented");
    }

    /// A request answered with an `error` framing.
    pub fn inc_diagnostics(&self) {
        self.diagnostics.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "diagnostics", "counter incremented");
    }

    /// A request answered with a `panic` framing; the loop continued.
    pub fn inc_panics(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "panics", "counter incremented");
    }

    pub fn inc_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "timeouts", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            requests = self.requests(),
            pings = self.pings(),
            successes = self.successes(),
            diagnostics = self.diagnostics(),
            panics = self.panics(),
            timeouts = self.timeouts(),
        );
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn pings(&self) -> u64 {
        self.pings.load(Ordering::Relaxed)
    }

    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    pub fn diagnostics(&self) -> u64 {
        self.diagnostics.load(Ordering::Relaxed)
    }

    pub fn panics(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        assert_eq!(m.requests(), 0);
        m.inc_requests();
        m.inc_requests();
        m.inc_pings();
        assert_eq!(m.requests(), 2);
        assert_eq!(m.pings(), 1);

        m.inc_successes();
        m.inc_diagnostics();
        m.inc_diagnostics();
        m.inc_panics();
        m.inc_timeouts();
        assert_eq!(m.successes(), 1);
        assert_eq!(m.diagnostics(), 2);
        assert_eq!(m.panics(), 1);
        assert_eq!(m.timeouts(), 1);
    }
}
