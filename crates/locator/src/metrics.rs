use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory counters exposed at `/metrics` in Prometheus text format.
#[derive(Default)]
pub struct Metrics {
    pub lookups_issued_total: AtomicU64,
    pub lookup_errors_total: AtomicU64,
    pub passes_total: AtomicU64,
    pub stale_invalidations_total: AtomicU64,
    pub requests_enqueued_total: AtomicU64,
    pub requests_resolved_total: AtomicU64,
    pub queue_depth: AtomicU64,
    pub backoff_attempt: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_lookups_issued(&self, n: u64) {
        self.lookups_issued_total.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_lookup_errors(&self) {
        self.lookup_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_enqueued(&self) {
        self.requests_enqueued_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pass(&self, restarts: u32, resolved: usize, queue_depth: usize) {
        self.passes_total.fetch_add(1, Ordering::Relaxed);
        self.stale_invalidations_total
            .fetch_add(u64::from(restarts), Ordering::Relaxed);
        self.requests_resolved_total
            .fetch_add(resolved as u64, Ordering::Relaxed);
        self.queue_depth.store(queue_depth as u64, Ordering::Relaxed);
    }

    pub fn set_backoff_attempt(&self, attempt: u32) {
        self.backoff_attempt.store(u64::from(attempt), Ordering::Relaxed);
    }

    pub fn render_prometheus(&self) -> String {
        let series: [(&str, &str, &AtomicU64); 8] = [
            ("taskfiles_lookups_issued_total", "counter", &self.lookups_issued_total),
            ("taskfiles_lookup_errors_total", "counter", &self.lookup_errors_total),
            ("taskfiles_passes_total", "counter", &self.passes_total),
            ("taskfiles_stale_invalidations_total", "counter", &self.stale_invalidations_total),
            ("taskfiles_requests_enqueued_total", "counter", &self.requests_enqueued_total),
            ("taskfiles_requests_resolved_total", "counter", &self.requests_resolved_total),
            ("taskfiles_queue_depth", "gauge", &self.queue_depth),
            ("taskfiles_backoff_attempt", "gauge", &self.backoff_attempt),
        ];
        let mut out = String::new();
        for (name, kind, value) in series {
            out.push_str(&format!("# TYPE {name} {kind}\n"));
            out.push_str(&format!("{name} {}\n", value.load(Ordering::Relaxed)));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_every_series() {
        let m = Metrics::new();
        m.inc_lookups_issued(3);
        m.record_pass(1, 2, 5);
        let text = m.render_prometheus();
        assert!(text.contains("# TYPE taskfiles_lookups_issued_total counter\n"));
        assert!(text.contains("taskfiles_lookups_issued_total 3\n"));
        assert!(text.contains("taskfiles_stale_invalidations_total 1\n"));
        assert!(text.contains("taskfiles_requests_resolved_total 2\n"));
        assert!(text.contains("taskfiles_queue_depth 5\n"));
    }
}
