use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Run-wide counters. Region scans running on different threads record into
/// the same instance; repair and delete passes record afterwards.
#[derive(Debug, Default)]
pub struct ScanMetrics {
    // Regions
    pub regions_scanned: AtomicUsize,
    pub regions_skipped: AtomicUsize,
    pub total_scan_time_us: AtomicU64,
    pub max_scan_time_us: AtomicU64,

    // Chunks
    pub chunks_total: AtomicUsize,
    pub chunks_corrupt: AtomicUsize,
    pub chunks_misplaced: AtomicUsize,

    // Repair
    pub chunks_fixed: AtomicUsize,
    pub chunks_unresolved: AtomicUsize,
    pub chunks_deleted: AtomicUsize,

    // Session
    pub start_time: Option<Instant>,
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn record_region(&self, duration: Duration, chunks: usize, corrupt: usize, misplaced: usize) {
        self.regions_scanned.fetch_add(1, Ordering::Relaxed);
        let us = duration.as_micros() as u64;
        self.total_scan_time_us.fetch_add(us, Ordering::Relaxed);
        self.max_scan_time_us.fetch_max(us, Ordering::Relaxed);

        self.chunks_total.fetch_add(chunks, Ordering::Relaxed);
        self.chunks_corrupt.fetch_add(corrupt, Ordering::Relaxed);
        self.chunks_misplaced.fetch_add(misplaced, Ordering::Relaxed);
    }

    pub fn record_skipped_region(&self) {
        self.regions_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_repair(&self, fixed: usize, unresolved: usize) {
        self.chunks_fixed.fetch_add(fixed, Ordering::Relaxed);
        self.chunks_unresolved.fetch_add(unresolved, Ordering::Relaxed);
    }

    pub fn record_deleted(&self, deleted: usize) {
        self.chunks_deleted.fetch_add(deleted, Ordering::Relaxed);
    }

    pub fn generate_report(&self) -> String {
        let uptime = self.start_time.unwrap_or_else(Instant::now).elapsed();
        let scanned = self.regions_scanned.load(Ordering::Relaxed);
        let skipped = self.regions_skipped.load(Ordering::Relaxed);
        let scan_time_total = self.total_scan_time_us.load(Ordering::Relaxed) as f64 / 1000.0; // ms
        let scan_max = self.max_scan_time_us.load(Ordering::Relaxed) as f64 / 1000.0; // ms
        let scan_avg = if scanned > 0 { scan_time_total / scanned as f64 } else { 0.0 };

        let total = self.chunks_total.load(Ordering::Relaxed);
        let corrupt = self.chunks_corrupt.load(Ordering::Relaxed);
        let misplaced = self.chunks_misplaced.load(Ordering::Relaxed);
        let healthy = total.saturating_sub(corrupt + misplaced);

        let fixed = self.chunks_fixed.load(Ordering::Relaxed);
        let unresolved = self.chunks_unresolved.load(Ordering::Relaxed);
        let deleted = self.chunks_deleted.load(Ordering::Relaxed);

        format!(
            "Region Fixer Report\n\
             ===================\n\
             Session Duration: {:.2?}\n\n\
             [Regions]\n\
             Scanned: {}\n\
             Skipped: {}\n\
             Avg Time: {:.2} ms/region\n\
             Max Time: {:.2} ms\n\n\
             [Chunks]\n\
             Total: {}\n\
             Healthy: {}\n\
             Corrupted: {}\n\
             Wrong Located: {}\n\n\
             [Repair]\n\
             Fixed: {}\n\
             Unresolved: {}\n\
             Deleted: {}\n",
            uptime,
            scanned, skipped, scan_avg, scan_max,
            total, healthy, corrupt, misplaced,
            fixed, unresolved, deleted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = ScanMetrics::new();
        metrics.record_region(Duration::from_millis(3), 10, 2, 1);
        metrics.record_region(Duration::from_millis(1), 5, 0, 0);
        metrics.record_skipped_region();
        metrics.record_repair(2, 1);
        metrics.record_deleted(1);

        assert_eq!(metrics.regions_scanned.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.chunks_total.load(Ordering::Relaxed), 15);
        assert_eq!(metrics.max_scan_time_us.load(Ordering::Relaxed), 3000);

        let report = metrics.generate_report();
        assert!(report.contains("Scanned: 2"));
        assert!(report.contains("Skipped: 1"));
        assert!(report.contains("Healthy: 12"));
        assert!(report.contains("Fixed: 2"));
        assert!(report.contains("Deleted: 1"));
    }
}
