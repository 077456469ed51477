//! Scan engine counters and route latency histogram
//!
//! Counters are plain atomics bumped from the dispatcher; `report()` swaps
//! the latency buckets out so each summary covers one interval.
//!
//! Relaxed ordering throughout. These values are for reporting only and
//! never drive routing.

use crate::domain::types::{MatchKind, ScanSource};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Upper bounds of the route latency buckets (microseconds); the last
/// bucket takes everything above 51.2ms and reports as 102.4ms
const BUCKET_UPPER_US: [u64; NUM_BUCKETS] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];
const NUM_BUCKETS: usize = 11;

fn bucket_index(latency_us: u64) -> usize {
    BUCKET_UPPER_US[..NUM_BUCKETS - 1].partition_point(|&bound| bound < latency_us)
}

/// Upper bound of the bucket holding the given percentile; 0 when empty
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }
    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;
    for (count, bound) in buckets.iter().zip(BUCKET_UPPER_US) {
        cumulative += count;
        if cumulative >= target {
            return bound;
        }
    }
    BUCKET_UPPER_US[NUM_BUCKETS - 1]
}

/// Interval latency histogram, drained by `take`
struct LatencyHistogram {
    buckets: [AtomicU64; NUM_BUCKETS],
    sum_us: AtomicU64,
    max_us: AtomicU64,
    count: AtomicU64,
}

/// Values drained from a `LatencyHistogram`
struct LatencyWindow {
    count: u64,
    avg_us: u64,
    max_us: u64,
    p99_us: u64,
}

impl LatencyHistogram {
    fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            sum_us: AtomicU64::new(0),
            max_us: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    fn record(&self, latency_us: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.max_us.fetch_max(latency_us, Ordering::Relaxed);
        self.buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
    }

    fn take(&self) -> LatencyWindow {
        let count = self.count.swap(0, Ordering::Relaxed);
        let sum = self.sum_us.swap(0, Ordering::Relaxed);
        let buckets: [u64; NUM_BUCKETS] = std::array::from_fn(|i| self.buckets[i].swap(0, Ordering::Relaxed));
        LatencyWindow {
            count,
            avg_us: if count > 0 { sum / count } else { 0 },
            max_us: self.max_us.swap(0, Ordering::Relaxed),
            p99_us: percentile_from_buckets(&buckets, 0.99),
        }
    }
}

/// Scan engine metrics shared by the dispatcher, router and sync worker
pub struct Metrics {
    /// Scans completed by an Enter terminator (monotonic)
    scans_hid_enter: AtomicU64,
    /// Scans completed by the quiet-period timeout (monotonic)
    scans_hid_timeout: AtomicU64,
    /// Scans delivered by the camera (monotonic)
    scans_camera: AtomicU64,
    /// Terminated input too short to be a code (monotonic)
    scans_too_short: AtomicU64,
    /// Scans dropped by the dirty-form guard (monotonic)
    scans_blocked: AtomicU64,
    /// Lookups resolved to a single exact match
    lookup_exact: AtomicU64,
    /// Lookups resolved to a single partial match
    lookup_partial: AtomicU64,
    /// Lookups with no match (new record)
    lookup_miss: AtomicU64,
    /// Lookups that produced a candidate list
    lookup_ambiguous: AtomicU64,
    renames_ok: AtomicU64,
    renames_failed: AtomicU64,
    inline_writes: AtomicU64,
    inline_discards: AtomicU64,
    auto_saves: AtomicU64,
    /// Errors raised by store / form / view collaborators
    collaborator_errors: AtomicU64,
    /// Sync requests dropped because the worker queue was full
    sync_dropped: AtomicU64,
    /// Time spent routing completed scans (reset on report)
    route_latency: LatencyHistogram,
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            scans_hid_enter: AtomicU64::new(0),
            scans_hid_timeout: AtomicU64::new(0),
            scans_camera: AtomicU64::new(0),
            scans_too_short: AtomicU64::new(0),
            scans_blocked: AtomicU64::new(0),
            lookup_exact: AtomicU64::new(0),
            lookup_partial: AtomicU64::new(0),
            lookup_miss: AtomicU64::new(0),
            lookup_ambiguous: AtomicU64::new(0),
            renames_ok: AtomicU64::new(0),
            renames_failed: AtomicU64::new(0),
            inline_writes: AtomicU64::new(0),
            inline_discards: AtomicU64::new(0),
            auto_saves: AtomicU64::new(0),
            collaborator_errors: AtomicU64::new(0),
            sync_dropped: AtomicU64::new(0),
            route_latency: LatencyHistogram::new(),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    pub fn record_scan_completed(&self, source: ScanSource) {
        let counter = match source {
            ScanSource::HidEnter => &self.scans_hid_enter,
            ScanSource::HidTimeout => &self.scans_hid_timeout,
            ScanSource::Camera => &self.scans_camera,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan_too_short(&self) {
        self.scans_too_short.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan_blocked(&self) {
        self.scans_blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lookup_hit(&self, kind: MatchKind) {
        let counter = match kind {
            MatchKind::Exact => &self.lookup_exact,
            MatchKind::Partial => &self.lookup_partial,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lookup_miss(&self) {
        self.lookup_miss.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lookup_ambiguous(&self) {
        self.lookup_ambiguous.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rename(&self, ok: bool) {
        let counter = if ok { &self.renames_ok } else { &self.renames_failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inline_write(&self, written: bool) {
        let counter = if written { &self.inline_writes } else { &self.inline_discards };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auto_save(&self) {
        self.auto_saves.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_collaborator_error(&self) {
        self.collaborator_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sync_dropped(&self) {
        self.sync_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_route_latency(&self, latency_us: u64) {
        self.route_latency.record(latency_us);
    }

    pub fn scans_total(&self) -> u64 {
        self.scans_hid_enter.load(Ordering::Relaxed)
            + self.scans_hid_timeout.load(Ordering::Relaxed)
            + self.scans_camera.load(Ordering::Relaxed)
    }

    pub fn scans_blocked(&self) -> u64 {
        self.scans_blocked.load(Ordering::Relaxed)
    }

    pub fn collaborator_errors(&self) -> u64 {
        self.collaborator_errors.load(Ordering::Relaxed)
    }

    pub fn renames_failed(&self) -> u64 {
        self.renames_failed.load(Ordering::Relaxed)
    }

    /// Produce a summary, resetting the periodic latency counters
    pub fn report(&self) -> MetricsSummary {
        let latency = self.route_latency.take();

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let scans_per_min = if elapsed.as_secs_f64() > 0.0 {
            latency.count as f64 * 60.0 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            scans_total: self.scans_total(),
            scans_hid_enter: self.scans_hid_enter.load(Ordering::Relaxed),
            scans_hid_timeout: self.scans_hid_timeout.load(Ordering::Relaxed),
            scans_camera: self.scans_camera.load(Ordering::Relaxed),
            scans_too_short: self.scans_too_short.load(Ordering::Relaxed),
            scans_blocked: self.scans_blocked.load(Ordering::Relaxed),
            lookup_exact: self.lookup_exact.load(Ordering::Relaxed),
            lookup_partial: self.lookup_partial.load(Ordering::Relaxed),
            lookup_miss: self.lookup_miss.load(Ordering::Relaxed),
            lookup_ambiguous: self.lookup_ambiguous.load(Ordering::Relaxed),
            renames_ok: self.renames_ok.load(Ordering::Relaxed),
            renames_failed: self.renames_failed.load(Ordering::Relaxed),
            inline_writes: self.inline_writes.load(Ordering::Relaxed),
            inline_discards: self.inline_discards.load(Ordering::Relaxed),
            auto_saves: self.auto_saves.load(Ordering::Relaxed),
            collaborator_errors: self.collaborator_errors.load(Ordering::Relaxed),
            sync_dropped: self.sync_dropped.load(Ordering::Relaxed),
            scans_per_min,
            avg_route_latency_us: latency.avg_us,
            max_route_latency_us: latency.max_us,
            route_p99_us: latency.p99_us,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub scans_total: u64,
    pub scans_hid_enter: u64,
    pub scans_hid_timeout: u64,
    pub scans_camera: u64,
    pub scans_too_short: u64,
    pub scans_blocked: u64,
    pub lookup_exact: u64,
    pub lookup_partial: u64,
    pub lookup_miss: u64,
    pub lookup_ambiguous: u64,
    pub renames_ok: u64,
    pub renames_failed: u64,
    pub inline_writes: u64,
    pub inline_discards: u64,
    pub auto_saves: u64,
    pub collaborator_errors: u64,
    pub sync_dropped: u64,
    pub scans_per_min: f64,
    pub avg_route_latency_us: u64,
    pub max_route_latency_us: u64,
    /// 99th percentile routing latency (µs)
    pub route_p99_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            scans_total = %self.scans_total,
            hid_enter = %self.scans_hid_enter,
            hid_timeout = %self.scans_hid_timeout,
            camera = %self.scans_camera,
            too_short = %self.scans_too_short,
            blocked = %self.scans_blocked,
            exact = %self.lookup_exact,
            partial = %self.lookup_partial,
            miss = %self.lookup_miss,
            ambiguous = %self.lookup_ambiguous,
            renames_ok = %self.renames_ok,
            renames_failed = %self.renames_failed,
            inline_writes = %self.inline_writes,
            inline_discards = %self.inline_discards,
            auto_saves = %self.auto_saves,
            collaborator_errors = %self.collaborator_errors,
            sync_dropped = %self.sync_dropped,
            scans_per_min = format!("{:.1}", self.scans_per_min),
            avg_route_us = %self.avg_route_latency_us,
            max_route_us = %self.max_route_latency_us,
            p99_route_us = %self.route_p99_us,
            "metrics"
        );
    }
}
