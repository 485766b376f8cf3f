//! Metrics collection for runtime monitoring.

use crate::error::{Error, Result};
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// one hour, in nanoseconds
const MAX_TRACKED_LATENCY_NS: u64 = 3_600_000_000_000;

/// Counters shared by the workers and the coordinating thread.
#[derive(Debug)]
pub struct Metrics {
    tasks_executed: AtomicU64,
    tasks_panicked: AtomicU64,
    bulks_completed: AtomicU64,
    syncs: AtomicU64,
    idle_rounds: AtomicU64,
    busy_time_ns: AtomicU64,

    // one histogram per worker so recording never contends; merged on read
    latency_slots: Vec<Mutex<Histogram<u64>>>,

    start_time: Instant,
}

impl Metrics {
    /// Metrics for `workers` recording threads (at least one slot).
    pub fn new(workers: usize) -> Result<Self> {
        let histogram = Histogram::new_with_max(MAX_TRACKED_LATENCY_NS, 3)
            .map_err(|e| Error::telemetry(format!("latency histogram: {}", e)))?;
        let latency_slots = (0..workers.max(1))
            .map(|_| Mutex::new(histogram.clone()))
            .collect();

        Ok(Self {
            tasks_executed: AtomicU64::new(0),
            tasks_panicked: AtomicU64::new(0),
            bulks_completed: AtomicU64::new(0),
            syncs: AtomicU64::new(0),
            idle_rounds: AtomicU64::new(0),
            busy_time_ns: AtomicU64::new(0),
            latency_slots,
            start_time: Instant::now(),
        })
    }

    /// Record one successful task run by `worker`.
    pub fn record_task_execution(&self, worker: usize, duration_ns: u64) {
        self.tasks_executed.fetch_add(1, Ordering::Relaxed);
        self.busy_time_ns.fetch_add(duration_ns, Ordering::Relaxed);

        let slot = &self.latency_slots[worker % self.latency_slots.len()];
        slot.lock().saturating_record(duration_ns);
    }

    pub fn record_task_panic(&self) {
        self.tasks_panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bulk_completed(&self) {
        self.bulks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sync(&self) {
        self.syncs.fetch_add(1, Ordering::Relaxed);
    }

    /// Empty polls made by spinning workers.
    pub fn record_idle_rounds(&self, rounds: u64) {
        self.idle_rounds.fetch_add(rounds, Ordering::Relaxed);
    }

    fn merged_latency(&self) -> Histogram<u64> {
        // `new` always allocates at least one slot
        let mut merged = self.latency_slots[0].lock().clone();
        for slot in &self.latency_slots[1..] {
            if let Err(e) = merged.add(&*slot.lock()) {
                tracing::warn!(error = %e, "dropped a latency slot from the snapshot");
            }
        }
        merged
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let histogram = self.merged_latency();

        MetricsSnapshot {
            uptime: self.start_time.elapsed(),
            tasks_executed: self.tasks_executed.load(Ordering::Relaxed),
            tasks_panicked: self.tasks_panicked.load(Ordering::Relaxed),
            bulks_completed: self.bulks_completed.load(Ordering::Relaxed),
            syncs: self.syncs.load(Ordering::Relaxed),
            idle_rounds: self.idle_rounds.load(Ordering::Relaxed),
            busy_time_ns: self.busy_time_ns.load(Ordering::Relaxed),
            latency_samples: histogram.len(),
            avg_latency_ns: if histogram.len() > 0 {
                histogram.mean() as u64
            } else {
                0
            },
            p50_latency_ns: histogram.value_at_quantile(0.50),
            p99_latency_ns: histogram.value_at_quantile(0.99),
            max_latency_ns: histogram.max(),
        }
    }

    pub fn reset(&self) {
        self.tasks_executed.store(0, Ordering::Relaxed);
        self.tasks_panicked.store(0, Ordering::Relaxed);
        self.bulks_completed.store(0, Ordering::Relaxed);
        self.syncs.store(0, Ordering::Relaxed);
        self.idle_rounds.store(0, Ordering::Relaxed);
        self.busy_time_ns.store(0, Ordering::Relaxed);
        for slot in &self.latency_slots {
            slot.lock().reset();
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub uptime: Duration,
    pub tasks_executed: u64,
    pub tasks_panicked: u64,
    pub bulks_completed: u64,
    pub syncs: u64,
    pub idle_rounds: u64,
    pub busy_time_ns: u64,
    /// Successful tasks with a latency sample; equals `tasks_executed`.
    pub latency_samples: u64,
    pub avg_latency_ns: u64,
    pub p50_latency_ns: u64,
    pub p99_latency_ns: u64,
    pub max_latency_ns: u64,
}

impl MetricsSnapshot {
    pub fn tasks_per_second(&self) -> f64 {
        let seconds = self.uptime.as_secs_f64();
        if seconds == 0.0 {
            return 0.0;
        }
        self.tasks_executed as f64 / seconds
    }

    /// Average number of workers busy over the uptime.
    pub fn average_parallelism(&self) -> f64 {
        let wall_ns = self.uptime.as_nanos() as f64;
        if wall_ns == 0.0 {
            return 0.0;
        }
        self.busy_time_ns as f64 / wall_ns
    }
}
