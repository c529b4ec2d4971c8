use anyhow::Result;
use hdrhistogram::Histogram;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Count, error count and optional latency samples for one operation kind.
struct OpCounters {
    count: AtomicU64,
    errors: AtomicU64,
    latency: Option<Mutex<Histogram<u64>>>,
}

impl OpCounters {
    fn new(latency: bool) -> Result<Self> {
        let latency = if latency {
            Some(Mutex::new(Histogram::new_with_bounds(1, 60_000_000, 3)?))
        } else {
            None
        };
        Ok(OpCounters {
            count: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            latency,
        })
    }

    fn record_latency(&self, elapsed: Duration) {
        if let Some(hist) = &self.latency {
            hist.lock()
                .unwrap_or_else(|e| e.into_inner())
                .saturating_record(elapsed.as_micros() as u64);
        }
    }

    fn samples(&self) -> u64 {
        match &self.latency {
            Some(hist) => hist.lock().unwrap_or_else(|e| e.into_inner()).len(),
            None => 0,
        }
    }

    fn drain_latency(&self) -> Option<LatencySummary> {
        let hist = self.latency.as_ref()?;
        let mut hist = hist.lock().unwrap_or_else(|e| e.into_inner());
        if hist.is_empty() {
            return None;
        }
        let summary = LatencySummary {
            samples: hist.len(),
            p50_micros: hist.value_at_quantile(0.50),
            p99_micros: hist.value_at_quantile(0.99),
            max_micros: hist.max(),
        };
        hist.reset();
        Some(summary)
    }
}

/// Percentiles drained from one counter group's histogram for one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySummary {
    pub samples: u64,
    pub p50_micros: u64,
    pub p99_micros: u64,
    pub max_micros: u64,
}

/// Counts taken from the current 1-second window by the reporter.
#[derive(Debug, Default, Clone, Copy)]
pub struct PeriodSnapshot {
    pub reads: u64,
    pub writes: u64,
    pub read_errors: u64,
    pub write_errors: u64,
    pub read_not_found: u64,
    pub read_latency: Option<LatencySummary>,
    pub write_latency: Option<LatencySummary>,
}

/// Shared transaction counters, mutated concurrently by every worker.
///
/// The count fields hold the current throttle window's totals; the reporter
/// zeroes them each second via `take_period` and folds them into the running
/// totals.
pub struct CounterStore {
    read: OpCounters,
    write: OpCounters,
    read_not_found: AtomicU64,
    period_begin_ms: AtomicU64,
    total_reads: AtomicU64,
    total_writes: AtomicU64,
}

impl CounterStore {
    pub fn new(latency: bool) -> Result<Self> {
        Ok(CounterStore {
            read: OpCounters::new(latency)?,
            write: OpCounters::new(latency)?,
            read_not_found: AtomicU64::new(0),
            period_begin_ms: AtomicU64::new(now_millis()),
            total_reads: AtomicU64::new(0),
            total_writes: AtomicU64::new(0),
        })
    }

    pub fn increment_read_count(&self) {
        self.read.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_write_count(&self) {
        self.write.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_read_not_found(&self) {
        self.read_not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_read_error(&self) {
        self.read.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_write_error(&self) {
        self.write.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_latency(&self, elapsed: Duration) {
        self.read.record_latency(elapsed);
    }

    pub fn record_write_latency(&self, elapsed: Duration) {
        self.write.record_latency(elapsed);
    }

    pub fn latency_enabled(&self) -> bool {
        self.read.latency.is_some()
    }

    pub fn current_read_count(&self) -> u64 {
        self.read.count.load(Ordering::Relaxed)
    }

    pub fn current_write_count(&self) -> u64 {
        self.write.count.load(Ordering::Relaxed)
    }

    pub fn current_read_errors(&self) -> u64 {
        self.read.errors.load(Ordering::Relaxed)
    }

    pub fn current_write_errors(&self) -> u64 {
        self.write.errors.load(Ordering::Relaxed)
    }

    pub fn current_read_not_found(&self) -> u64 {
        self.read_not_found.load(Ordering::Relaxed)
    }

    pub fn current_period_begin_millis(&self) -> u64 {
        self.period_begin_ms.load(Ordering::Relaxed)
    }

    pub fn read_latency_samples(&self) -> u64 {
        self.read.samples()
    }

    pub fn write_latency_samples(&self) -> u64 {
        self.write.samples()
    }

    pub fn total_read_count(&self) -> u64 {
        self.total_reads.load(Ordering::Relaxed) + self.current_read_count()
    }

    pub fn total_write_count(&self) -> u64 {
        self.total_writes.load(Ordering::Relaxed) + self.current_write_count()
    }

    /// Marks the start of a new throttle window. Only the reporter calls
    /// this; workers read the boundary but never advance it.
    pub fn begin_period(&self, now_ms: u64) {
        self.period_begin_ms.store(now_ms, Ordering::Relaxed);
    }

    /// Swaps the window counters to zero and returns what they held,
    /// draining latency histograms alongside.
    pub fn take_period(&self) -> PeriodSnapshot {
        let reads = self.read.count.swap(0, Ordering::Relaxed);
        let writes = self.write.count.swap(0, Ordering::Relaxed);
        self.total_reads.fetch_add(reads, Ordering::Relaxed);
        self.total_writes.fetch_add(writes, Ordering::Relaxed);
        PeriodSnapshot {
            reads,
            writes,
            read_errors: self.read.errors.swap(0, Ordering::Relaxed),
            write_errors: self.write.errors.swap(0, Ordering::Relaxed),
            read_not_found: self.read_not_found.swap(0, Ordering::Relaxed),
            read_latency: self.read.drain_latency(),
            write_latency: self.write.drain_latency(),
        }
    }
}
