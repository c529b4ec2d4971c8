use crate::counters::{CounterStore, PeriodSnapshot, now_millis};
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use thousands::Separable;
use tracing::info;

/// Per-second ticker: rolls the throttle window forward and prints the
/// period's counters. Owns the window boundary; workers only read it.
pub struct Reporter {
    counters: Arc<CounterStore>,
    interval: Duration,
}

impl Reporter {
    pub fn new(counters: Arc<CounterStore>, interval: Duration) -> Self {
        Reporter { counters, interval }
    }

    pub fn run(&self, shutdown: &AtomicBool) {
        while !shutdown.load(Ordering::Relaxed) {
            thread::sleep(self.interval);
            let period = self.tick();
            info!("{}", format_period(&period, &self.counters));
        }
    }

    /// One reporting step: read the clock, drain the window, open the next.
    fn tick(&self) -> PeriodSnapshot {
        let now = now_millis();
        let period = self.counters.take_period();
        self.counters.begin_period(now);
        period
    }
}

fn format_period(period: &PeriodSnapshot, counters: &CounterStore) -> String {
    let mut line = format!(
        "reads/s: {} | writes/s: {} | read errors: {} | write errors: {} | not found: {} | total: {}",
        period.reads.separate_with_underscores(),
        period.writes.separate_with_underscores(),
        period.read_errors,
        period.write_errors,
        period.read_not_found,
        (counters.total_read_count() + counters.total_write_count()).separate_with_underscores(),
    );
    if let Some(lat) = period.read_latency {
        let _ = write!(
            line,
            " | read µs p50: {} p99: {} max: {}",
            lat.p50_micros.separate_with_underscores(),
            lat.p99_micros.separate_with_underscores(),
            lat.max_micros.separate_with_underscores(),
        );
    }
    if let Some(lat) = period.write_latency {
        let _ = write!(
            line,
            " | write µs p50: {} p99: {} max: {}",
            lat.p50_micros.separate_with_underscores(),
            lat.p99_micros.separate_with_underscores(),
            lat.max_micros.separate_with_underscores(),
        );
    }
    line
}
