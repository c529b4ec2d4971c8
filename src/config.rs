use anyhow::{Result, ensure};
use clap::ValueEnum;
use std::ops::Range;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum WorkloadKind {
    ReadUpdate,
    ReadModifyUpdate,
    ReadModifyIncrement,
    ReadModifyDecrement,
    ReadFromFile,
}

/// Run-wide settings shared read-only by every worker.
#[derive(Debug, Clone)]
pub struct Config {
    pub workload: WorkloadKind,
    /// Fraction of transactions that are reads, in [0, 1].
    pub read_pct: f64,
    pub read_multi_bin_pct: f64,
    pub write_multi_bin_pct: f64,
    pub batch_size: u64,
    /// Transactions per second across all workers, 0 = unlimited.
    pub throughput: u64,
    pub report_not_found: bool,
    pub debug: bool,
    /// Enables latency sampling; workers skip timing entirely when off.
    pub latency: bool,
    pub key_start: u64,
    pub key_count: u64,
    pub threads: usize,
    pub bin_count: usize,
    pub value_sizes: Range<u64>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        for (name, pct) in [
            ("read-pct", self.read_pct),
            ("read-multi-bin-pct", self.read_multi_bin_pct),
            ("write-multi-bin-pct", self.write_multi_bin_pct),
        ] {
            ensure!(
                (0.0..=1.0).contains(&pct),
                "{name} must be within [0, 1], got {pct}"
            );
        }
        ensure!(self.batch_size >= 1, "batch size must be at least 1");
        ensure!(self.key_count >= 1, "key count must be at least 1");
        ensure!(self.threads >= 1, "thread count must be at least 1");
        ensure!(self.bin_count >= 1, "bin count must be at least 1");
        ensure!(
            self.value_sizes.end > self.value_sizes.start,
            "value size range must be non-empty"
        );
        ensure!(
            self.key_count >= self.threads as u64,
            "need at least one key per worker"
        );
        Ok(())
    }

    /// Splits the key space into one contiguous range per worker. Ranges are
    /// disjoint and cover `[key_start, key_start + key_count)`; the last
    /// worker absorbs the remainder.
    pub fn partitions(&self) -> Vec<(u64, u64)> {
        let workers = self.threads as u64;
        let per_worker = self.key_count / workers;
        (0..workers)
            .map(|i| {
                let start = self.key_start + i * per_worker;
                let count = if i == workers - 1 {
                    self.key_count - i * per_worker
                } else {
                    per_worker
                };
                (start, count)
            })
            .collect()
    }
}
