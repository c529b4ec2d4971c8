use crate::config::{Config, WorkloadKind};
use crate::counters::{CounterStore, now_millis};
use crate::database::KvStore;
use crate::generator::BinGen;
use crate::pool::ClientPool;
use anyhow::Result;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng, random};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, warn};

/// What a single transaction dispatch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Unsupported(UnsupportedOp),
}

/// Operations the store offers no path for. These surface as warnings so a
/// misconfigured run is loud instead of silently idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedOp {
    ReadModifyUpdate,
    ReadModifyIncrement,
    ReadModifyDecrement,
    ReadFromFile,
    BatchRead,
}

impl fmt::Display for UnsupportedOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnsupportedOp::ReadModifyUpdate => "read-modify-update",
            UnsupportedOp::ReadModifyIncrement => "read-modify-increment",
            UnsupportedOp::ReadModifyDecrement => "read-modify-decrement",
            UnsupportedOp::ReadFromFile => "read-from-file",
            UnsupportedOp::BatchRead => "batch read",
        };
        f.write_str(name)
    }
}

/// One worker's read/write transaction loop over its own slice of the key
/// space. Runs until the shutdown flag is raised or the process dies.
pub struct RwWorker {
    pool: Arc<ClientPool>,
    config: Arc<Config>,
    counters: Arc<CounterStore>,
    key_start: u64,
    key_count: u64,
    rng: SmallRng,
    bins: BinGen,
}

impl RwWorker {
    pub fn new(
        pool: Arc<ClientPool>,
        config: Arc<Config>,
        counters: Arc<CounterStore>,
        key_start: u64,
        key_count: u64,
    ) -> Result<Self> {
        // Seed from OS entropy, not the clock: workers started in the same
        // millisecond would otherwise draw the same hot keys.
        let rng = SmallRng::seed_from_u64(random());
        let bins = BinGen::new(config.bin_count, config.value_sizes.clone())?;
        Ok(RwWorker {
            pool,
            config,
            counters,
            key_start,
            key_count,
            rng,
            bins,
        })
    }

    pub fn run(mut self, shutdown: &AtomicBool) {
        let client = match ClientPool::checkout(&self.pool) {
            Ok(client) => client,
            Err(err) => {
                error!("worker got no client: {err}");
                return;
            }
        };

        while !shutdown.load(Ordering::Relaxed) {
            match self.transact(&*client) {
                Outcome::Completed => {}
                Outcome::Unsupported(op) => warn!("{op}: not implemented"),
            }
            self.throttle();
        }
    }

    /// Dispatches one transaction. Store failures are absorbed into the
    /// error counters; nothing escapes to the caller.
    pub fn transact(&mut self, store: &dyn KvStore) -> Outcome {
        match self.config.workload {
            WorkloadKind::ReadUpdate => self.read_update(store),
            WorkloadKind::ReadModifyUpdate => {
                Outcome::Unsupported(UnsupportedOp::ReadModifyUpdate)
            }
            WorkloadKind::ReadModifyIncrement => {
                Outcome::Unsupported(UnsupportedOp::ReadModifyIncrement)
            }
            WorkloadKind::ReadModifyDecrement => {
                Outcome::Unsupported(UnsupportedOp::ReadModifyDecrement)
            }
            WorkloadKind::ReadFromFile => Outcome::Unsupported(UnsupportedOp::ReadFromFile),
        }
    }

    fn read_update(&mut self, store: &dyn KvStore) -> Outcome {
        if self.rng.random::<f64>() < self.config.read_pct {
            // Drawn before the batch check so the draw order matches the
            // write path; only the batch read would consume the flag.
            let multi_bin = self.rng.random::<f64>() < self.config.read_multi_bin_pct;

            if self.config.batch_size <= 1 {
                let key_idx = self.rng.random_range(0..self.key_count);
                self.do_read(store, key_idx);
                Outcome::Completed
            } else {
                self.read_batch(multi_bin)
            }
        } else {
            let multi_bin = self.rng.random::<f64>() < self.config.write_multi_bin_pct;

            if self.config.batch_size <= 1 {
                let key_idx = self.rng.random_range(0..self.key_count);
                self.do_write(store, key_idx, multi_bin);
            } else {
                // No batch write on the store; issue the batch one record at
                // a time, each with its own key draw.
                for _ in 0..self.config.batch_size {
                    let key_idx = self.rng.random_range(0..self.key_count);
                    self.do_write(store, key_idx, multi_bin);
                }
            }
            Outcome::Completed
        }
    }

    /// Batch reads need a multi-key call the store does not offer.
    fn read_batch(&mut self, _multi_bin: bool) -> Outcome {
        Outcome::Unsupported(UnsupportedOp::BatchRead)
    }

    fn do_read(&mut self, store: &dyn KvStore, key_idx: u64) {
        let key = (self.key_start + key_idx).to_string();

        let fetched = if self.counters.latency_enabled() {
            let begin = Instant::now();
            let fetched = store.get(&key);
            if fetched.is_ok() {
                self.counters.record_read_latency(begin.elapsed());
            }
            fetched
        } else {
            store.get(&key)
        };

        match fetched {
            Ok(None) if self.config.report_not_found => self.counters.increment_read_not_found(),
            Ok(_) => self.counters.increment_read_count(),
            Err(err) => self.read_failure(&err),
        }
    }

    fn do_write(&mut self, store: &dyn KvStore, key_idx: u64, multi_bin: bool) {
        let key = (self.key_start + key_idx).to_string();
        let record = self.bins.generate(&mut self.rng, multi_bin);
        // The store keeps one scalar per key, so only the first bin value is
        // persisted even for a multi-bin record.
        let value = &record[0].value;

        let written = if self.counters.latency_enabled() {
            let begin = Instant::now();
            let written = store.set(&key, value);
            if written.is_ok() {
                self.counters.record_write_latency(begin.elapsed());
            }
            written
        } else {
            store.set(&key, value)
        };

        match written {
            Ok(()) => self.counters.increment_write_count(),
            Err(err) => self.write_failure(&err),
        }
    }

    /// Soft throughput cap: once the current window's transaction count is
    /// over the limit, sleep out the rest of the window. Several workers can
    /// observe the same overshoot and all sleep; that imprecision is
    /// accepted.
    fn throttle(&self) {
        if self.config.throughput == 0 {
            return;
        }
        let transactions =
            self.counters.current_read_count() + self.counters.current_write_count();
        if transactions > self.config.throughput {
            let deadline = self.counters.current_period_begin_millis() + 1_000;
            let remaining = deadline.saturating_sub(now_millis());
            if remaining > 0 {
                thread::sleep(Duration::from_millis(remaining));
            }
        }
    }

    fn read_failure(&self, err: &anyhow::Error) {
        self.counters.increment_read_error();
        if self.config.debug {
            error!("read failed: {err:?}");
        } else {
            error!("read failed: {err:#}");
        }
    }

    fn write_failure(&self, err: &anyhow::Error) {
        self.counters.increment_write_error();
        if self.config.debug {
            error!("write failed: {err:?}");
        } else {
            error!("write failed: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::base_config;
    use crate::database::mem_btree::MemBTree;
    use anyhow::bail;
    use std::sync::Mutex;

    /// Scripted store: records every call, optionally failing or reporting
    /// every key as absent.
    #[derive(Default)]
    struct TestStore {
        gets: Mutex<Vec<String>>,
        sets: Mutex<Vec<(String, String)>>,
        fail: bool,
        absent: bool,
    }

    impl TestStore {
        fn failing() -> Self {
            TestStore {
                fail: true,
                ..TestStore::default()
            }
        }

        fn absent() -> Self {
            TestStore {
                absent: true,
                ..TestStore::default()
            }
        }
    }

    impl KvStore for TestStore {
        fn init(&self) -> Result<()> {
            Ok(())
        }

        fn get(&self, key: &str) -> Result<Option<String>> {
            self.gets.lock().unwrap().push(key.to_owned());
            if self.fail {
                bail!("injected get failure");
            }
            Ok((!self.absent).then(|| "value".to_owned()))
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            self.sets.lock().unwrap().push((key.to_owned(), value.to_owned()));
            if self.fail {
                bail!("injected set failure");
            }
            Ok(())
        }
    }

    fn build(config: Config) -> (RwWorker, Arc<CounterStore>) {
        let config = Arc::new(config);
        let counters = Arc::new(CounterStore::new(config.latency).unwrap());
        let pool = Arc::new(ClientPool::new(Arc::new(MemBTree::default()), 1));
        let worker = RwWorker::new(
            pool,
            Arc::clone(&config),
            Arc::clone(&counters),
            config.key_start,
            config.key_count,
        )
        .unwrap();
        (worker, counters)
    }

    #[test]
    fn read_write_mix_converges_to_read_pct() {
        let mut config = base_config(WorkloadKind::ReadUpdate);
        config.read_pct = 0.7;
        let (mut worker, counters) = build(config);
        let store = TestStore::default();

        for _ in 0..20_000 {
            assert_eq!(worker.transact(&store), Outcome::Completed);
        }

        let reads = counters.current_read_count() as f64;
        let total = reads + counters.current_write_count() as f64;
        assert_eq!(total, 20_000.0);
        let ratio = reads / total;
        assert!(
            (ratio - 0.7).abs() < 0.02,
            "read ratio {ratio} strayed from 0.7"
        );
    }

    #[test]
    fn keys_stay_inside_the_partition() {
        let mut config = base_config(WorkloadKind::ReadUpdate);
        config.key_start = 1_000;
        config.key_count = 50;
        let (mut worker, _counters) = build(config);
        let store = TestStore::default();

        for _ in 0..2_000 {
            worker.transact(&store);
        }

        let in_range = |key: &String| {
            let n: u64 = key.parse().expect("keys are integers");
            (1_000..1_050).contains(&n)
        };
        let gets = store.gets.lock().unwrap();
        let sets = store.sets.lock().unwrap();
        assert!(!gets.is_empty() && !sets.is_empty());
        assert!(gets.iter().all(in_range));
        assert!(sets.iter().all(|(key, _)| in_range(key)));
    }

    #[test]
    fn reads_never_touch_write_counters() {
        let mut config = base_config(WorkloadKind::ReadUpdate);
        config.read_pct = 1.0;
        let (mut worker, counters) = build(config);
        let store = TestStore::default();

        for _ in 0..100 {
            worker.transact(&store);
        }

        assert_eq!(counters.current_read_count(), 100);
        assert_eq!(counters.current_write_count(), 0);
        assert_eq!(counters.current_write_errors(), 0);
    }

    #[test]
    fn writes_never_touch_read_counters() {
        let mut config = base_config(WorkloadKind::ReadUpdate);
        config.read_pct = 0.0;
        let (mut worker, counters) = build(config);
        let store = TestStore::default();

        for _ in 0..100 {
            worker.transact(&store);
        }

        assert_eq!(counters.current_write_count(), 100);
        assert_eq!(counters.current_read_count(), 0);
        assert_eq!(counters.current_read_errors(), 0);
        assert_eq!(counters.current_read_not_found(), 0);
    }

    #[test]
    fn no_latency_samples_when_sampling_disabled() {
        let (mut worker, counters) = build(base_config(WorkloadKind::ReadUpdate));
        let store = TestStore::default();

        for _ in 0..200 {
            worker.transact(&store);
        }

        assert_eq!(counters.read_latency_samples(), 0);
        assert_eq!(counters.write_latency_samples(), 0);
    }

    #[test]
    fn latency_samples_recorded_when_enabled() {
        let mut config = base_config(WorkloadKind::ReadUpdate);
        config.latency = true;
        let (mut worker, counters) = build(config);
        let store = TestStore::default();

        for _ in 0..200 {
            worker.transact(&store);
        }

        assert!(counters.read_latency_samples() > 0);
        assert!(counters.write_latency_samples() > 0);
    }

    #[test]
    fn failed_calls_leave_no_latency_samples() {
        let mut config = base_config(WorkloadKind::ReadUpdate);
        config.latency = true;
        let (mut worker, counters) = build(config);
        let store = TestStore::failing();

        for _ in 0..100 {
            worker.transact(&store);
        }

        assert_eq!(counters.read_latency_samples(), 0);
        assert_eq!(counters.write_latency_samples(), 0);
    }

    #[test]
    fn absent_key_counts_as_success_unless_reported() {
        let mut config = base_config(WorkloadKind::ReadUpdate);
        config.read_pct = 1.0;
        let (mut worker, counters) = build(config);
        let store = TestStore::absent();

        worker.transact(&store);
        assert_eq!(counters.current_read_count(), 1);
        assert_eq!(counters.current_read_not_found(), 0);
    }

    #[test]
    fn absent_key_counts_as_not_found_when_reported() {
        let mut config = base_config(WorkloadKind::ReadUpdate);
        config.read_pct = 1.0;
        config.report_not_found = true;
        let (mut worker, counters) = build(config);
        let store = TestStore::absent();

        worker.transact(&store);
        assert_eq!(counters.current_read_not_found(), 1);
        assert_eq!(counters.current_read_count(), 0);
    }

    #[test]
    fn read_failure_counts_one_error_and_no_success() {
        let mut config = base_config(WorkloadKind::ReadUpdate);
        config.read_pct = 1.0;
        let (mut worker, counters) = build(config);
        let store = TestStore::failing();

        assert_eq!(worker.transact(&store), Outcome::Completed);
        assert_eq!(counters.current_read_errors(), 1);
        assert_eq!(counters.current_read_count(), 0);
        assert_eq!(counters.current_read_not_found(), 0);

        // The loop keeps going after a failure.
        worker.transact(&store);
        assert_eq!(counters.current_read_errors(), 2);
    }

    #[test]
    fn write_failure_counts_one_error_and_no_success() {
        let mut config = base_config(WorkloadKind::ReadUpdate);
        config.read_pct = 0.0;
        let (mut worker, counters) = build(config);
        let store = TestStore::failing();

        worker.transact(&store);
        assert_eq!(counters.current_write_errors(), 1);
        assert_eq!(counters.current_write_count(), 0);
    }

    #[test]
    fn batch_write_degrades_to_sequential_singles() {
        let mut config = base_config(WorkloadKind::ReadUpdate);
        config.read_pct = 0.0;
        config.batch_size = 5;
        config.key_start = 200;
        config.key_count = 40;
        let (mut worker, counters) = build(config);
        let store = TestStore::default();

        assert_eq!(worker.transact(&store), Outcome::Completed);

        let sets = store.sets.lock().unwrap();
        assert_eq!(sets.len(), 5);
        assert_eq!(counters.current_write_count(), 5);
        for (key, value) in sets.iter() {
            let n: u64 = key.parse().unwrap();
            assert!((200..240).contains(&n));
            assert!(!value.is_empty());
        }
    }

    #[test]
    fn batch_read_is_a_typed_stub() {
        let mut config = base_config(WorkloadKind::ReadUpdate);
        config.read_pct = 1.0;
        config.batch_size = 5;
        let (mut worker, counters) = build(config);
        let store = TestStore::default();

        assert_eq!(
            worker.transact(&store),
            Outcome::Unsupported(UnsupportedOp::BatchRead)
        );
        assert!(store.gets.lock().unwrap().is_empty());
        assert_eq!(counters.current_read_count(), 0);
    }

    #[test]
    fn unimplemented_workloads_return_typed_outcomes() {
        let cases = [
            (WorkloadKind::ReadModifyUpdate, UnsupportedOp::ReadModifyUpdate),
            (
                WorkloadKind::ReadModifyIncrement,
                UnsupportedOp::ReadModifyIncrement,
            ),
            (
                WorkloadKind::ReadModifyDecrement,
                UnsupportedOp::ReadModifyDecrement,
            ),
            (WorkloadKind::ReadFromFile, UnsupportedOp::ReadFromFile),
        ];
        for (kind, op) in cases {
            let (mut worker, counters) = build(base_config(kind));
            let store = TestStore::default();
            assert_eq!(worker.transact(&store), Outcome::Unsupported(op));
            assert_eq!(counters.current_read_count(), 0);
            assert_eq!(counters.current_write_count(), 0);
        }
    }

    #[test]
    fn throttle_sleeps_out_the_window_after_overshoot() {
        let mut config = base_config(WorkloadKind::ReadUpdate);
        config.throughput = 100;
        let (worker, counters) = build(config);

        for _ in 0..101 {
            counters.increment_read_count();
        }
        // 900ms of the window already gone, ~100ms left to sleep.
        counters.begin_period(now_millis() - 900);

        let begin = Instant::now();
        worker.throttle();
        assert!(begin.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn throttle_is_free_below_the_cap() {
        let mut config = base_config(WorkloadKind::ReadUpdate);
        config.throughput = 100;
        let (worker, counters) = build(config);

        for _ in 0..50 {
            counters.increment_read_count();
        }
        counters.begin_period(now_millis());

        let begin = Instant::now();
        worker.throttle();
        assert!(begin.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn worker_without_a_client_never_enters_the_loop() {
        let config = Arc::new(base_config(WorkloadKind::ReadUpdate));
        let counters = Arc::new(CounterStore::new(false).unwrap());
        let empty_pool = Arc::new(ClientPool::new(Arc::new(MemBTree::default()), 0));
        let worker = RwWorker::new(
            empty_pool,
            Arc::clone(&config),
            Arc::clone(&counters),
            0,
            100,
        )
        .unwrap();

        // Shutdown never raised; run must still return.
        worker.run(&AtomicBool::new(false));
        assert_eq!(counters.current_read_count(), 0);
        assert_eq!(counters.current_write_count(), 0);
    }

    #[test]
    fn run_processes_transactions_until_shutdown() {
        let (worker, counters) = build(base_config(WorkloadKind::ReadUpdate));
        let shutdown = AtomicBool::new(false);

        thread::scope(|s| {
            s.spawn(|| worker.run(&shutdown));
            thread::sleep(Duration::from_millis(50));
            shutdown.store(true, Ordering::Relaxed);
        });

        assert!(counters.current_read_count() + counters.current_write_count() > 0);
    }
}
