use anyhow::Result;
use clap::Parser;
use kvload::config::{Config, WorkloadKind};
use kvload::counters::CounterStore;
use kvload::database::{self, StoreKind};
use kvload::pool::ClientPool;
use kvload::report::Reporter;
use kvload::worker::RwWorker;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(value_enum)]
    workload: WorkloadKind,

    #[arg(value_enum)]
    store: StoreKind,

    #[arg(short = 't', long, default_value_t = 1)]
    threads: usize,

    /// Total number of keys, split evenly across workers
    #[arg(short = 'k', long, default_value_t = 100_000)]
    keys: u64,

    #[arg(long, default_value_t = 0)]
    start_key: u64,

    /// Percentage of transactions that are reads (0-100)
    #[arg(long, default_value_t = 50)]
    read_pct: u8,

    #[arg(long, default_value_t = 20)]
    read_multi_bin_pct: u8,

    #[arg(long, default_value_t = 20)]
    write_multi_bin_pct: u8,

    #[arg(long, default_value_t = 1)]
    batch_size: u64,

    /// Transactions per second across all workers, 0 = unlimited
    #[arg(long, default_value_t = 0)]
    throughput: u64,

    /// Count reads of missing keys separately instead of as successes
    #[arg(long)]
    report_not_found: bool,

    /// Full error detail on failures
    #[arg(long)]
    debug: bool,

    /// Sample per-call latency
    #[arg(long)]
    latency: bool,

    /// Bins per record when a multi-bin record is generated
    #[arg(long, default_value_t = 3)]
    bins: usize,

    #[arg(long, default_value_t = 64)]
    min_value_size: u64,

    #[arg(long, default_value_t = 256)]
    max_value_size: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Arc::new(Config {
        workload: cli.workload,
        read_pct: f64::from(cli.read_pct) / 100.0,
        read_multi_bin_pct: f64::from(cli.read_multi_bin_pct) / 100.0,
        write_multi_bin_pct: f64::from(cli.write_multi_bin_pct) / 100.0,
        batch_size: cli.batch_size,
        throughput: cli.throughput,
        report_not_found: cli.report_not_found,
        debug: cli.debug,
        latency: cli.latency,
        key_start: cli.start_key,
        key_count: cli.keys,
        threads: cli.threads,
        bin_count: cli.bins,
        value_sizes: cli.min_value_size..cli.max_value_size,
    });
    config.validate()?;

    let store = database::open_store(cli.store)?;
    store.init()?;
    let pool = Arc::new(ClientPool::new(store, config.threads));
    let counters = Arc::new(CounterStore::new(config.latency)?);

    let mut workers = Vec::with_capacity(config.threads);
    for (key_start, key_count) in config.partitions() {
        workers.push(RwWorker::new(
            Arc::clone(&pool),
            Arc::clone(&config),
            Arc::clone(&counters),
            key_start,
            key_count,
        )?);
    }

    info!(
        "starting {} workers over keys [{}, {})",
        config.threads,
        config.key_start,
        config.key_start + config.key_count
    );

    // Runs until the process is terminated; the flag only exists so the
    // loops have a cooperative exit point.
    let shutdown = AtomicBool::new(false);
    let reporter = Reporter::new(Arc::clone(&counters), Duration::from_secs(1));
    thread::scope(|s| {
        let shutdown = &shutdown;
        s.spawn(move || reporter.run(shutdown));
        for worker in workers {
            s.spawn(move || worker.run(shutdown));
        }
    });

    Ok(())
}
