//! # Batch Export Pipeline Demo
//!
//! End-to-end run of the export pipeline with pooled log records.
//!
//! ## Features Demonstrated
//!
//! ### 1. Record Pools
//! - Producers alternate between a per-thread `LocalRecordPool` and the
//!   shared pool behind a `PoolHandle`
//! - The shared pool is resized halfway through the run; in-flight records
//!   keep working
//!
//! ### 2. Batch Export Processor
//! - Lock-free `on_end` from many producer threads
//! - Background worker on a dedicated thread, or a tokio task with `--task`
//! - Unreliable simulated backend: failed batches are dropped, not retried
//!
//! ### 3. Flush & Shutdown
//! - Bounded `force_flush` and `shutdown` with a final statistics summary
//!
//! ## Running
//!
//! ```bash
//! # Quick mode (4 producers, 2 500 records each)
//! cargo run -p batch_export --bin demo --release -- --quick
//!
//! # Full mode (8 producers, 25 000 records each) on a tokio task worker
//! cargo run -p batch_export --bin demo --release -- --task
//!
//! # Show per-batch output from the pipeline
//! RUST_LOG=batch_export=debug cargo run -p batch_export --bin demo -- --quick
//! ```

use batch_export::{
    Batch, BatchExportConfig, BatchExportProcessor, ExportError, ExportResult, Exporter,
    LocalRecordPool, LogRecord, PoolHandle, Severity,
};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

// =============================================================================
// SIMULATED BACKEND
// =============================================================================

/// An exporter that sleeps to simulate latency and fails some batches.
struct SimulatedBackendExporter {
    failure_rate: f64,
    latency: Duration,
    exported_records: AtomicU64,
    failed_batches: AtomicU64,
    errors_seen: AtomicU64,
}

impl SimulatedBackendExporter {
    fn new(failure_rate: f64, latency: Duration) -> Self {
        Self {
            failure_rate,
            latency,
            exported_records: AtomicU64::new(0),
            failed_batches: AtomicU64::new(0),
            errors_seen: AtomicU64::new(0),
        }
    }
}

impl Exporter<Arc<LogRecord>> for SimulatedBackendExporter {
    fn export(&self, batch: &Batch<'_, Arc<LogRecord>>) -> ExportResult {
        thread::sleep(self.latency);

        if rand::thread_rng().gen_bool(self.failure_rate) {
            self.failed_batches.fetch_add(1, Ordering::Relaxed);
            return Err(ExportError::Transport(format!(
                "simulated backend failure (batch of {} records)",
                batch.len()
            )));
        }

        let errors = batch
            .iter()
            .filter(|record| record.data().severity >= Severity::Error)
            .count();
        self.errors_seen.fetch_add(errors as u64, Ordering::Relaxed);
        self.exported_records
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn name(&self) -> &str {
        "simulated-backend"
    }
}

// =============================================================================
// PRODUCERS
// =============================================================================

const CATEGORIES: [&str; 4] = ["http.server", "db.client", "cache", "queue.consumer"];

fn random_severity(rng: &mut impl Rng) -> Severity {
    match rng.gen_range(0..100) {
        0..=4 => Severity::Error,
        5..=14 => Severity::Warn,
        15..=59 => Severity::Info,
        _ => Severity::Debug,
    }
}

fn run_producer(
    id: usize,
    records: usize,
    pool: &PoolHandle,
    processor: &BatchExportProcessor<Arc<LogRecord>>,
) {
    let mut rng = rand::thread_rng();
    let mut local = LocalRecordPool::new();

    for seq in 0..records {
        // Even records come from the thread's own cache, odd ones from the
        // shared pool.
        let use_local = seq % 2 == 0;
        let record = if use_local { local.rent() } else { pool.rent() };

        record.update(|data| {
            data.stamp_now();
            data.category.push_str(CATEGORIES[rng.gen_range(0..CATEGORIES.len())]);
            data.severity = random_severity(&mut rng);
            data.body = Some(format!("producer {id} handled request {seq}"));
            data.trace_id = rng.gen();
            data.span_id = rng.gen();
            data.add_attribute("producer.id", id as i64);
            data.add_attribute("request.seq", seq as i64);
            data.add_attribute("latency_ms", rng.gen_range(0.1..250.0));
        });

        processor.on_end(Arc::clone(&record));

        if use_local {
            local.return_record(record);
        } else {
            pool.return_record(record);
        }

        if seq % 500 == 0 {
            thread::sleep(Duration::from_micros(rng.gen_range(0..200)));
        }
    }
}

// =============================================================================
// MAIN APPLICATION
// =============================================================================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let quick = args.iter().any(|a| a == "--quick");
    let use_task = args.iter().any(|a| a == "--task");

    let (num_producers, records_per_producer) = if quick { (4, 2_500) } else { (8, 25_000) };

    // The task worker needs an ambient runtime; the thread worker ignores it.
    let runtime = tokio::runtime::Runtime::new()?;
    let _guard = runtime.enter();

    let config = BatchExportConfig::default()
        .with_scheduled_delay(Duration::from_millis(200))
        .with_exporter_timeout(Duration::from_millis(50))
        .with_background_thread(!use_task);

    info!(
        producers = num_producers,
        records_per_producer,
        worker = ?config.worker_kind(),
        max_queue_size = config.max_queue_size,
        max_export_batch_size = config.max_export_batch_size,
        "starting demo"
    );

    let pool = PoolHandle::new(256)?;
    let backend = Arc::new(SimulatedBackendExporter::new(0.05, Duration::from_millis(2)));
    let processor = Arc::new(BatchExportProcessor::for_log_records(
        Arc::clone(&backend),
        pool.clone(),
        config,
    )?);

    // -------------------------------------------------------------------------
    // PHASE 1: Produce
    // -------------------------------------------------------------------------

    let started = Instant::now();
    let handles: Vec<_> = (0..num_producers)
        .map(|id| {
            let pool = pool.clone();
            let processor = Arc::clone(&processor);
            thread::Builder::new()
                .name(format!("producer-{id}"))
                .spawn(move || run_producer(id, records_per_producer, &pool, &processor))
        })
        .collect::<Result<_, _>>()?;

    thread::sleep(Duration::from_millis(50));
    let resized = pool.resize(1024)?;
    info!(capacity = resized.capacity(), "shared pool resized while producers run");

    for handle in handles {
        if handle.join().is_err() {
            tracing::error!("producer thread panicked");
        }
    }
    let produce_elapsed = started.elapsed();

    // -------------------------------------------------------------------------
    // PHASE 2: Flush & shut down
    // -------------------------------------------------------------------------

    let flushed = processor.force_flush(Some(Duration::from_secs(10)));
    let clean = processor.shutdown(Some(Duration::from_secs(10)));

    // -------------------------------------------------------------------------
    // PHASE 3: Report
    // -------------------------------------------------------------------------

    let metrics = processor.metrics();
    let received = processor.received_count();
    let throughput = received as f64 / produce_elapsed.as_secs_f64();

    println!();
    println!("================ Batch Export Demo ================");
    println!("  received              {received}");
    println!("  processed             {}", metrics.processed);
    println!("  dropped (queue full)  {}", metrics.dropped);
    println!("  batches exported      {}", metrics.batches_exported);
    println!("  batches failed        {}", metrics.export_failures);
    println!("  batches over budget   {}", metrics.export_over_budget);
    println!("  failure rate          {:.1}%", metrics.failure_rate() * 100.0);
    println!(
        "  backend records       {}",
        backend.exported_records.load(Ordering::Relaxed)
    );
    println!(
        "  backend error logs    {}",
        backend.errors_seen.load(Ordering::Relaxed)
    );
    println!(
        "  backend failures      {}",
        backend.failed_batches.load(Ordering::Relaxed)
    );
    println!("  idle pooled records   {}", pool.current().count());
    println!("  produce throughput    {throughput:.0} records/s");
    println!("  flush ok / shutdown ok  {flushed} / {clean}");
    println!("===================================================");

    Ok(())
}
