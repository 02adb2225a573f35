//! Await latency benchmark
//!
//! Measures how long a routine takes to notice that its blocking work has
//! finished, while sibling routines keep the scheduler busy.

use clap::Parser;
use coroutine_common::config::DEFAULT_POLL_INTERVAL_MS;
use coroutine_runtime::{await_blocking, yield_now, Builder, RoutineState};
use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

/// Await bridge latency benchmark
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of awaits performed
    #[arg(short, long, default_value_t = 200)]
    samples: usize,

    /// Simulated blocking work per await (microseconds)
    #[arg(short, long, default_value_t = 500)]
    work_us: u64,

    /// Busy sibling routines yielding alongside the waiter
    #[arg(short = 'b', long, default_value_t = 4)]
    siblings: usize,

    /// Poll interval (milliseconds)
    #[arg(short, long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    poll_ms: u64,
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let index = ((sorted.len() - 1) as f64 * p / 100.0).round() as usize;
    sorted[index]
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt().with_env_filter("info").init();

    tracing::info!("Await latency benchmark");
    tracing::info!("  Samples: {}", args.samples);
    tracing::info!("  Work per await: {} µs", args.work_us);
    tracing::info!("  Siblings: {}", args.siblings);
    tracing::info!("  Poll interval: {} ms", args.poll_ms);

    let ordinator = Builder::new()
        .poll_interval(Duration::from_millis(args.poll_ms))
        .build();
    let delays = Rc::new(RefCell::new(Vec::with_capacity(args.samples)));
    let done = Rc::new(RefCell::new(false));

    let samples = args.samples;
    let work = Duration::from_micros(args.work_us);
    let waiter = ordinator.create({
        let delays = Rc::clone(&delays);
        let done = Rc::clone(&done);
        move || {
            for _ in 0..samples {
                match await_blocking(move || {
                    thread::sleep(work);
                    Instant::now()
                }) {
                    Ok(finished) => delays.borrow_mut().push(finished.elapsed()),
                    Err(err) => tracing::error!(error = %err, "await failed"),
                }
            }
            *done.borrow_mut() = true;
        }
    });

    let mut ids = vec![waiter];
    for _ in 0..args.siblings {
        let done = Rc::clone(&done);
        ids.push(ordinator.create(move || {
            while !*done.borrow() {
                yield_now();
            }
        }));
    }

    let start = Instant::now();
    while !ids.is_empty() {
        ids.retain(|id| match ordinator.resume(*id) {
            Ok(state) => state != RoutineState::Finished,
            Err(err) => {
                tracing::error!(%id, error = %err, "resume failed");
                false
            }
        });
    }
    let elapsed = start.elapsed();

    let mut delays = delays.take();
    delays.sort_unstable();
    let stats = ordinator.stats();

    tracing::info!("\n=== Results ===");
    tracing::info!("Awaits: {}", delays.len());
    tracing::info!("Elapsed: {:?}", elapsed);
    tracing::info!("Scheduler resumes: {}", stats.resumes);
    tracing::info!("");
    tracing::info!("Observation delay after worker finished:");
    tracing::info!("  p50:  {:?}", percentile(&delays, 50.0));
    tracing::info!("  p95:  {:?}", percentile(&delays, 95.0));
    tracing::info!("  p99:  {:?}", percentile(&delays, 99.0));
    tracing::info!("  max:  {:?}", delays.last().copied().unwrap_or_default());

    if percentile(&delays, 99.0) > Duration::from_millis(args.poll_ms) * 2 {
        tracing::warn!("p99 delay exceeds two poll intervals - siblings may be hogging the thread");
    }

    tracing::info!("\nBenchmark complete");
}
