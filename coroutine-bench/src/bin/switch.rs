//! Switch benchmark
//!
//! Measures the cost of a resume/yield round trip for each strategy, with
//! a configurable number of routines and call depth at the yield point.

use clap::{Parser, ValueEnum};
use coroutine_common::config::{DEFAULT_SHARED_STACK_SIZE, DEFAULT_STACK_SIZE};
use coroutine_runtime::{yield_now, Builder, Dedicated, RoutineState, SharedStack, Strategy};
use std::time::Instant;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Mode {
    Shared,
    Dedicated,
}

/// Resume/yield round-trip benchmark
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Context strategy to measure
    #[arg(short, long, value_enum, default_value_t = Mode::Shared)]
    strategy: Mode,

    /// Number of routines resumed round-robin
    #[arg(short, long, default_value_t = 16)]
    routines: usize,

    /// Yields performed by each routine
    #[arg(short = 'n', long, default_value_t = 100_000)]
    yields: usize,

    /// Extra stack bytes live at each yield, rounded up to 256-byte frames
    /// (grows the shared-stack snapshot)
    #[arg(short, long, default_value_t = 0)]
    depth: usize,
}

/// Bytes of padding held by each frame of `yield_with_frames`
const FRAME_BYTES: usize = 256;

/// Frames needed to keep at least `depth` bytes live
fn frames_for(depth: usize) -> usize {
    depth.div_ceil(FRAME_BYTES)
}

#[inline(never)]
fn yield_with_frames(frames: usize) {
    if frames == 0 {
        yield_now();
        return;
    }
    let pad = std::hint::black_box([0u8; FRAME_BYTES]);
    yield_with_frames(frames - 1);
    std::hint::black_box(pad);
}

fn run<S: Strategy>(args: &Args) {
    let ordinator = Builder::new()
        .stack_size(DEFAULT_STACK_SIZE)
        .shared_stack_size(DEFAULT_SHARED_STACK_SIZE)
        .build_with::<S>();

    let yields = args.yields;
    let frames = frames_for(args.depth);
    let ids: Vec<_> = (0..args.routines)
        .map(|_| {
            ordinator.create(move || {
                for _ in 0..yields {
                    yield_with_frames(frames);
                }
            })
        })
        .collect();

    let start = Instant::now();
    let mut live = ids.clone();
    while !live.is_empty() {
        live.retain(|id| match ordinator.resume(*id) {
            Ok(RoutineState::Finished) => false,
            Ok(_) => true,
            Err(err) => {
                tracing::error!(%id, error = %err, "resume failed");
                false
            }
        });
    }
    let elapsed = start.elapsed();

    let stats = ordinator.stats();
    tracing::info!("\n=== Results ({}) ===", S::NAME);
    tracing::info!("Resumes: {}", stats.resumes);
    tracing::info!("Yields: {}", stats.yields);
    tracing::info!("Elapsed: {:?}", elapsed);
    tracing::info!(
        "Round trip: {:.1} ns",
        elapsed.as_nanos() as f64 / stats.resumes.max(1) as f64
    );

    for id in ids {
        if let Err(err) = ordinator.destroy(id) {
            tracing::warn!(%id, error = %err, "destroy failed");
        }
    }
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt().with_env_filter("info").init();

    tracing::info!("Switch benchmark");
    tracing::info!("  Strategy: {:?}", args.strategy);
    tracing::info!("  Routines: {}", args.routines);
    tracing::info!("  Yields per routine: {}", args.yields);
    tracing::info!(
        "  Live bytes at yield: {} ({} frames)",
        frames_for(args.depth) * FRAME_BYTES,
        frames_for(args.depth)
    );

    match args.strategy {
        Mode::Shared => run::<SharedStack>(&args),
        Mode::Dedicated => run::<Dedicated>(&args),
    }

    tracing::info!("\nBenchmark complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_round_up() {
        assert_eq!(frames_for(0), 0);
        assert_eq!(frames_for(1), 1);
        assert_eq!(frames_for(FRAME_BYTES), 1);
        assert_eq!(frames_for(FRAME_BYTES + 1), 2);
    }

    #[test]
    fn test_depth_flag_parses() {
        let args = Args::parse_from(["switch", "--depth", "300", "-r", "2"]);
        assert_eq!(args.depth, 300);
        assert_eq!(args.routines, 2);
        assert_eq!(frames_for(args.depth), 2);
    }
}
