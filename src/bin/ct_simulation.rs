//! Cycle-Time Simulation
//!
//! Generates realistic production-line cycle-time telemetry for testing the
//! governor. Each tick computes a heijunka cycle time per line from noisy
//! per-unit production times, attaches chain-state telemetry, and writes one
//! JSON message per line to stdout.
//!
//! # Usage
//! ```bash
//! ct-simulation --lines 3 --interval-ms 1000 | linepace --stdin
//! ```

use chrono::Utc;
use clap::Parser;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::io::{self, Write};
use std::time::Duration;

// ============================================================================
// Production Constants
// ============================================================================

/// Mean per-unit production time (minutes).
const BASE_PRODUCTION_TIME_MIN: f64 = 4.0;

/// Production-time noise (standard deviation, minutes).
const PRODUCTION_TIME_SIGMA: f64 = 0.35;

/// Units sampled per cycle-time calculation.
const UNITS_PER_CALCULATION: usize = 6;

/// Probability that a line reports its chain stopped on a given tick.
const CHAIN_STOP_PROBABILITY: f64 = 0.03;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "ct-simulation")]
#[command(about = "Cycle-time telemetry simulation for linepace testing")]
#[command(version)]
struct Args {
    /// Number of production lines to simulate (LINE-01..LINE-NN)
    #[arg(short, long, default_value = "2", value_parser = clap::value_parser!(u32).range(1..=32))]
    lines: u32,

    /// Interval between ticks in milliseconds (0 = no delay)
    #[arg(short, long, default_value = "1000")]
    interval_ms: u64,

    /// Number of ticks to emit (0 = run until killed)
    #[arg(short = 'n', long, default_value = "0")]
    ticks: u64,

    /// Workers per line (divides the mean production time)
    #[arg(short, long, default_value = "4", value_parser = clap::value_parser!(u32).range(1..=64))]
    workers: u32,

    /// Productivity factor (> 0, scales worker throughput)
    #[arg(short, long, default_value = "1.0")]
    productivity: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

// ============================================================================
// Heijunka CT
// ============================================================================

/// Heijunka cycle time: mean per-unit production time levelled across the
/// line's workers and productivity factor. Returns minutes.
fn calculate_ct(production_times: &[f64], worker_count: u32, productivity_factor: f64) -> f64 {
    let mean_time = production_times.iter().sum::<f64>() / production_times.len() as f64;
    mean_time / f64::from(worker_count.max(1)) / productivity_factor
}

// ============================================================================
// Simulation
// ============================================================================

struct LineSim {
    line_id: String,
    /// Running encoder position, advanced while the chain runs
    encoder_position: f64,
}

fn run(args: &Args) -> io::Result<()> {
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let noise = Normal::new(0.0, PRODUCTION_TIME_SIGMA).expect("fixed sigma is valid");

    let mut lines: Vec<LineSim> = (1..=args.lines)
        .map(|i| LineSim {
            line_id: format!("LINE-{i:02}"),
            encoder_position: 0.0,
        })
        .collect();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut tick = 0u64;

    loop {
        for line in &mut lines {
            let production_times: Vec<f64> = (0..UNITS_PER_CALCULATION)
                .map(|_| (BASE_PRODUCTION_TIME_MIN + noise.sample(&mut rng)).max(0.25))
                .collect();

            let ct_minutes = calculate_ct(&production_times, args.workers, args.productivity);
            let ct_seconds = ct_minutes * 60.0;

            let is_running = rng.gen::<f64>() >= CHAIN_STOP_PROBABILITY;
            let encoder_delta = if is_running {
                rng.gen_range(8.0..14.0)
            } else {
                0.0
            };
            line.encoder_position += encoder_delta;

            let message = serde_json::json!({
                "line_id": line.line_id,
                "calculated_ct_seconds": ct_seconds,
                "timestamp": Utc::now().to_rfc3339(),
                "chain_state": {
                    "is_running": is_running,
                    "encoder_delta": encoder_delta,
                },
            });

            writeln!(out, "{message}")?;
        }
        out.flush()?;

        tick += 1;
        if args.ticks > 0 && tick >= args.ticks {
            return Ok(());
        }
        if args.interval_ms > 0 {
            std::thread::sleep(Duration::from_millis(args.interval_ms));
        }
    }
}

fn main() {
    let args = Args::parse();

    if !args.productivity.is_finite() || args.productivity <= 0.0 {
        eprintln!("error: --productivity must be positive");
        std::process::exit(2);
    }

    eprintln!(
        "ct-simulation: {} line(s), {} workers, tick every {} ms",
        args.lines, args.workers, args.interval_ms
    );

    if let Err(e) = run(&args) {
        // A closed pipe just means the consumer is done
        if e.kind() != io::ErrorKind::BrokenPipe {
            eprintln!("ct-simulation: output error: {e}");
            std::process::exit(1);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
