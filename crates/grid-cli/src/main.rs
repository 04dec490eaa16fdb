//! grid-bench: replays a captured wire trace through [`grid_engine::ControlEngine`]
//! and reports control-frame timing, in the spirit of the teacher's
//! `rf-bench`/sibling `modular-bench` harnesses. Not part of the tested
//! core surface; a manual performance-inspection tool only.

use std::fs;
use std::hint::black_box;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use grid_core::bus::BusTable;
use grid_engine::ControlEngine;
use grid_midi::RawMidi;
use grid_modulation::ModulatorValues;
use grid_pitch::{InputVector, NUM_CLOCKS, NUM_INPUTS, NUM_TRIOS};
use serde::Deserialize;

const FRAME_PERIOD_US_DEFAULT: u64 = 1_000;

/// Replay a captured wire trace through the control engine.
#[derive(Parser)]
#[command(name = "grid-bench")]
#[command(about = "Replay a wire trace through the control engine and report frame timing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON trace file of raw MIDI events
    Replay {
        /// Path to a JSON array of trace events
        trace: PathBuf,

        /// Microseconds of simulated time advanced per control frame
        #[arg(short, long, default_value_t = FRAME_PERIOD_US_DEFAULT)]
        frame_period_us: u64,
    },

    /// Run a synthetic trace with no file, for a quick smoke check
    Smoke {
        /// Number of synthetic events to generate
        #[arg(short, long, default_value_t = 4096)]
        events: u64,

        /// Number of control frames to run after the trace is exhausted
        #[arg(short = 'n', long, default_value_t = 10_000)]
        frames: u64,
    },
}

/// One recorded wire-level MIDI event, timestamped in the same clock the
/// engine's input bus gates visibility against.
#[derive(Deserialize)]
struct TraceEvent {
    timestamp: u64,
    route_id: i32,
    status: u8,
    data1: u8,
    data2: u8,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { trace, frame_period_us } => replay(&trace, frame_period_us),
        Commands::Smoke { events, frames } => smoke(events, frames),
    }
}

fn build_engine() -> ControlEngine {
    let bus_table = Arc::new(BusTable::new());
    let mut engine = ControlEngine::new(bus_table, 4, 4, 8);
    engine.output_mut().set_poly_chans(4);
    engine
}

fn replay(trace_path: &PathBuf, frame_period_us: u64) {
    let raw = fs::read_to_string(trace_path).unwrap_or_else(|e| panic!("failed to read trace {trace_path:?}: {e}"));
    let events: Vec<TraceEvent> = serde_json::from_str(&raw).unwrap_or_else(|e| panic!("failed to parse trace: {e}"));

    println!("Loaded trace: {} events from {:?}", events.len(), trace_path);

    let mut engine = build_engine();
    for event in &events {
        engine
            .input_bus()
            .push_midi(RawMidi::new(event.timestamp, event.route_id, event.status, event.data1, event.data2));
    }

    let last_timestamp = events.iter().map(|e| e.timestamp).max().unwrap_or(0);
    let frame_period = frame_period_us.max(1);
    let num_frames = (last_timestamp / frame_period) + 1;

    run_and_report(&mut engine, num_frames, frame_period);
}

fn smoke(events: u64, frames: u64) {
    println!("Generating {events} synthetic events over {frames} frames");

    let mut engine = build_engine();
    let frame_period = FRAME_PERIOD_US_DEFAULT;
    let spacing = (frames.max(1) * frame_period) / events.max(1);

    for i in 0..events {
        let timestamp = i * spacing.max(1);
        let route_id = (i % 16) as i32;
        let note = (i % 64) as u8;
        let velocity = if i % 2 == 0 { 100 } else { 0 };
        engine
            .input_bus()
            .push_midi(RawMidi::new(timestamp, route_id, 0x90, note, velocity));
    }

    run_and_report(&mut engine, frames, frame_period);
}

fn run_and_report(engine: &mut ControlEngine, num_frames: u64, frame_period_us: u64) {
    let modulator_values = ModulatorValues::new();
    let default_vector = InputVector::default();

    println!("Running {num_frames} control frames ({frame_period_us} us simulated period)");

    let start = Instant::now();
    for frame in 0..num_frames {
        let now = frame * frame_period_us;
        engine
            .process_frame(
                now,
                [None; NUM_INPUTS],
                false,
                [false; NUM_CLOCKS],
                [false; NUM_TRIOS],
                false,
                &modulator_values,
                default_vector,
            )
            .unwrap_or_else(|e| panic!("control frame {frame} failed: {e}"));
        black_box(engine.voice_pitches());
    }
    let elapsed = start.elapsed();

    let total_ns = elapsed.as_nanos() as f64;
    let ns_per_frame = total_ns / num_frames.max(1) as f64;
    let frames_per_sec = 1_000_000_000.0 / ns_per_frame;
    let budget_ns = frame_period_us as f64 * 1_000.0;
    let budget_usage = (ns_per_frame / budget_ns) * 100.0;

    println!("\nResults:");
    println!("  Total time:     {elapsed:?}");
    println!("  Frames:         {num_frames}");
    println!("  ns/frame:       {ns_per_frame:.2}");
    println!("  frames/sec:     {frames_per_sec:.0}");
    println!("  Frame budget:   {budget_ns:.2} ns ({frame_period_us} us)");
    println!("  Budget usage:   {budget_usage:.2}%");

    if budget_usage > 100.0 {
        println!("\n  WARNING: exceeds the simulated control-frame budget");
    } else {
        println!("\n  within budget ({:.1}x headroom)", 100.0 / budget_usage);
    }
}
