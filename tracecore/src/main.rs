//! # tracecore - Main Entry Point
//!
//! Supports two operational modes:
//! - **Synthetic load** (default): sampler threads record made-up stacks
//!   through the real recording core until Ctrl+C or `--duration`
//! - **Replay** (`--replay profile.json`): summarize an exported profile

// Main function is intentionally long for clarity; time conversions lose precision for display
#![allow(clippy::too_many_lines, clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracecore::analysis::{hot_frames, hot_traces, HotspotStats};
use tracecore::cli::Args;
use tracecore::domain::{SessionError, ThreadId};
use tracecore::export::ProfileExporter;
use tracecore::profile::{Profile, ProfileFrame};
use tracecore::recorder::{Event, ThreadState};
use tracecore::session::Profiler;
use tracecore::sink::BufferedEventSink;
use tracecore::synthetic::SyntheticWalker;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<SessionError>() {
        Some(SessionError::InvalidConfig(_)) => EXIT_USAGE,
        _ => EXIT_ERROR,
    }
}

/// Display name for a frame whose location is an interned name id
fn frame_name(profile: &Profile, frame: &ProfileFrame) -> String {
    u32::try_from(frame.location)
        .ok()
        .and_then(|id| profile.name(id))
        .map_or_else(|| format!("0x{:x}", frame.location), str::to_string)
}

fn print_summary(profile: &Profile, top: usize) {
    let stats = &profile.stats;
    println!(
        "samples: {} total, {} traces, {} names, {} bytes used, {} bytes reserved for traces",
        stats.failures.total_samples, stats.traces, stats.names, stats.used_memory, stats.reserved_memory
    );
    println!(
        "failures: contention {}, overflow {}, empty stack {}, not running {}, unknown trace {}",
        stats.failures.contention,
        stats.failures.overflow,
        stats.failures.empty_stack,
        stats.failures.not_running,
        stats.failures.unknown_trace
    );

    println!("\nHOT TRACES");
    for hotspot in hot_traces(profile, top) {
        let leaf = hotspot.leaf.map_or_else(|| "<no frames>".to_string(), |f| frame_name(profile, &f));
        println!(
            "  {:>6.2}%  {:>8} samples  depth {:>4}  {}  {}",
            hotspot.percentage, hotspot.samples, hotspot.depth, hotspot.trace_id, leaf
        );
    }

    println!("\nHOT FRAMES");
    for hotspot in hot_frames(profile, top) {
        println!(
            "  {:>6.2}%  {:>8} samples  {:>4} traces  {}",
            hotspot.percentage,
            hotspot.samples,
            hotspot.traces,
            frame_name(profile, &hotspot.frame)
        );
    }
}

fn replay(path: &Path, top: usize) -> Result<()> {
    let profile = Profile::from_file(path)?;
    println!("replay: {}", path.display());
    print_summary(&profile, top);
    Ok(())
}

/// Event recorded by sampler threads: mostly CPU samples, with a periodic
/// allocation and wall-clock sample mixed in.
fn synthetic_event(n: u64, interval: Duration, class_id: u32) -> Event {
    let interval_ns = interval.as_nanos() as u64;
    match n % 10 {
        0 => Event::Alloc { class_id, size: 512 + (n % 7) * 64, outside_tlab: n % 20 == 0 },
        5 => Event::WallClock { interval_ns, state: ThreadState::Running },
        _ => Event::ExecutionSample { cpu_time_ns: interval_ns },
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    if let Some(ref path) = args.replay {
        return replay(path, args.top);
    }

    let config = args.session_config();
    let sink = Arc::new(BufferedEventSink::for_config(&config));
    let mut profiler = Profiler::new(sink.clone());
    profiler.start(config).context("Failed to start profiling session")?;

    let walker = Arc::new(SyntheticWalker::new(&profiler, args.distinct, config.max_stack_depth));
    let class_id = profiler.intern_name("synthetic::Buffer");
    let profiler = Arc::new(profiler);

    if !quiet {
        println!("tracecore v{}", env!("CARGO_PKG_VERSION"));
        println!(
            "threads: {}, stripes: {}, shapes: {}",
            args.threads,
            config.stripes,
            walker.shapes().len()
        );
        if let Some(ref export_path) = args.export {
            println!("export: {}", export_path.display());
        }
    }

    // ── Sampler threads ─────────────────────────────────────────────────
    let stop = Arc::new(AtomicBool::new(false));
    let interval = Duration::from_micros(args.interval_us);
    let mut samplers = Vec::with_capacity(args.threads);
    for i in 0..args.threads {
        let profiler = Arc::clone(&profiler);
        let walker = Arc::clone(&walker);
        let stop = Arc::clone(&stop);
        let name = format!("sampler-{i}");
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let tid = ThreadId::current();
                let name_id = profiler.intern_name(&name);
                debug!("{name} running as {tid} (name id {name_id})");
                let mut n = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    let event = synthetic_event(n, interval, class_id);
                    profiler.record_sample(tid, &event, walker.as_ref());
                    n += 1;
                    std::thread::sleep(interval);
                }
                n
            })
            .with_context(|| format!("Failed to spawn sampler thread {i}"))?;
        samplers.push(handle);
    }

    // ── Main loop: drain sink, report, wait for stop condition ──────────
    let mut live = HotspotStats::new();
    let mut drained = Vec::new();
    let mut status_timer = Instant::now();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let profiling_start = Instant::now();
    let duration_limit =
        if args.duration > 0 { Some(Duration::from_secs(args.duration)) } else { None };

    let mut exit_reason = "interrupted";

    loop {
        if let Some(limit) = duration_limit {
            if profiling_start.elapsed() >= limit {
                exit_reason = "duration limit reached";
                break;
            }
        }

        drained.clear();
        sink.drain(&mut drained);
        for record in &drained {
            live.record(record);
        }

        if !quiet && status_timer.elapsed() > Duration::from_secs(10) {
            let stats = profiler.stats();
            info!(
                "{} samples drained over {} traces, {} stored, {} contention drops, {} sink drops",
                live.total_samples(),
                live.distinct_traces(),
                stats.traces,
                stats.failures.contention,
                sink.dropped()
            );
            if let Some((trace_id, samples, share)) = live.top(1).first() {
                info!("hottest so far: {trace_id} ({samples} samples, {share:.1}%)");
            }
            status_timer = Instant::now();
        }

        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(100)) => {
                // Continue loop
            }
            _ = &mut ctrl_c => {
                break;
            }
        }
    }

    // ── Shutdown ────────────────────────────────────────────────────────
    stop.store(true, Ordering::Relaxed);
    let mut recorded_calls = 0u64;
    for handle in samplers {
        match handle.join() {
            Ok(n) => recorded_calls += n,
            Err(_) => warn!("A sampler thread panicked"),
        }
    }
    profiler.stop().context("Failed to stop profiling session")?;

    drained.clear();
    sink.drain(&mut drained);
    for record in &drained {
        live.record(record);
    }

    let profile = profiler.dump();
    if !quiet {
        eprintln!(
            "\n{}: {:.1}s, {} record calls, {} sink records ({} dropped)",
            exit_reason,
            profiling_start.elapsed().as_secs_f64(),
            recorded_calls,
            live.total_samples(),
            sink.dropped()
        );
        print_summary(&profile, args.top);
    }

    if let Some(ref export_path) = args.export {
        ProfileExporter::new()
            .pretty(true)
            .export_to_file(&profile, export_path)
            .context("Failed to export profile")?;
        if !quiet {
            println!("saved: {}", export_path.display());
        }
    }

    Ok(())
}
