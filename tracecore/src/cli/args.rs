//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;
use tracecore_common::{DEFAULT_STRIPES, MAX_STACK_DEPTH};

use crate::session::{SessionConfig, DEFAULT_FRAMES_PER_TRACE, DEFAULT_SINK_CAPACITY, DEFAULT_TRACE_CAPACITY};

#[derive(Parser, Debug)]
#[command(
    name = "tracecore",
    about = "Drive the sample-recording core with synthetic load and report hot traces",
    after_help = "\
EXAMPLES:
    tracecore --duration 5                       Sample 8 threads for 5 seconds
    tracecore --threads 32 --stripes 4           Provoke stripe contention
    tracecore --duration 10 --export prof.json   Save the profile as JSON
    tracecore --replay prof.json                 Summarize a saved profile"
)]
pub struct Args {
    /// Synthetic threads taking samples
    #[arg(long, default_value_t = 8)]
    pub threads: usize,

    /// Distinct synthetic call stacks
    #[arg(long, default_value_t = 32)]
    pub distinct: usize,

    /// Pause between two samples of one thread, in microseconds
    #[arg(long, default_value_t = 1000)]
    pub interval_us: u64,

    /// Number of lock stripes
    #[arg(long, default_value_t = DEFAULT_STRIPES)]
    pub stripes: usize,

    /// Maximum frames captured per sample
    #[arg(long, default_value_t = MAX_STACK_DEPTH)]
    pub depth: usize,

    /// Distinct traces the store can hold
    #[arg(long, default_value_t = DEFAULT_TRACE_CAPACITY)]
    pub traces: usize,

    /// Total frames the trace arena can hold (default: traces × 64)
    #[arg(long)]
    pub frames: Option<usize>,

    /// Per-stripe event queue depth
    #[arg(long, default_value_t = DEFAULT_SINK_CAPACITY)]
    pub sink_capacity: usize,

    /// Stop after N seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Export the final profile to FILE as JSON
    #[arg(long, value_name = "FILE", conflicts_with = "replay")]
    pub export: Option<PathBuf>,

    /// Summarize a previously exported profile instead of sampling
    #[arg(long, value_name = "FILE")]
    pub replay: Option<PathBuf>,

    /// Number of hot traces and frames to print
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Session sizes requested on the command line
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::default()
            .with_stripes(self.stripes)
            .with_max_stack_depth(self.depth)
            .with_trace_capacity(self.traces)
            .with_frame_capacity(
                self.frames.unwrap_or_else(|| self.traces.saturating_mul(DEFAULT_FRAMES_PER_TRACE)),
            )
            .with_sink_capacity(self.sink_capacity)
    }
}
