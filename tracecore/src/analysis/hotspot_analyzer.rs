//! Hotspot analysis for profile snapshots.
//!
//! Ranks traces and leaf frames by accumulated weight.
//!
//! # Architecture
//!
//! - **`hot_traces()`** - Top-N whole call stacks from a [`Profile`]
//! - **`hot_frames()`** - Top-N innermost frames (self weight) from a [`Profile`]
//! - **`HotspotStats`** - Incremental per-trace tally fed from drained sink
//!   records, for live status output
//!
//! ## Data Flow
//!
//! ```text
//! Profiler::dump() ──► Profile ──┬──► hot_traces()
//!                                └──► hot_frames()
//!
//! BufferedEventSink::drain() ──► HotspotStats.record() ──► top()
//! ```

// Percentage calculations intentionally convert u64 to f64
#![allow(clippy::cast_precision_loss)]

use std::collections::HashMap;

use crate::domain::TraceId;
use crate::profile::{Profile, ProfileFrame};
use crate::sink::SinkRecord;

// =============================================================================
// OUTPUT TYPES
// =============================================================================

/// One call stack ranked by weight
#[derive(Debug, Clone, PartialEq)]
pub struct TraceHotspot {
    pub trace_id: TraceId,
    pub samples: u64,
    pub counter: u64,
    /// Share of the profile's total counter (0.0 - 100.0)
    pub percentage: f64,
    /// Number of frames, 0 if the trace's frames are missing
    pub depth: usize,
    /// Innermost frame
    pub leaf: Option<ProfileFrame>,
}

/// One innermost frame ranked by the weight of every trace ending in it
#[derive(Debug, Clone, PartialEq)]
pub struct FrameHotspot {
    pub frame: ProfileFrame,
    pub samples: u64,
    pub counter: u64,
    pub percentage: f64,
    /// Distinct traces with this frame as their leaf
    pub traces: usize,
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

// =============================================================================
// BATCH ANALYSIS
// =============================================================================

/// Top `n` traces by weighted counter (ties broken by sample count, then id).
#[must_use]
pub fn hot_traces(profile: &Profile, n: usize) -> Vec<TraceHotspot> {
    let total = profile.total_counter();
    let traces = profile.trace_index();

    let mut hotspots: Vec<TraceHotspot> = profile
        .samples
        .iter()
        .map(|sample| {
            let trace = traces.get(&sample.trace_id);
            TraceHotspot {
                trace_id: sample.trace_id,
                samples: sample.samples,
                counter: sample.counter,
                percentage: percentage(sample.counter, total),
                depth: trace.map_or(0, |t| t.frames.len()),
                leaf: trace.and_then(|t| t.frames.first().copied()),
            }
        })
        .collect();

    hotspots.sort_unstable_by(|a, b| {
        b.counter.cmp(&a.counter).then(b.samples.cmp(&a.samples)).then(a.trace_id.cmp(&b.trace_id))
    });
    hotspots.truncate(n);
    hotspots
}

/// Top `n` leaf frames by the summed counter of the traces ending in them.
///
/// Traces without frames in the snapshot are skipped.
#[must_use]
pub fn hot_frames(profile: &Profile, n: usize) -> Vec<FrameHotspot> {
    let total = profile.total_counter();
    let traces = profile.trace_index();
    let mut by_frame: HashMap<ProfileFrame, (u64, u64, usize)> = HashMap::new();

    for sample in &profile.samples {
        let Some(leaf) = traces.get(&sample.trace_id).and_then(|t| t.frames.first()) else {
            continue;
        };
        let entry = by_frame.entry(*leaf).or_insert((0, 0, 0));
        entry.0 += sample.samples;
        entry.1 += sample.counter;
        entry.2 += 1;
    }

    let mut hotspots: Vec<FrameHotspot> = by_frame
        .into_iter()
        .map(|(frame, (samples, counter, traces))| FrameHotspot {
            frame,
            samples,
            counter,
            percentage: percentage(counter, total),
            traces,
        })
        .collect();

    hotspots.sort_unstable_by(|a, b| {
        b.counter
            .cmp(&a.counter)
            .then(b.samples.cmp(&a.samples))
            .then(a.frame.location.cmp(&b.frame.location))
            .then(a.frame.aux.cmp(&b.frame.aux))
    });
    hotspots.truncate(n);
    hotspots
}

// =============================================================================
// INCREMENTAL TALLY
// =============================================================================

/// Per-trace tally built from sink records as they are drained.
#[derive(Debug, Default)]
pub struct HotspotStats {
    traces: HashMap<TraceId, (u64, u64)>,
    total_samples: u64,
    total_counter: u64,
}

impl HotspotStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: &SinkRecord) {
        let weight = record.event.weight();
        let entry = self.traces.entry(record.trace_id).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += weight;
        self.total_samples += 1;
        self.total_counter += weight;
    }

    #[must_use]
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    #[must_use]
    pub fn distinct_traces(&self) -> usize {
        self.traces.len()
    }

    /// Top `n` traces seen so far as `(trace id, samples, share of weight)`
    #[must_use]
    pub fn top(&self, n: usize) -> Vec<(TraceId, u64, f64)> {
        let mut ranked: Vec<_> = self.traces.iter().map(|(&id, &(s, c))| (id, s, c)).collect();
        ranked.sort_unstable_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
        ranked
            .into_iter()
            .take(n)
            .map(|(id, samples, counter)| (id, samples, percentage(counter, self.total_counter)))
            .collect()
    }
}
