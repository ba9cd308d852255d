//! Profile snapshot model
//!
//! Plain, owned data copied out of a running session by
//! [`Profiler::dump`](crate::session::Profiler::dump). This is what analysis
//! and export work on; nothing here touches the live structures.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracecore_common::FrameDescriptor;

use crate::domain::TraceId;
use crate::recorder::FailureStats;
use crate::trace_store::{CallTrace, TraceSample};

/// Session-wide counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub running: bool,
    pub stripes: usize,
    /// Distinct traces stored, overflow bucket excluded
    pub traces: usize,
    /// Samples attributed to the overflow bucket
    pub overflow_samples: u64,
    /// Interned names
    pub names: usize,
    pub used_memory: usize,
    /// Bytes the trace store reserved at start, used or not
    #[serde(default)]
    pub reserved_memory: usize,
    pub failures: FailureStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSample {
    pub trace_id: TraceId,
    pub samples: u64,
    pub counter: u64,
}

impl From<TraceSample> for ProfileSample {
    fn from(sample: TraceSample) -> Self {
        Self { trace_id: sample.trace_id, samples: sample.samples, counter: sample.counter }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileFrame {
    pub location: u64,
    pub aux: u32,
}

impl From<&FrameDescriptor> for ProfileFrame {
    fn from(frame: &FrameDescriptor) -> Self {
        Self { location: frame.location, aux: frame.aux }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileTrace {
    pub trace_id: TraceId,
    /// Innermost frame first
    pub frames: Vec<ProfileFrame>,
}

impl ProfileTrace {
    #[must_use]
    pub fn from_call_trace(trace_id: TraceId, trace: &CallTrace) -> Self {
        Self { trace_id, frames: trace.frames.iter().map(ProfileFrame::from).collect() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileName {
    pub id: u32,
    pub name: String,
}

/// Complete snapshot of one session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub stats: ProfileStats,
    pub samples: Vec<ProfileSample>,
    pub traces: Vec<ProfileTrace>,
    pub names: Vec<ProfileName>,
}

impl Profile {
    /// Load a profile previously written by
    /// [`ProfileExporter`](crate::export::ProfileExporter).
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a profile.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile: {}", path.display()))?;
        let profile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse profile: {}", path.display()))?;
        Ok(profile)
    }

    /// Traces keyed by id, for repeated lookups
    #[must_use]
    pub fn trace_index(&self) -> HashMap<TraceId, &ProfileTrace> {
        self.traces.iter().map(|t| (t.trace_id, t)).collect()
    }

    /// Interned name for `id`, if present
    #[must_use]
    pub fn name(&self, id: u32) -> Option<&str> {
        self.names.iter().find(|n| n.id == id).map(|n| n.name.as_str())
    }

    /// Sum of all sample counts
    #[must_use]
    pub fn total_samples(&self) -> u64 {
        self.samples.iter().map(|s| s.samples).sum()
    }

    /// Sum of all weighted counters
    #[must_use]
    pub fn total_counter(&self) -> u64 {
        self.samples.iter().map(|s| s.counter).sum()
    }
}
