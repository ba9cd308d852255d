//! Event payloads
//!
//! One variant per event kind. The recorder only reads [`Event::weight`];
//! the rest is carried through to the sink untouched.

use serde::Serialize;
use tracecore_common::{
    EVENT_ALLOC_OUTSIDE_TLAB, EVENT_ALLOC_SAMPLE, EVENT_EXECUTION_SAMPLE, EVENT_LOCK_SAMPLE,
    EVENT_PARK_SAMPLE, EVENT_WALL_CLOCK_SAMPLE,
};

/// Scheduling state observed by a wall-clock sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadState {
    Running,
    Sleeping,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// CPU timer fired on a running thread
    ExecutionSample { cpu_time_ns: u64 },

    /// Periodic sample regardless of thread state
    WallClock { interval_ns: u64, state: ThreadState },

    /// Sampled allocation; `class_id` is a dictionary id
    Alloc { class_id: u32, size: u64, outside_tlab: bool },

    /// Contended monitor entry
    Lock { class_id: u32, duration_ns: u64 },

    /// Thread parked on a condition
    Park { duration_ns: u64 },
}

impl Event {
    /// `EVENT_*` code of this payload
    #[must_use]
    pub fn kind(&self) -> u32 {
        match self {
            Event::ExecutionSample { .. } => EVENT_EXECUTION_SAMPLE,
            Event::WallClock { .. } => EVENT_WALL_CLOCK_SAMPLE,
            Event::Alloc { outside_tlab: false, .. } => EVENT_ALLOC_SAMPLE,
            Event::Alloc { outside_tlab: true, .. } => EVENT_ALLOC_OUTSIDE_TLAB,
            Event::Lock { .. } => EVENT_LOCK_SAMPLE,
            Event::Park { .. } => EVENT_PARK_SAMPLE,
        }
    }

    /// Amount added to the trace's weighted counter
    #[must_use]
    pub fn weight(&self) -> u64 {
        match *self {
            Event::ExecutionSample { cpu_time_ns } => cpu_time_ns,
            Event::WallClock { interval_ns, .. } => interval_ns,
            Event::Alloc { size, .. } => size,
            Event::Lock { duration_ns, .. } | Event::Park { duration_ns } => duration_ns,
        }
    }
}
