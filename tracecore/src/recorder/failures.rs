//! Per-outcome counters for the recording path
//!
//! Every call to the recorder ends in exactly one of: recorded, or dropped
//! for one [`DropReason`]. Overflow and empty stacks are still recorded
//! (against a placeholder trace) but are counted here as well.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Why a sample did not reach the trace store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// All probed stripes were held
    Contention,
    /// The session was not running
    NotRunning,
    /// `record_known` was given an id the store never handed out
    UnknownTrace,
}

/// Degraded-but-recorded outcomes and drops, by category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Contention,
    Overflow,
    EmptyStack,
    NotRunning,
    /// `record_known` with an id the store never handed out
    UnknownTrace,
}

impl FailureKind {
    pub const ALL: [FailureKind; 5] = [
        FailureKind::Contention,
        FailureKind::Overflow,
        FailureKind::EmptyStack,
        FailureKind::NotRunning,
        FailureKind::UnknownTrace,
    ];
}

/// Lock-free failure and sample counters
#[derive(Debug, Default)]
pub struct FailureCounters {
    total_samples: AtomicU64,
    by_kind: [AtomicU64; FailureKind::ALL.len()],
}

impl FailureCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn count_sample(&self) {
        self.total_samples.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record(&self, kind: FailureKind) {
        self.by_kind[kind as usize].fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get(&self, kind: FailureKind) -> u64 {
        self.by_kind[kind as usize].load(Ordering::Relaxed)
    }

    /// Calls into the recorder (`record_sample` and `record_known`),
    /// dropped or not
    #[must_use]
    pub fn total_samples(&self) -> u64 {
        self.total_samples.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> FailureStats {
        FailureStats {
            total_samples: self.total_samples(),
            contention: self.get(FailureKind::Contention),
            overflow: self.get(FailureKind::Overflow),
            empty_stack: self.get(FailureKind::EmptyStack),
            not_running: self.get(FailureKind::NotRunning),
            unknown_trace: self.get(FailureKind::UnknownTrace),
        }
    }

    pub fn reset(&self) {
        self.total_samples.store(0, Ordering::Relaxed);
        for counter in &self.by_kind {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Point-in-time copy of [`FailureCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureStats {
    pub total_samples: u64,
    pub contention: u64,
    pub overflow: u64,
    pub empty_stack: u64,
    pub not_running: u64,
    #[serde(default)]
    pub unknown_trace: u64,
}

impl FailureStats {
    /// Calls that never reached the trace store; never exceeds
    /// `total_samples`
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.contention + self.not_running + self.unknown_trace
    }
}
