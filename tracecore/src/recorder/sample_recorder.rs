//! # Sample Recording
//!
//! Entry point called from a profiling signal handler. One call records one
//! sample:
//!
//! ```text
//!   tid ──► stripe = mix(tid) % N
//!              │
//!              ▼
//!   try_lock(stripe) ─✗─► try_lock(stripe+1) ─✗─► try_lock(stripe+2) ─✗─► drop (Contention)
//!              │ ✓                 │ ✓                    │ ✓
//!              └───────────────────┴──────────┬───────────┘
//!                                             ▼
//!                      walker.walk(tid, event, stripe.frames)
//!                                             │
//!                                             ▼
//!                      storage.put(frames, event.weight())
//!                                             │
//!                                             ▼
//!                      sink.write(stripe, tid, trace_id, event)
//!                                             │
//!                                             ▼
//!                                     release stripe
//! ```
//!
//! Nothing on this path allocates, blocks, logs, or returns an error: every
//! outcome is a [`RecordOutcome`] plus a counter bump.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracecore_common::FrameDescriptor;

use super::failures::{DropReason, FailureCounters, FailureKind};
use super::{Event, EventSink, StackWalker};
use crate::domain::{ConfigError, StripeIndex, ThreadId, TraceId};
use crate::session::SessionConfig;
use crate::sync::{StripeGuard, StripeSet};
use crate::trace_store::CallTraceStorage;

/// Stripes tried per sample: the home stripe and its two successors
pub const LOCK_ATTEMPTS: usize = 3;

/// Per-stripe scratch space, allocated once at session start
pub struct StripeScratch {
    frames: Box<[FrameDescriptor]>,
}

impl StripeScratch {
    fn new(depth: usize) -> Self {
        Self { frames: vec![FrameDescriptor::default(); depth].into_boxed_slice() }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }
}

/// Result of one recording attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Counted against this trace (possibly [`TraceId::OVERFLOW`])
    Recorded(TraceId),
    Dropped(DropReason),
}

impl RecordOutcome {
    #[must_use]
    pub fn trace_id(self) -> Option<TraceId> {
        match self {
            RecordOutcome::Recorded(id) => Some(id),
            RecordOutcome::Dropped(_) => None,
        }
    }

    #[must_use]
    pub fn is_recorded(self) -> bool {
        matches!(self, RecordOutcome::Recorded(_))
    }
}

/// Home stripe for a thread
///
/// Folds the higher bits of the id down so that sequential thread ids
/// spread across stripes.
#[inline]
#[must_use]
pub fn stripe_for(tid: ThreadId, stripes: usize) -> StripeIndex {
    let mut i = tid.0 as usize;
    i ^= i >> 8;
    i ^= i >> 4;
    StripeIndex(i % stripes)
}

/// Striped, signal-safe sample recorder
pub struct SampleRecorder {
    stripes: StripeSet<StripeScratch>,
    storage: CallTraceStorage,
    failures: FailureCounters,
    sink: Arc<dyn EventSink>,
    running: AtomicBool,
    max_stack_depth: usize,
}

impl SampleRecorder {
    /// Allocate stripes, frame buffers and the trace arena.
    ///
    /// The recorder starts stopped; samples are dropped until
    /// [`SampleRecorder::set_running`] is called.
    ///
    /// # Errors
    /// Returns the first problem found in `config`.
    pub fn new(config: &SessionConfig, sink: Arc<dyn EventSink>) -> Result<Self, ConfigError> {
        config.validate()?;
        let depth = config.max_stack_depth;
        Ok(Self {
            stripes: StripeSet::new(config.stripes, |_| StripeScratch::new(depth)),
            storage: CallTraceStorage::new(config.trace_capacity, config.frame_capacity)?,
            failures: FailureCounters::new(),
            sink,
            running: AtomicBool::new(false),
            max_stack_depth: depth,
        })
    }

    /// Record one sample for `tid`. Signal-safe.
    pub fn record_sample<W>(&self, tid: ThreadId, event: &Event, walker: &W) -> RecordOutcome
    where
        W: StackWalker + ?Sized,
    {
        self.failures.count_sample();
        if !self.is_running() {
            return self.drop_sample(FailureKind::NotRunning, DropReason::NotRunning);
        }

        let Some(mut guard) = self.acquire(tid) else {
            return self.drop_sample(FailureKind::Contention, DropReason::Contention);
        };

        let buffer = &mut guard.frames;
        let captured = walker.walk(tid, event, buffer).min(buffer.len());
        let frames = if captured == 0 {
            self.failures.record(FailureKind::EmptyStack);
            buffer[0] = FrameDescriptor::NO_STACK;
            &buffer[..1]
        } else {
            &buffer[..captured]
        };

        let trace_id = self.storage.put(frames, event.weight());
        if trace_id.is_overflow() {
            self.failures.record(FailureKind::Overflow);
        }

        self.sink.write(guard.index(), tid, trace_id, event);
        RecordOutcome::Recorded(trace_id)
    }

    /// Attribute `event` to an already known trace without walking a stack.
    ///
    /// Only the weighted counter grows; the sample count is left alone.
    /// Counted in `total_samples` like any other call. Signal-safe.
    pub fn record_known(&self, tid: ThreadId, trace_id: TraceId, event: &Event) -> RecordOutcome {
        self.failures.count_sample();
        if !self.is_running() {
            return self.drop_sample(FailureKind::NotRunning, DropReason::NotRunning);
        }

        let Some(guard) = self.acquire(tid) else {
            return self.drop_sample(FailureKind::Contention, DropReason::Contention);
        };

        if !self.storage.add(trace_id, event.weight()) {
            return self.drop_sample(FailureKind::UnknownTrace, DropReason::UnknownTrace);
        }

        self.sink.write(guard.index(), tid, trace_id, event);
        RecordOutcome::Recorded(trace_id)
    }

    /// Forget every trace and reset the counters. Not for signal context.
    pub fn clear(&self) {
        let held = self.stripes.lock_all();
        self.storage.clear(&held);
        self.failures.reset();
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn stripes(&self) -> &StripeSet<StripeScratch> {
        &self.stripes
    }

    #[must_use]
    pub fn storage(&self) -> &CallTraceStorage {
        &self.storage
    }

    #[must_use]
    pub fn failures(&self) -> &FailureCounters {
        &self.failures
    }

    /// Bytes held by stripes, frame buffers and the trace store
    #[must_use]
    pub fn used_memory(&self) -> usize {
        let per_stripe = std::mem::size_of::<StripeScratch>()
            + self.max_stack_depth * std::mem::size_of::<FrameDescriptor>();
        self.stripes.len() * per_stripe + self.storage.used_memory()
    }

    #[must_use]
    pub fn max_stack_depth(&self) -> usize {
        self.max_stack_depth
    }

    fn acquire(&self, tid: ThreadId) -> Option<StripeGuard<'_, StripeScratch>> {
        let count = self.stripes.len();
        let home = stripe_for(tid, count).0;
        (0..LOCK_ATTEMPTS).find_map(|step| self.stripes.try_lock(StripeIndex((home + step) % count)))
    }

    fn drop_sample(&self, kind: FailureKind, reason: DropReason) -> RecordOutcome {
        self.failures.record(kind);
        RecordOutcome::Dropped(reason)
    }
}
