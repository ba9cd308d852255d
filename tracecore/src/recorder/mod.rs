//! Signal-handler side of the profiler
//!
//! [`SampleRecorder`] turns "thread X was interrupted" into a trace id and a
//! sink write using only pre-allocated memory and non-blocking locks.

pub mod collaborators;
pub mod event;
pub mod failures;
pub mod sample_recorder;

pub use collaborators::{EventSink, NullSink, StackWalker};
pub use event::{Event, ThreadState};
pub use failures::{DropReason, FailureCounters, FailureKind, FailureStats};
pub use sample_recorder::{stripe_for, RecordOutcome, SampleRecorder, StripeScratch, LOCK_ATTEMPTS};
