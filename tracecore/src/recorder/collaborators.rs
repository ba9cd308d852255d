//! Interfaces to the code that surrounds the recorder inside a signal
//! handler: the stack walker that produces frames and the event sink that
//! consumes recorded samples.
//!
//! Both are called with a stripe held, possibly on a thread that was
//! interrupted inside `malloc` or another lock. Implementations must not
//! allocate, block, or take locks that the interrupted code could hold.

use tracecore_common::FrameDescriptor;

use super::Event;
use crate::domain::{StripeIndex, ThreadId, TraceId};

/// Fills a caller-provided buffer with the interrupted thread's frames
pub trait StackWalker {
    /// Write up to `frames.len()` frames, innermost first, and return how
    /// many were written. Returning 0 means no stack could be captured.
    fn walk(&self, tid: ThreadId, event: &Event, frames: &mut [FrameDescriptor]) -> usize;
}

impl<F> StackWalker for F
where
    F: Fn(ThreadId, &Event, &mut [FrameDescriptor]) -> usize,
{
    fn walk(&self, tid: ThreadId, event: &Event, frames: &mut [FrameDescriptor]) -> usize {
        self(tid, event, frames)
    }
}

/// Receives every recorded sample while its stripe is still held
///
/// Only one writer per stripe is ever active, so a sink may keep per-stripe
/// state without further synchronization between writers.
pub trait EventSink: Send + Sync {
    fn write(&self, stripe: StripeIndex, tid: ThreadId, trace_id: TraceId, event: &Event);
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn write(&self, _stripe: StripeIndex, _tid: ThreadId, _trace_id: TraceId, _event: &Event) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_walker() {
        let walker = |_tid: ThreadId, _event: &Event, frames: &mut [FrameDescriptor]| {
            frames[0] = FrameDescriptor::new(11, 0);
            1
        };
        let mut buffer = [FrameDescriptor::default(); 4];
        let event = Event::ExecutionSample { cpu_time_ns: 1 };
        assert_eq!(walker.walk(ThreadId(1), &event, &mut buffer), 1);
        assert_eq!(buffer[0].location, 11);
    }
}
