//! Call-trace deduplication
//!
//! Frame sequences captured by the stack walker are reduced to small
//! [`TraceId`](crate::domain::TraceId)s with running sample/weight counters.

mod arena;
pub mod call_trace;
pub mod storage;

pub use call_trace::{hash_frames, CallTrace, TraceSample};
pub use storage::{CallTraceStorage, MAX_TRACE_CAPACITY};
