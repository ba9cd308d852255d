//! # tracecore - Signal-Safe Sample Recording Core
//!
//! tracecore is the part of a sampling profiler that runs inside the
//! profiling signal handler. It turns "thread T was interrupted here" into a
//! compact trace id with running counters, without allocating, blocking or
//! unwinding, and interns the names those traces refer to.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Signal handler (any thread)                     │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ record_sample(tid, event, walker)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    SampleRecorder                               │
//! │  stripe = mix(tid)  →  try_lock ×3  →  walker.walk(frames)      │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐     │
//! │  │ StripeSet    │   │ CallTraceStorage │──▶│  EventSink   │     │
//! │  │ (SpinLocks + │──▶│  (frames → id,   │   │ (per-stripe  │     │
//! │  │  frame bufs) │   │   arena, counts) │   │   queues)    │     │
//! │  └──────────────┘   └──────────────────┘   └──────────────┘     │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ dump() under shared hold of all stripes
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │   Profile  ──▶  analysis (hot traces / frames)  ──▶  export     │
//! │              names from the Dictionary                          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! ### Recording Path (signal-safe)
//!
//! - [`sync`]: `SpinLock` (exclusive/shared on one word) and `StripeSet`
//! - [`trace_store`]: frame hashing, bump arena, `CallTraceStorage`
//! - [`recorder`]: `SampleRecorder`, collaborator traits, `Event` payloads,
//!   failure counters
//!
//! ### Session and Off-Path Modules
//!
//! - [`session`]: `Profiler` (owns everything) and `SessionConfig`
//! - [`intern`]: lock-free append-only `Dictionary` for names
//! - [`sink`]: `BufferedEventSink`, drained from a regular thread
//! - [`profile`]: owned snapshot types produced by `Profiler::dump`
//! - [`analysis`]: hot traces and hot leaf frames
//! - [`export`]: JSON profile output
//! - [`synthetic`]: a stack walker producing made-up stacks
//! - [`cli`]: command-line arguments for the driver binary
//! - [`domain`]: newtypes (`ThreadId`, `TraceId`, `StripeIndex`) and errors
//!
//! ## Failure Model
//!
//! Nothing on the recording path returns `Result` or panics. A sample is
//! either recorded (possibly against the overflow trace or the "no stack"
//! trace) or dropped, and every degraded outcome bumps a counter visible in
//! [`profile::ProfileStats`].
//!
//! ## Typical Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use tracecore::domain::ThreadId;
//! use tracecore::recorder::{Event, NullSink};
//! use tracecore::session::{Profiler, SessionConfig};
//! use tracecore_common::FrameDescriptor;
//!
//! let mut profiler = Profiler::new(Arc::new(NullSink));
//! profiler.start(SessionConfig::default()).unwrap();
//!
//! let walker = |_tid: ThreadId, _event: &Event, frames: &mut [FrameDescriptor]| {
//!     frames[0] = FrameDescriptor::new(0x1000, 0);
//!     1
//! };
//! profiler.record_sample(ThreadId::current(), &Event::ExecutionSample { cpu_time_ns: 10_000 }, &walker);
//!
//! let profile = profiler.dump();
//! assert_eq!(profile.total_samples(), 1);
//! ```

pub mod analysis;
pub mod cli;
pub mod domain;
pub mod export;
pub mod intern;
pub mod profile;
pub mod recorder;
pub mod session;
pub mod sink;
pub mod sync;
pub mod synthetic;
pub mod trace_store;
