//! # Shared Data Structures (Walker/Sink ↔ Core)
//!
//! Defines the plain data exchanged between the recording core and its
//! external collaborators: the stack walker that fills frame buffers from
//! inside a signal handler, and the event sink that serializes recorded
//! samples. All types use `#[repr(C)]` and are `Copy` so they can be written
//! into pre-allocated buffers without touching an allocator.
//!
//! ## Key Types
//!
//! - [`FrameDescriptor`] - One opaque stack frame (location + auxiliary code)
//!
//! ## Conventions
//!
//! The core never interprets a frame. The `FRAME_*` codes below are the
//! values walkers conventionally store in [`FrameDescriptor::aux`] so that
//! downstream tools agree on their meaning.

#![no_std]

// ============================================================================
// Event Kind Constants
// ============================================================================

/// **CPU Sampling**: timer/perf signal interrupted a running thread
///
/// Counter unit: nanoseconds of CPU time represented by the sample.
pub const EVENT_EXECUTION_SAMPLE: u32 = 1;

/// **Wall-Clock Sampling**: periodic sample regardless of thread state
///
/// Counter unit: nanoseconds of wall time represented by the sample.
pub const EVENT_WALL_CLOCK_SAMPLE: u32 = 2;

/// **Allocation Sampling**: allocation inside a thread-local buffer
///
/// Counter unit: bytes.
pub const EVENT_ALLOC_SAMPLE: u32 = 3;

/// **Allocation Sampling**: allocation outside a thread-local buffer
///
/// Counter unit: bytes.
pub const EVENT_ALLOC_OUTSIDE_TLAB: u32 = 4;

/// **Lock Contention**: thread blocked entering a monitor
///
/// Counter unit: nanoseconds spent blocked.
pub const EVENT_LOCK_SAMPLE: u32 = 5;

/// **Park**: thread parked waiting on a condition
///
/// Counter unit: nanoseconds spent parked.
pub const EVENT_PARK_SAMPLE: u32 = 6;

// ============================================================================
// Frame Type Codes (conventional values for `FrameDescriptor::aux`)
// ============================================================================

/// Interpreted managed frame
pub const FRAME_INTERPRETED: u32 = 0;

/// JIT-compiled managed frame
pub const FRAME_JIT_COMPILED: u32 = 1;

/// Managed frame inlined into its caller
pub const FRAME_INLINED: u32 = 2;

/// Native (C ABI) frame
pub const FRAME_NATIVE: u32 = 3;

/// Runtime-internal C++ frame
pub const FRAME_CPP: u32 = 4;

/// Kernel frame
pub const FRAME_KERNEL: u32 = 5;

/// Placeholder frame for samples whose stack could not be captured
pub const FRAME_UNKNOWN: u32 = u32::MAX;

// ============================================================================
// Limits and Sentinels
// ============================================================================

/// Hard upper bound on frames captured per sample
///
/// Per-stripe frame buffers are sized from the configured depth, which is
/// clamped to this value at session start.
pub const MAX_STACK_DEPTH: usize = 2048;

/// Default number of lock stripes (concurrency level)
pub const DEFAULT_STRIPES: usize = 16;

/// Trace id reserved for "no trace"
///
/// Never returned by a successful insertion.
pub const TRACE_ID_NONE: u32 = 0;

/// Trace id that absorbs samples whose trace could not be stored
///
/// Returned when the trace arena is exhausted. Its counters are reported
/// like any other trace so that no sample weight is silently lost.
pub const TRACE_ID_OVERFLOW: u32 = 0x7fff_ffff;

// ============================================================================
// Shared Data Structures
// ============================================================================

/// One captured stack frame
///
/// Filled by the stack walker inside the signal handler, copied verbatim into
/// the trace arena by the core.
///
/// **Memory Layout**: `#[repr(C)]`, 16 bytes, no pointers
/// **Equality**: field-wise; two frames are the same frame only if both the
/// location and the auxiliary code match
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FrameDescriptor {
    /// Opaque location value
    ///
    /// Typically a method id for managed frames or an instruction pointer
    /// for native frames. Zero is valid only in placeholder frames.
    pub location: u64,

    /// Opaque per-frame auxiliary code
    ///
    /// Typically a bytecode index or one of the `FRAME_*` type codes.
    pub aux: u32,

    /// Padding for 8-byte alignment (always zero)
    padding: [u8; 4],
}

impl FrameDescriptor {
    /// Frame recorded when the walker produced no frames at all
    pub const NO_STACK: Self = Self::new(0, FRAME_UNKNOWN);

    /// Frame reported for the overflow trace
    pub const OVERFLOW: Self = Self::new(u64::MAX, FRAME_UNKNOWN);

    /// Create a frame descriptor
    #[must_use]
    pub const fn new(location: u64, aux: u32) -> Self {
        Self { location, aux, padding: [0; 4] }
    }
}
