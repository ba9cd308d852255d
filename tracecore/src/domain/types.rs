//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent common bugs like passing a stripe index
//! where a trace id is expected, and make function signatures more expressive.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracecore_common::{TRACE_ID_NONE, TRACE_ID_OVERFLOW};

/// Thread ID
///
/// Kernel thread id of the thread a sample was taken on. Used to pick the
/// lock stripe and forwarded to the event sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ThreadId(pub u32);

impl ThreadId {
    /// Kernel thread id of the calling thread
    ///
    /// Async-signal-safe: a single raw syscall, no allocation.
    #[allow(unsafe_code)]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub fn current() -> Self {
        #[cfg(target_os = "linux")]
        {
            // SAFETY: SYS_gettid takes no arguments and cannot fail.
            let tid = unsafe { libc::syscall(libc::SYS_gettid) };
            Self(tid as u32)
        }
        #[cfg(not(target_os = "linux"))]
        {
            // SAFETY: pthread_self has no preconditions.
            let handle = unsafe { libc::pthread_self() };
            Self(handle as usize as u32)
        }
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TID:{}", self.0)
    }
}

impl From<u32> for ThreadId {
    fn from(tid: u32) -> Self {
        ThreadId(tid)
    }
}

/// Trace ID
///
/// Small stable integer identifying one distinct call-stack shape for the
/// lifetime of a session. `0` means "no trace"; [`TraceId::OVERFLOW`] absorbs
/// samples whose trace could not be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(pub u32);

impl TraceId {
    /// No trace was resolved
    pub const NONE: TraceId = TraceId(TRACE_ID_NONE);

    /// Sentinel for samples whose trace did not fit in the arena
    pub const OVERFLOW: TraceId = TraceId(TRACE_ID_OVERFLOW);

    /// Returns true if this id names a stored trace or the overflow bucket
    #[must_use]
    pub fn is_valid(self) -> bool {
        self != Self::NONE
    }

    /// Returns true if this is the overflow sentinel
    #[must_use]
    pub fn is_overflow(self) -> bool {
        self == Self::OVERFLOW
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_overflow() {
            write!(f, "Trace#overflow")
        } else {
            write!(f, "Trace#{}", self.0)
        }
    }
}

/// Stripe index
///
/// Index of one lock stripe (0-based). Always smaller than the session's
/// configured stripe count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StripeIndex(pub usize);

impl fmt::Display for StripeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stripe#{}", self.0)
    }
}
