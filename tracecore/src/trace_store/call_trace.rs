//! Frame-sequence identity: hashing and the snapshot types handed out by
//! [`CallTraceStorage`](super::CallTraceStorage).

use tracecore_common::FrameDescriptor;

use crate::domain::TraceId;

const M: u64 = 0xc6a4_a793_5bd1_e995;
const R: u32 = 47;

/// 64-bit `MurmurHash64A`-style hash over every frame, in order.
///
/// Only used to pick a starting slot and to reject mismatches early; equal
/// hashes are always confirmed by a positional frame comparison.
#[must_use]
pub fn hash_frames(frames: &[FrameDescriptor]) -> u64 {
    let mut h = (frames.len() as u64).wrapping_mul(16).wrapping_mul(M);
    for frame in frames {
        h = mix(h, frame.location);
        h = mix(h, u64::from(frame.aux));
    }
    h ^= h >> R;
    h = h.wrapping_mul(M);
    h ^= h >> R;
    h
}

#[inline]
fn mix(h: u64, word: u64) -> u64 {
    let mut k = word.wrapping_mul(M);
    k ^= k >> R;
    k = k.wrapping_mul(M);
    (h ^ k).wrapping_mul(M)
}

/// A stored frame sequence, copied out of the arena
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallTrace {
    pub frames: Vec<FrameDescriptor>,
}

impl CallTrace {
    #[must_use]
    pub fn new(frames: Vec<FrameDescriptor>) -> Self {
        Self { frames }
    }

    /// Innermost (most recently called) frame, if any
    #[must_use]
    pub fn leaf(&self) -> Option<&FrameDescriptor> {
        self.frames.first()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// Counters attached to one trace id at snapshot time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceSample {
    pub trace_id: TraceId,
    /// Number of samples attributed to the trace
    pub samples: u64,
    /// Accumulated weight (bytes, nanoseconds, ...)
    pub counter: u64,
}
