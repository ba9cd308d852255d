//! Synthetic stack walker for driving the core without a managed runtime
//!
//! Builds a fixed set of call-stack shapes up front, each frame's location
//! being the dictionary id of a made-up method name. `walk` copies one shape
//! into the caller's buffer, chosen by a lock-free xorshift sequence, so it
//! never allocates.

use std::sync::atomic::{AtomicU64, Ordering};

use tracecore_common::{FrameDescriptor, FRAME_INLINED, FRAME_INTERPRETED, FRAME_JIT_COMPILED};

use crate::domain::ThreadId;
use crate::recorder::{Event, StackWalker};
use crate::session::Profiler;

const FRAME_KINDS: [u32; 3] = [FRAME_JIT_COMPILED, FRAME_INTERPRETED, FRAME_INLINED];

pub struct SyntheticWalker {
    shapes: Vec<Vec<FrameDescriptor>>,
    seed: AtomicU64,
}

impl SyntheticWalker {
    /// `distinct` shapes of 2 to `max_depth` frames, names interned in
    /// `profiler`.
    #[must_use]
    pub fn new(profiler: &Profiler, distinct: usize, max_depth: usize) -> Self {
        let max_depth = max_depth.max(2);
        let root = u64::from(profiler.intern_name("synthetic::main"));

        let shapes = (0..distinct.max(1))
            .map(|shape| {
                let depth = 2 + shape % (max_depth - 1);
                let mut frames: Vec<FrameDescriptor> = (1..depth)
                    .rev()
                    .map(|level| {
                        let name = format!("synthetic::stack{shape}::level{level}");
                        let id = u64::from(profiler.intern_name(&name));
                        FrameDescriptor::new(id, FRAME_KINDS[level % FRAME_KINDS.len()])
                    })
                    .collect();
                frames.push(FrameDescriptor::new(root, FRAME_INTERPRETED));
                frames
            })
            .collect();

        Self { shapes, seed: AtomicU64::new(0x9e37_79b9_7f4a_7c15) }
    }

    #[must_use]
    pub fn shapes(&self) -> &[Vec<FrameDescriptor>] {
        &self.shapes
    }

    #[allow(clippy::cast_possible_truncation)]
    fn next_shape(&self, tid: ThreadId) -> &[FrameDescriptor] {
        let mut x = self.seed.fetch_add(0x9e37_79b9_7f4a_7c15, Ordering::Relaxed) ^ u64::from(tid.0);
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        // Minimum of two draws: low shape indexes come up more often.
        let n = self.shapes.len() as u64;
        let index = (x % n).min((x >> 32) % n);
        &self.shapes[index as usize]
    }
}

impl StackWalker for SyntheticWalker {
    fn walk(&self, tid: ThreadId, _event: &Event, frames: &mut [FrameDescriptor]) -> usize {
        let shape = self.next_shape(tid);
        let count = shape.len().min(frames.len());
        frames[..count].copy_from_slice(&shape[..count]);
        count
    }
}
