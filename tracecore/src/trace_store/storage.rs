//! # Call Trace Storage
//!
//! Content-addressed map from frame sequence to trace id, safe to call from
//! a signal handler.
//!
//! ```text
//!   put(frames) ──► hash ──► slot = hash & mask
//!                               │
//!          ┌────────────────────┼──────────────────────────┐
//!          ▼                    ▼                          ▼
//!   EMPTY: CAS to CLAIMED   CLAIMED: wait for       record: compare
//!   arena.allocate          the claimant            hash, len, frames
//!   store record + 1             │                         │ equal
//!          │                     └──────► compare ─────────┤
//!          ▼                                               ▼
//!   TraceId(slot + 1) ◄────────────────────────────────────┘
//!                     (mismatch: probe slot + 1)
//! ```
//!
//! A slot is claimed before any arena space is taken, so only the thread
//! that owns the slot ever allocates and every arena record ends up linked.
//! A thread that finds a slot claimed spins a bounded number of times for
//! the record to be published; if the claimant never finishes (it may be
//! the very thread the signal interrupted) the sample goes to overflow.
//!
//! Slots are linked to arena records once and never unlinked until
//! [`CallTraceStorage::clear`]. When the arena or the slot table runs out,
//! the sample lands on [`TraceId::OVERFLOW`], whose counters are kept apart
//! and reported as a single trace with a [`FrameDescriptor::OVERFLOW`] frame.

use std::collections::BTreeMap;
use std::hint;
use std::mem;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use tracecore_common::FrameDescriptor;

use super::arena::TraceArena;
use super::call_trace::{hash_frames, CallTrace, TraceSample};
use crate::domain::{ConfigError, TraceId};
use crate::sync::AllStripes;

/// Largest accepted trace capacity; keeps every slot id below
/// [`TraceId::OVERFLOW`].
pub const MAX_TRACE_CAPACITY: usize = 1 << 29;

/// Spins spent waiting on a claimed slot before giving up
pub const CLAIM_SPINS: u32 = 1 << 12;

const EMPTY: u32 = 0;
/// Slot owned by a `put` that has not published its record yet
const CLAIMED: u32 = u32::MAX;

#[derive(Default)]
struct TraceSlot {
    /// `EMPTY`, `CLAIMED` or arena record index + 1
    record: AtomicU32,
    samples: AtomicU64,
    counter: AtomicU64,
}

impl TraceSlot {
    fn reset(&self) {
        self.record.store(EMPTY, Ordering::Relaxed);
        self.samples.store(0, Ordering::Relaxed);
        self.counter.store(0, Ordering::Relaxed);
    }

    /// Arena record linked to this slot, if published
    fn published(&self) -> Option<u32> {
        match self.record.load(Ordering::Acquire) {
            EMPTY | CLAIMED => None,
            record => Some(record - 1),
        }
    }
}

/// Concurrent insert-or-increment store for call traces
pub struct CallTraceStorage {
    slots: Box<[TraceSlot]>,
    mask: usize,
    arena: TraceArena,
    traces: AtomicUsize,
    overflow_samples: AtomicU64,
    overflow_counter: AtomicU64,
    claim_spins: u32,
    #[cfg(test)]
    claim_hook: Option<Box<dyn Fn() + Send + Sync>>,
}

impl CallTraceStorage {
    /// Reserve space for `trace_capacity` distinct traces holding at most
    /// `frame_capacity` frames in total.
    ///
    /// # Errors
    /// Rejects a zero or oversized trace capacity.
    pub fn new(trace_capacity: usize, frame_capacity: usize) -> Result<Self, ConfigError> {
        if trace_capacity == 0 {
            return Err(ConfigError::ZeroTraceCapacity);
        }
        if trace_capacity > MAX_TRACE_CAPACITY {
            return Err(ConfigError::TraceCapacityTooLarge(trace_capacity));
        }

        // Load factor stays at or below one half.
        let slot_count = (trace_capacity * 2).next_power_of_two();
        Ok(Self {
            slots: (0..slot_count).map(|_| TraceSlot::default()).collect(),
            mask: slot_count - 1,
            arena: TraceArena::new(trace_capacity, frame_capacity),
            traces: AtomicUsize::new(0),
            overflow_samples: AtomicU64::new(0),
            overflow_counter: AtomicU64::new(0),
            claim_spins: CLAIM_SPINS,
            #[cfg(test)]
            claim_hook: None,
        })
    }

    /// Record one sample of `frames` with `weight` and return its trace id.
    ///
    /// Signal-safe: no allocation, no locks, bounded probing and waiting.
    /// Returns [`TraceId::OVERFLOW`] when the trace is new and no space
    /// remains, or when a slot on the probe path stays claimed too long.
    #[allow(clippy::cast_possible_truncation)]
    pub fn put(&self, frames: &[FrameDescriptor], weight: u64) -> TraceId {
        let hash = hash_frames(frames);
        let mut slot_index = (hash as usize) & self.mask;

        for _ in 0..self.slots.len() {
            let slot = &self.slots[slot_index];
            let mut current = slot.record.load(Ordering::Acquire);

            if current == EMPTY {
                match slot.record.compare_exchange(
                    EMPTY,
                    CLAIMED,
                    Ordering::Acquire,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return self.link(slot_index, hash, frames, weight),
                    Err(winner) => current = winner,
                }
            }

            if current == CLAIMED {
                match self.wait_published(slot) {
                    Some(record) => current = record,
                    None => return self.overflow(weight),
                }
            }

            if self.arena.matches(current - 1, hash, frames) {
                return self.hit(slot_index, weight);
            }

            slot_index = (slot_index + 1) & self.mask;
        }

        self.overflow(weight)
    }

    /// Add `weight` to the counter of an existing trace without counting a
    /// sample. Returns `false` for ids this storage never handed out.
    pub fn add(&self, trace_id: TraceId, weight: u64) -> bool {
        if trace_id.is_overflow() {
            self.overflow_counter.fetch_add(weight, Ordering::Relaxed);
            return true;
        }

        match self.slot_of(trace_id) {
            Some(slot) if slot.published().is_some() => {
                slot.counter.fetch_add(weight, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    /// Append one [`TraceSample`] per stored trace, plus the overflow bucket
    /// if it was used.
    #[allow(clippy::cast_possible_truncation)]
    pub fn collect_samples<T>(&self, _held: &AllStripes<'_, T>, out: &mut Vec<TraceSample>) {
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.published().is_none() {
                continue;
            }
            out.push(TraceSample {
                trace_id: TraceId(i as u32 + 1),
                samples: slot.samples.load(Ordering::Relaxed),
                counter: slot.counter.load(Ordering::Relaxed),
            });
        }

        if let Some(overflow) = self.overflow_sample() {
            out.push(overflow);
        }
    }

    /// Copy every stored frame sequence out, keyed by trace id.
    #[allow(clippy::cast_possible_truncation)]
    pub fn collect_traces<T>(
        &self,
        _held: &AllStripes<'_, T>,
        out: &mut BTreeMap<TraceId, CallTrace>,
    ) {
        for (i, slot) in self.slots.iter().enumerate() {
            let Some(record) = slot.published() else {
                continue;
            };
            out.insert(TraceId(i as u32 + 1), CallTrace::new(self.arena.frames(record)));
        }

        if self.overflow_sample().is_some() {
            out.insert(TraceId::OVERFLOW, CallTrace::new(vec![FrameDescriptor::OVERFLOW]));
        }
    }

    /// Forget every trace and rewind the arena.
    ///
    /// Requires every stripe held exclusively so that no `put` is in flight.
    pub fn clear<T>(&self, held: &AllStripes<'_, T>) {
        debug_assert!(held.is_exclusive());
        for slot in &*self.slots {
            slot.reset();
        }
        self.arena.reset();
        self.traces.store(0, Ordering::Relaxed);
        self.overflow_samples.store(0, Ordering::Relaxed);
        self.overflow_counter.store(0, Ordering::Relaxed);
    }

    /// Distinct traces stored (the overflow bucket excluded)
    #[must_use]
    pub fn len(&self) -> usize {
        self.traces.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples that landed on the overflow bucket
    #[must_use]
    pub fn overflow_count(&self) -> u64 {
        self.overflow_samples.load(Ordering::Relaxed)
    }

    /// Bytes in use: the fixed slot table plus the arena's consumed part.
    ///
    /// Drops back to [`CallTraceStorage::baseline_memory`] after a clear.
    #[must_use]
    pub fn used_memory(&self) -> usize {
        self.baseline_memory() + self.arena.used_memory()
    }

    /// Bytes in use by an empty storage
    #[must_use]
    pub fn baseline_memory(&self) -> usize {
        mem::size_of::<Self>() + self.slots.len() * mem::size_of::<TraceSlot>()
    }

    /// Bytes reserved at construction, used or not
    #[must_use]
    pub fn reserved_memory(&self) -> usize {
        self.baseline_memory() + self.arena.reserved_memory()
    }

    /// Fill a slot this thread has claimed. On an exhausted arena the claim
    /// is handed back so that the slot reads as empty again.
    fn link(
        &self,
        slot_index: usize,
        hash: u64,
        frames: &[FrameDescriptor],
        weight: u64,
    ) -> TraceId {
        #[cfg(test)]
        if let Some(hook) = &self.claim_hook {
            hook();
        }

        let slot = &self.slots[slot_index];
        match self.arena.allocate(hash, frames) {
            Some(record) => {
                slot.record.store(record + 1, Ordering::Release);
                self.traces.fetch_add(1, Ordering::Relaxed);
                self.hit(slot_index, weight)
            }
            None => {
                slot.record.store(EMPTY, Ordering::Release);
                self.overflow(weight)
            }
        }
    }

    /// Spin until a claimed slot is published. `None` if the claim was
    /// handed back or outlived the spin budget.
    fn wait_published(&self, slot: &TraceSlot) -> Option<u32> {
        for _ in 0..self.claim_spins {
            match slot.record.load(Ordering::Acquire) {
                CLAIMED => hint::spin_loop(),
                EMPTY => return None,
                record => return Some(record),
            }
        }
        None
    }

    fn slot_of(&self, trace_id: TraceId) -> Option<&TraceSlot> {
        let index = (trace_id.0 as usize).checked_sub(1)?;
        self.slots.get(index)
    }

    fn hit(&self, slot_index: usize, weight: u64) -> TraceId {
        let slot = &self.slots[slot_index];
        slot.samples.fetch_add(1, Ordering::Relaxed);
        slot.counter.fetch_add(weight, Ordering::Relaxed);
        #[allow(clippy::cast_possible_truncation)]
        TraceId(slot_index as u32 + 1)
    }

    fn overflow(&self, weight: u64) -> TraceId {
        self.overflow_samples.fetch_add(1, Ordering::Relaxed);
        self.overflow_counter.fetch_add(weight, Ordering::Relaxed);
        TraceId::OVERFLOW
    }

    fn overflow_sample(&self) -> Option<TraceSample> {
        let samples = self.overflow_samples.load(Ordering::Relaxed);
        let counter = self.overflow_counter.load(Ordering::Relaxed);
        (samples != 0 || counter != 0).then_some(TraceSample {
            trace_id: TraceId::OVERFLOW,
            samples,
            counter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::StripeSet;
    use std::thread;
    use std::time::Duration;

    fn frames(locations: &[u64]) -> Vec<FrameDescriptor> {
        locations.iter().map(|&l| FrameDescriptor::new(l, 0)).collect()
    }

    /// Storage whose next claim parks until the returned sender fires.
    /// The first receiver reports that the claim was taken.
    fn parked_on_claim(
        capacity: usize,
        spins: u32,
    ) -> (CallTraceStorage, crossbeam_channel::Receiver<()>, crossbeam_channel::Sender<()>) {
        let (claimed_tx, claimed_rx) = crossbeam_channel::bounded(1);
        let (go_tx, go_rx) = crossbeam_channel::bounded::<()>(1);
        let mut storage = CallTraceStorage::new(capacity, 64).unwrap();
        storage.claim_spins = spins;
        storage.claim_hook = Some(Box::new(move || {
            claimed_tx.send(()).unwrap();
            go_rx.recv().unwrap();
        }));
        (storage, claimed_rx, go_tx)
    }

    fn claimed_slots(storage: &CallTraceStorage) -> usize {
        storage.slots.iter().filter(|s| s.record.load(Ordering::Relaxed) == CLAIMED).count()
    }

    fn samples_of(storage: &CallTraceStorage) -> Vec<TraceSample> {
        let stripes = StripeSet::new(1, |_| ());
        let held = stripes.lock_all_shared();
        let mut out = Vec::new();
        storage.collect_samples(&held, &mut out);
        out
    }

    #[test]
    fn test_rejects_bad_capacity() {
        assert_eq!(CallTraceStorage::new(0, 10).err(), Some(ConfigError::ZeroTraceCapacity));
        assert!(matches!(
            CallTraceStorage::new(MAX_TRACE_CAPACITY + 1, 10),
            Err(ConfigError::TraceCapacityTooLarge(_))
        ));
    }

    #[test]
    fn test_same_frames_share_one_id() {
        let storage = CallTraceStorage::new(16, 256).unwrap();
        let stack = frames(&[1, 2, 3]);

        let first = storage.put(&stack, 5);
        for _ in 0..99 {
            assert_eq!(storage.put(&stack, 5), first);
        }

        assert!(first.is_valid());
        assert_eq!(storage.len(), 1);
        let samples = samples_of(&storage);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].samples, 100);
        assert_eq!(samples[0].counter, 500);
    }

    #[test]
    fn test_one_differing_frame_gives_two_ids() {
        let storage = CallTraceStorage::new(16, 256).unwrap();
        let a = storage.put(&frames(&[1, 2, 3]), 1);
        let b = storage.put(&frames(&[1, 2, 4]), 1);
        let mut changed_aux = frames(&[1, 2, 3]);
        changed_aux[1].aux = 7;
        let c = storage.put(&changed_aux, 1);

        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
        assert_eq!(storage.len(), 3);
    }

    #[test]
    fn test_prefix_is_a_different_trace() {
        let storage = CallTraceStorage::new(16, 256).unwrap();
        assert_ne!(storage.put(&frames(&[1, 2, 3]), 1), storage.put(&frames(&[1, 2]), 1));
    }

    #[test]
    fn test_exhausted_arena_goes_to_overflow_bucket() {
        let storage = CallTraceStorage::new(2, 64).unwrap();
        let a = storage.put(&frames(&[1]), 1);
        let b = storage.put(&frames(&[2]), 1);
        let c = storage.put(&frames(&[3]), 10);
        let d = storage.put(&frames(&[4]), 20);

        assert!(a.is_valid() && b.is_valid());
        assert_eq!(c, TraceId::OVERFLOW);
        assert_eq!(d, TraceId::OVERFLOW);
        assert_eq!(storage.overflow_count(), 2);

        // Known traces still count after exhaustion.
        assert_eq!(storage.put(&frames(&[1]), 1), a);

        let overflow = samples_of(&storage)
            .into_iter()
            .find(|s| s.trace_id.is_overflow())
            .unwrap();
        assert_eq!(overflow.samples, 2);
        assert_eq!(overflow.counter, 30);
        assert_eq!(claimed_slots(&storage), 0);
    }

    #[test]
    fn test_same_trace_waits_for_claimant_at_capacity() {
        let (storage, claimed, go) = parked_on_claim(1, u32::MAX);
        let stack = frames(&[1, 2, 3]);

        let (first, second) = thread::scope(|s| {
            let claimant = s.spawn(|| storage.put(&stack, 1));
            claimed.recv().unwrap();
            // Slot is claimed but the only arena record is still free.
            let waiter = s.spawn(|| storage.put(&stack, 1));
            thread::sleep(Duration::from_millis(20));
            go.send(()).unwrap();
            (claimant.join().unwrap(), waiter.join().unwrap())
        });

        assert!(first.is_valid());
        assert_eq!(first, second);
        assert_eq!(storage.overflow_count(), 0);
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.arena.records_used(), 1);
        assert_eq!(samples_of(&storage)[0].samples, 2);
    }

    #[test]
    fn test_stalled_claim_sends_waiter_to_overflow() {
        let (storage, claimed, go) = parked_on_claim(4, 16);
        let stack = frames(&[7, 8]);

        let (first, second) = thread::scope(|s| {
            let claimant = s.spawn(|| storage.put(&stack, 1));
            claimed.recv().unwrap();
            let second = storage.put(&stack, 3);
            go.send(()).unwrap();
            (claimant.join().unwrap(), second)
        });

        assert!(first.is_valid());
        assert_eq!(second, TraceId::OVERFLOW);
        assert_eq!(storage.overflow_count(), 1);
        assert_eq!(storage.len(), 1);
        assert_eq!(claimed_slots(&storage), 0);
    }

    #[test]
    fn test_frame_pool_exhaustion_goes_to_overflow() {
        let storage = CallTraceStorage::new(8, 4).unwrap();
        assert!(storage.put(&frames(&[1, 2, 3]), 1).is_valid());
        assert!(storage.put(&frames(&[4, 5]), 1).is_overflow());
    }

    #[test]
    fn test_add_only_touches_counter() {
        let storage = CallTraceStorage::new(4, 64).unwrap();
        let id = storage.put(&frames(&[9]), 1);

        assert!(storage.add(id, 41));
        assert!(!storage.add(TraceId(3), 1));
        assert!(!storage.add(TraceId::NONE, 1));
        assert!(!storage.add(TraceId(1_000_000), 1));

        let sample = samples_of(&storage)[0];
        assert_eq!(sample.samples, 1);
        assert_eq!(sample.counter, 42);
    }

    #[test]
    fn test_collect_traces_copies_frames() {
        let storage = CallTraceStorage::new(4, 64).unwrap();
        let id = storage.put(&frames(&[5, 6]), 1);
        storage.put(&frames(&[7]), 1);
        let stripes = StripeSet::new(2, |_| ());
        let held = stripes.lock_all_shared();

        let mut traces = BTreeMap::new();
        storage.collect_traces(&held, &mut traces);
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[&id].frames, frames(&[5, 6]));
        assert!(!traces.contains_key(&TraceId::OVERFLOW));
    }

    #[test]
    fn test_clear_returns_to_baseline() {
        let storage = CallTraceStorage::new(8, 128).unwrap();
        let baseline = storage.used_memory();
        assert_eq!(baseline, storage.baseline_memory());

        for i in 0..20 {
            storage.put(&frames(&[i, i + 1]), 1);
        }
        assert!(storage.used_memory() > baseline);
        assert!(storage.overflow_count() > 0);

        let stripes = StripeSet::new(2, |_| ());
        storage.clear(&stripes.lock_all());
        assert_eq!(storage.used_memory(), baseline);
        assert!(storage.is_empty());
        assert_eq!(storage.overflow_count(), 0);
        assert!(samples_of(&storage).is_empty());
    }

    #[test]
    fn test_concurrent_puts_agree() {
        // Exactly as many records as distinct traces: racing inserts of the
        // same frames must not use up extra records.
        let storage = CallTraceStorage::new(16, 1024).unwrap();
        let ids: Vec<Vec<TraceId>> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        (0..16u64).map(|k| storage.put(&frames(&[k, k * 3, 99]), 1)).collect()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for per_thread in &ids[1..] {
            assert_eq!(per_thread, &ids[0]);
        }
        assert_eq!(storage.len(), 16);
        assert_eq!(storage.arena.records_used(), 16);
        assert_eq!(storage.overflow_count(), 0);
        let total: u64 = samples_of(&storage).iter().map(|s| s.samples).sum();
        assert_eq!(total, 8 * 16);
    }
}
