//! Pre-reserved bump arena for trace records
//!
//! Every byte is allocated once, at session start. During the session new
//! traces bump two cursors (records, frames) with CAS and copy their frames
//! in with relaxed atomic stores; publication to readers happens through the
//! Release store that links the record into a storage slot the caller has
//! already claimed. Nothing is ever
//! freed individually: [`TraceArena::reset`] rewinds both cursors at once.

use std::mem;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use tracecore_common::FrameDescriptor;

/// Header of one stored trace
#[derive(Default)]
struct TraceRecord {
    hash: AtomicU64,
    offset: AtomicU32,
    len: AtomicU32,
}

pub(crate) struct TraceArena {
    records: Box<[TraceRecord]>,
    locations: Box<[AtomicU64]>,
    aux: Box<[AtomicU32]>,
    next_record: AtomicUsize,
    next_frame: AtomicUsize,
}

impl TraceArena {
    /// Reserve room for `records` traces totalling at most `frames` frames.
    pub(crate) fn new(records: usize, frames: usize) -> Self {
        Self {
            records: (0..records).map(|_| TraceRecord::default()).collect(),
            locations: (0..frames).map(|_| AtomicU64::new(0)).collect(),
            aux: (0..frames).map(|_| AtomicU32::new(0)).collect(),
            next_record: AtomicUsize::new(0),
            next_frame: AtomicUsize::new(0),
        }
    }

    /// Copy `frames` into the arena and return the record index.
    ///
    /// Returns `None` once either cursor would run past its reservation.
    /// The caller must publish the index with a Release (or stronger) store
    /// before anyone else reads it.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn allocate(&self, hash: u64, frames: &[FrameDescriptor]) -> Option<u32> {
        let offset = bump(&self.next_frame, frames.len(), self.locations.len())?;
        let index = bump(&self.next_record, 1, self.records.len())?;

        for (i, frame) in frames.iter().enumerate() {
            self.locations[offset + i].store(frame.location, Ordering::Relaxed);
            self.aux[offset + i].store(frame.aux, Ordering::Relaxed);
        }

        let record = &self.records[index];
        record.hash.store(hash, Ordering::Relaxed);
        record.offset.store(offset as u32, Ordering::Relaxed);
        record.len.store(frames.len() as u32, Ordering::Relaxed);

        Some(index as u32)
    }

    /// Positional comparison of a published record against `frames`.
    pub(crate) fn matches(&self, index: u32, hash: u64, frames: &[FrameDescriptor]) -> bool {
        let record = &self.records[index as usize];
        if record.hash.load(Ordering::Relaxed) != hash
            || record.len.load(Ordering::Relaxed) as usize != frames.len()
        {
            return false;
        }

        let offset = record.offset.load(Ordering::Relaxed) as usize;
        frames.iter().enumerate().all(|(i, frame)| {
            self.locations[offset + i].load(Ordering::Relaxed) == frame.location
                && self.aux[offset + i].load(Ordering::Relaxed) == frame.aux
        })
    }

    /// Copy a published record's frames out.
    pub(crate) fn frames(&self, index: u32) -> Vec<FrameDescriptor> {
        let record = &self.records[index as usize];
        let offset = record.offset.load(Ordering::Relaxed) as usize;
        let len = record.len.load(Ordering::Relaxed) as usize;

        (offset..offset + len)
            .map(|i| {
                FrameDescriptor::new(
                    self.locations[i].load(Ordering::Relaxed),
                    self.aux[i].load(Ordering::Relaxed),
                )
            })
            .collect()
    }

    /// Rewind both cursors. Only valid while no record is reachable.
    pub(crate) fn reset(&self) {
        self.next_record.store(0, Ordering::Relaxed);
        self.next_frame.store(0, Ordering::Relaxed);
    }

    pub(crate) fn records_used(&self) -> usize {
        self.next_record.load(Ordering::Relaxed)
    }

    pub(crate) fn frames_used(&self) -> usize {
        self.next_frame.load(Ordering::Relaxed)
    }

    /// Bytes consumed by allocated records and frames
    pub(crate) fn used_memory(&self) -> usize {
        self.records_used() * mem::size_of::<TraceRecord>()
            + self.frames_used() * (mem::size_of::<AtomicU64>() + mem::size_of::<AtomicU32>())
    }

    /// Bytes reserved up front
    pub(crate) fn reserved_memory(&self) -> usize {
        self.records.len() * mem::size_of::<TraceRecord>()
            + self.locations.len() * (mem::size_of::<AtomicU64>() + mem::size_of::<AtomicU32>())
    }
}

/// Advance `cursor` by `amount` unless that passes `limit`; returns the old
/// cursor.
fn bump(cursor: &AtomicUsize, amount: usize, limit: usize) -> Option<usize> {
    cursor
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
            current.checked_add(amount).filter(|&end| end <= limit)
        })
        .ok()
}
