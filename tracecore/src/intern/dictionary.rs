//! # Dictionary (lock-free string interning)
//!
//! Maps arbitrary byte strings to small stable `u32` ids. Built from
//! fixed-size tables chained through per-row overflow pointers:
//!
//! ```text
//!  Table (base_index = 1)
//!  ┌──────────┬──────────┬──────────┬────────┐
//!  │ cell 0   │ cell 1   │ cell 2   │ next ──┼──► Table (base_index = 385)
//!  ├──────────┼──────────┼──────────┼────────┤
//!  │   ...    │   ...    │   ...    │ null   │
//!  └──────────┴──────────┴──────────┴────────┘
//!            ROWS = 128 rows × CELLS = 3 cells
//! ```
//!
//! A key's id is `base_index + column * ROWS + row`, so it never changes once
//! published and is unique across every table of the chain.
//!
//! ## Concurrency
//!
//! - Cells go from null to a key exactly once, by CAS. Nothing is ever moved,
//!   rehashed or removed while the dictionary is shared.
//! - A writer that loses the race for a cell frees its copy and compares
//!   against the winner.
//! - Overflow tables are installed lazily by CAS; a losing table is freed
//!   (its base index is simply skipped).
//! - [`Dictionary::clear`] takes `&mut self`, so it cannot overlap a lookup.
//!
//! Lookups allocate a key copy on insertion, so they belong on regular
//! threads, not in signal handlers.

#![allow(unsafe_code)] // raw key/table pointers published through AtomicPtr

use std::collections::BTreeMap;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU32, AtomicUsize, Ordering};

const ROW_BITS: u32 = 7;

/// Rows per table
pub const ROWS: usize = 1 << ROW_BITS;

/// Key cells per row
pub const CELLS: usize = 3;

/// Ids reserved by one table
#[allow(clippy::cast_possible_truncation)]
pub const TABLE_CAPACITY: u32 = (ROWS * CELLS) as u32;

/// Id of the first cell of the root table
pub const BASE_INDEX: u32 = 1;

type Key = Box<[u8]>;

#[derive(Default)]
struct Row {
    keys: [AtomicPtr<Key>; CELLS],
    next: AtomicPtr<Table>,
}

struct Table {
    rows: [Row; ROWS],
    base_index: u32,
}

impl Table {
    fn boxed(base_index: u32) -> Box<Self> {
        Box::new(Self { rows: std::array::from_fn(|_| Row::default()), base_index })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn id_of(&self, row: usize, column: usize) -> u32 {
        self.base_index + (column * ROWS + row) as u32
    }
}

/// Lock-free, append-only string → id table
pub struct Dictionary {
    root: Box<Table>,
    /// Base index of the most recently created table
    last_base: AtomicU32,
    tables: AtomicUsize,
    keys: AtomicUsize,
    key_bytes: AtomicUsize,
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl Dictionary {
    /// Create an empty dictionary with its root table
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Table::boxed(BASE_INDEX),
            last_base: AtomicU32::new(BASE_INDEX),
            tables: AtomicUsize::new(1),
            keys: AtomicUsize::new(0),
            key_bytes: AtomicUsize::new(0),
        }
    }

    /// Return the id for `key`, inserting it if it has never been seen.
    ///
    /// Safe to call from any number of threads at once. Equal keys always get
    /// the same id; different keys never share one (keys are compared by
    /// content, not by hash).
    pub fn lookup(&self, key: &[u8]) -> u32 {
        let mut table: &Table = &self.root;
        let mut h = hash(key);

        loop {
            let row_index = h as usize % ROWS;
            let row = &table.rows[row_index];

            for (column, cell) in row.keys.iter().enumerate() {
                let mut current = cell.load(Ordering::Acquire);

                if current.is_null() {
                    let fresh = Box::into_raw(Box::new(Key::from(key)));
                    match cell.compare_exchange(
                        ptr::null_mut(),
                        fresh,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            self.keys.fetch_add(1, Ordering::Relaxed);
                            self.key_bytes.fetch_add(key.len(), Ordering::Relaxed);
                            return table.id_of(row_index, column);
                        }
                        Err(winner) => {
                            // SAFETY: `fresh` was never published.
                            drop(unsafe { Box::from_raw(fresh) });
                            current = winner;
                        }
                    }
                }

                // SAFETY: published keys are immutable and live until clear(),
                // which needs `&mut self`.
                if unsafe { &**current }.as_ref() == key {
                    return table.id_of(row_index, column);
                }
            }

            let mut next = row.next.load(Ordering::Acquire);
            if next.is_null() {
                next = self.install_overflow(row);
            }
            // SAFETY: published tables live until clear()/drop.
            table = unsafe { &*next };
            h = h.rotate_right(ROW_BITS);
        }
    }

    /// Return the id for `key` only if it was interned before. Never inserts.
    #[must_use]
    pub fn lookup_existing(&self, key: &[u8]) -> Option<u32> {
        let mut table: &Table = &self.root;
        let mut h = hash(key);

        loop {
            let row_index = h as usize % ROWS;
            let row = &table.rows[row_index];

            for (column, cell) in row.keys.iter().enumerate() {
                let current = cell.load(Ordering::Acquire);
                if current.is_null() {
                    return None;
                }
                // SAFETY: see lookup().
                if unsafe { &**current }.as_ref() == key {
                    return Some(table.id_of(row_index, column));
                }
            }

            let next = row.next.load(Ordering::Acquire);
            if next.is_null() {
                return None;
            }
            // SAFETY: see lookup().
            table = unsafe { &*next };
            h = h.rotate_right(ROW_BITS);
        }
    }

    /// Copy every `(id, key)` binding into `out`.
    pub fn collect(&self, out: &mut BTreeMap<u32, Vec<u8>>) {
        let mut pending: Vec<&Table> = vec![&self.root];

        while let Some(table) = pending.pop() {
            for (row_index, row) in table.rows.iter().enumerate() {
                for (column, cell) in row.keys.iter().enumerate() {
                    let current = cell.load(Ordering::Acquire);
                    if !current.is_null() {
                        // SAFETY: see lookup().
                        let key = unsafe { &**current };
                        out.insert(table.id_of(row_index, column), key.to_vec());
                    }
                }
                let next = row.next.load(Ordering::Acquire);
                if !next.is_null() {
                    // SAFETY: see lookup().
                    pending.push(unsafe { &*next });
                }
            }
        }
    }

    /// Number of interned keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes held by tables and keys
    #[must_use]
    pub fn used_memory(&self) -> usize {
        self.tables.load(Ordering::Relaxed) * mem::size_of::<Table>()
            + self.keys.load(Ordering::Relaxed) * mem::size_of::<Key>()
            + self.key_bytes.load(Ordering::Relaxed)
    }

    /// Drop every key and overflow table; ids restart at [`BASE_INDEX`].
    pub fn clear(&mut self) {
        release_rows(&mut self.root);
        *self.last_base.get_mut() = BASE_INDEX;
        *self.tables.get_mut() = 1;
        *self.keys.get_mut() = 0;
        *self.key_bytes.get_mut() = 0;
    }

    fn install_overflow(&self, row: &Row) -> *mut Table {
        let base_index = self.last_base.fetch_add(TABLE_CAPACITY, Ordering::AcqRel) + TABLE_CAPACITY;
        let fresh = Box::into_raw(Table::boxed(base_index));

        match row.next.compare_exchange(ptr::null_mut(), fresh, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.tables.fetch_add(1, Ordering::Relaxed);
                fresh
            }
            Err(winner) => {
                // SAFETY: `fresh` was never published.
                drop(unsafe { Box::from_raw(fresh) });
                winner
            }
        }
    }
}

impl Drop for Dictionary {
    fn drop(&mut self) {
        release_rows(&mut self.root);
    }
}

/// Free every key and child table reachable from `table`, leaving it empty.
fn release_rows(table: &mut Table) {
    for row in &mut table.rows {
        for cell in &mut row.keys {
            let key = mem::replace(cell.get_mut(), ptr::null_mut());
            if !key.is_null() {
                // SAFETY: exclusive access; every non-null cell came from
                // Box::into_raw in lookup().
                drop(unsafe { Box::from_raw(key) });
            }
        }
        let next = mem::replace(row.next.get_mut(), ptr::null_mut());
        if !next.is_null() {
            // SAFETY: exclusive access; installed by install_overflow().
            let mut child = unsafe { Box::from_raw(next) };
            release_rows(&mut child);
        }
    }
}

/// Multiplicative string hash over 4-byte words
fn hash(key: &[u8]) -> u32 {
    #[allow(clippy::cast_possible_truncation)]
    let mut h = key.len() as u32;
    let mut chunks = key.chunks_exact(4);
    for chunk in &mut chunks {
        let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        h = h.wrapping_mul(31).wrapping_add(word);
    }
    for &byte in chunks.remainder() {
        h = h.wrapping_mul(31).wrapping_add(u32::from(byte));
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_first_id_is_base_index() {
        let dict = Dictionary::new();
        let id = dict.lookup(b"java/lang/Thread.run");
        assert!((BASE_INDEX..BASE_INDEX + TABLE_CAPACITY).contains(&id));
        assert_eq!(dict.lookup(b"java/lang/Thread.run"), id);
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn test_distinct_keys_get_distinct_ids() {
        let dict = Dictionary::new();
        let a = dict.lookup(b"alpha");
        let b = dict.lookup(b"beta");
        let empty = dict.lookup(b"");
        assert_ne!(a, b);
        assert_ne!(a, empty);
        assert_ne!(b, empty);
        assert_eq!(dict.lookup(b""), empty);
    }

    #[test]
    fn test_lookup_existing_never_inserts() {
        let dict = Dictionary::new();
        assert_eq!(dict.lookup_existing(b"missing"), None);
        assert!(dict.is_empty());

        let id = dict.lookup(b"present");
        assert_eq!(dict.lookup_existing(b"present"), Some(id));
        assert_eq!(dict.lookup_existing(b"missing"), None);
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn test_overflow_tables_keep_ids_unique() {
        let dict = Dictionary::new();
        let count = TABLE_CAPACITY as usize * 4;
        let ids: Vec<u32> = (0..count).map(|i| dict.lookup(format!("key-{i}").as_bytes())).collect();

        let unique: HashSet<u32> = ids.iter().copied().collect();
        assert_eq!(unique.len(), count);
        assert!(dict.used_memory() > mem::size_of::<Table>());

        for (i, id) in ids.iter().enumerate() {
            assert_eq!(dict.lookup(format!("key-{i}").as_bytes()), *id);
            assert_eq!(dict.lookup_existing(format!("key-{i}").as_bytes()), Some(*id));
        }
    }

    #[test]
    fn test_collect_returns_every_binding() {
        let dict = Dictionary::new();
        let names = ["main", "run", "poll", "park"];
        let ids: Vec<u32> = names.iter().map(|n| dict.lookup(n.as_bytes())).collect();

        let mut out = BTreeMap::new();
        dict.collect(&mut out);
        assert_eq!(out.len(), names.len());
        for (name, id) in names.iter().zip(ids) {
            assert_eq!(out[&id], name.as_bytes());
        }
    }

    #[test]
    fn test_clear_restarts_ids_and_memory() {
        let mut dict = Dictionary::new();
        let baseline = dict.used_memory();
        let first = dict.lookup(b"first");
        for i in 0..2_000 {
            dict.lookup(format!("filler-{i}").as_bytes());
        }
        assert!(dict.used_memory() > baseline);

        dict.clear();
        assert_eq!(dict.used_memory(), baseline);
        assert!(dict.is_empty());
        assert_eq!(dict.lookup_existing(b"first"), None);
        assert_eq!(dict.lookup(b"first"), first);
    }

    #[test]
    fn test_concurrent_lookups_agree() {
        const THREADS: usize = 8;
        let dict = Dictionary::new();
        let keys: Vec<String> = (0..1_000).map(|i| format!("shared-{i}")).collect();

        let results: Vec<Vec<u32>> = thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| s.spawn(|| keys.iter().map(|k| dict.lookup(k.as_bytes())).collect()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for other in &results[1..] {
            assert_eq!(&results[0], other);
        }
        assert_eq!(dict.len(), keys.len());
    }

    #[test]
    fn test_hash_rotation_changes_row() {
        let h = hash(b"some/Class.method");
        let rotated = h.rotate_right(ROW_BITS);
        assert_eq!(rotated as usize % ROWS, (h >> ROW_BITS) as usize % ROWS);
    }
}
