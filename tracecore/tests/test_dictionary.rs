use std::collections::{BTreeMap, HashMap, HashSet};
use std::thread;

use tracecore::intern::{Dictionary, TABLE_CAPACITY};

#[test]
fn test_threads_times_keys_give_distinct_ids() {
    const THREADS: usize = 8;
    const KEYS: usize = 500;

    let dict = Dictionary::new();
    let per_thread: Vec<HashMap<String, u32>> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let dict = &dict;
                s.spawn(move || {
                    (0..KEYS)
                        .map(|k| {
                            let key = format!("thread{t}/key{k}");
                            let id = dict.lookup(key.as_bytes());
                            (key, id)
                        })
                        .collect()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("interning thread panicked")).collect()
    });

    let ids: HashSet<u32> = per_thread.iter().flat_map(|m| m.values().copied()).collect();
    assert_eq!(ids.len(), THREADS * KEYS);
    assert_eq!(dict.len(), THREADS * KEYS);

    for map in &per_thread {
        for (key, id) in map {
            assert_eq!(dict.lookup_existing(key.as_bytes()), Some(*id));
        }
    }
}

#[test]
fn test_shared_keys_are_interned_once_under_concurrency() {
    const THREADS: usize = 8;
    const KEYS: usize = TABLE_CAPACITY as usize * 2;

    let dict = Dictionary::new();
    let results: Vec<Vec<u32>> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let dict = &dict;
                s.spawn(move || {
                    // Walk the keys in a different order per thread to race on every cell.
                    (0..KEYS)
                        .map(|k| {
                            let k = if t % 2 == 0 { k } else { KEYS - 1 - k };
                            (k, dict.lookup(format!("shared-{k}").as_bytes()))
                        })
                        .fold(vec![0; KEYS], |mut acc, (k, id)| {
                            acc[k] = id;
                            acc
                        })
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("interning thread panicked")).collect()
    });

    for other in &results[1..] {
        assert_eq!(other, &results[0]);
    }
    assert_eq!(dict.len(), KEYS);

    let mut dump = BTreeMap::new();
    dict.collect(&mut dump);
    assert_eq!(dump.len(), KEYS);
    for (k, id) in results[0].iter().enumerate() {
        assert_eq!(dump[id], format!("shared-{k}").into_bytes());
    }
}
