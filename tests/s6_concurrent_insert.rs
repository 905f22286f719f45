//! S6: many threads racing to insert the same payload observe exactly one
//! `created = true` and all agree on the resulting index.
//!
//! Run with:
//! cargo test --test s6_concurrent_insert -- --nocapture

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use uniquetable::{Table, TableConfig};

mod tc_6_1_one_winner_for_a_shared_payload {
    use super::*;

    #[test]
    fn concurrent_lookups_of_the_same_pair_agree_on_one_index() {
        const THREADS: usize = 16;
        let table = Arc::new(Table::create(TableConfig::new(4096, 4096)).unwrap());
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let table = table.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    table.lookup(42, 99)
                })
            })
            .collect();

        let results: Vec<(u64, bool)> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let indices: HashSet<u64> = results.iter().map(|&(i, _)| i).collect();
        assert_eq!(indices.len(), 1, "every thread must see the same index for the same payload");

        let created_count = results.iter().filter(|&&(_, created)| created).count();
        assert_eq!(created_count, 1, "exactly one thread must observe created = true");
    }
}

mod tc_6_2_distinct_payloads_get_distinct_indices_under_contention {
    use super::*;

    #[test]
    fn concurrent_inserts_of_different_pairs_never_collide() {
        const THREADS: usize = 32;
        let table = Arc::new(Table::create(TableConfig::new(4096, 4096)).unwrap());
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS as u64)
            .map(|n| {
                let table = table.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    table.lookup(n, n * 2)
                })
            })
            .collect();

        let results: Vec<(u64, bool)> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().all(|&(_, created)| created), "distinct payloads must all be fresh inserts");

        let indices: HashSet<u64> = results.iter().map(|&(i, _)| i).collect();
        assert_eq!(indices.len(), THREADS, "distinct payloads must never share an index");
    }
}

mod tc_6_3_repeated_concurrent_lookup_is_stable {
    use super::*;

    #[test]
    fn a_second_wave_of_concurrent_lookups_only_reports_hits() {
        const THREADS: usize = 16;
        let table = Arc::new(Table::create(TableConfig::new(4096, 4096)).unwrap());
        let (first_index, _) = table.lookup(7, 7);

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let table = table.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    table.lookup(7, 7)
                })
            })
            .collect();

        for h in handles {
            let (idx, created) = h.join().unwrap();
            assert!(!created);
            assert_eq!(idx, first_index);
        }
    }
}
