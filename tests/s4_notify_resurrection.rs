//! S4: a `dead_cb` that chooses to resurrect one reaped payload makes it
//! discoverable again after `notify_all`.
//!
//! Run with:
//! cargo test --test s4_notify_resurrection -- --nocapture

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uniquetable::{DeadCallback, Table, TableConfig};

struct ResurrectOnly(u64);
impl DeadCallback for ResurrectOnly {
    fn on_dead(&self, index: u64) -> bool {
        index == self.0
    }
}

mod tc_4_1_resurrected_slot_is_discoverable_again {
    use super::*;

    #[test]
    fn notify_all_republishes_a_resurrected_payload() {
        let t = Table::create(TableConfig::new(512, 512)).unwrap();
        let (i1, _) = t.lookup(1, 1);
        let (i2, _) = t.lookup(2, 2);
        let (i3, _) = t.lookup(3, 3);
        t.mark(i1);
        t.mark(i3);
        t.notify_ondead(i2);
        t.set_ondead(Arc::new(ResurrectOnly(i2)));

        t.clear().unwrap();
        t.rehash().unwrap();
        let resurrected = t.notify_all();
        assert_eq!(resurrected, 1);

        let (found2, created2) = t.lookup(2, 2);
        assert!(!created2, "the resurrected slot should be found, not re-created");
        assert_eq!(found2, i2);
    }
}

mod tc_4_2_unrequested_notify_leaves_slot_dead {
    use super::*;

    #[test]
    fn notify_all_does_not_resurrect_slots_that_never_asked() {
        let t = Table::create(TableConfig::new(512, 512)).unwrap();
        let (i1, _) = t.lookup(1, 1);
        let (_i2, _) = t.lookup(2, 2);
        t.mark(i1);
        t.set_ondead(Arc::new(ResurrectOnly(u64::MAX)));

        t.clear().unwrap();
        t.rehash().unwrap();
        let resurrected = t.notify_all();
        assert_eq!(resurrected, 0);

        let (_found2, created2) = t.lookup(2, 2);
        assert!(created2, "no notify request means the slot stays dead");
    }
}

mod tc_4_3_clear_notify_flag_on_decline {
    use super::*;

    #[test]
    fn declining_resurrection_clears_the_pending_notify_flag() {
        let calls = Arc::new(AtomicU64::new(0));
        struct CountingDecline(Arc<AtomicU64>);
        impl DeadCallback for CountingDecline {
            fn on_dead(&self, _index: u64) -> bool {
                self.0.fetch_add(1, Ordering::Relaxed);
                false
            }
        }

        let t = Table::create(TableConfig::new(512, 512)).unwrap();
        let (i1, _) = t.lookup(1, 1);
        let (i2, _) = t.lookup(2, 2);
        t.mark(i1);
        t.notify_ondead(i2);
        t.set_ondead(Arc::new(CountingDecline(calls.clone())));

        t.clear().unwrap();
        t.rehash().unwrap();
        t.notify_all();
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        // A second notify_all should not re-deliver the same slot.
        t.notify_all();
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }
}
