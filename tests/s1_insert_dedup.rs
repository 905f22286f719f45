//! S1: insert/dedup on an otherwise-empty table.
//!
//! Run with:
//! cargo test --test s1_insert_dedup -- --nocapture

use uniquetable::{Table, TableConfig};

fn setup() -> Table {
    Table::create(TableConfig::new(512, 512)).unwrap()
}

mod tc_1_1_first_insert_creates {
    use super::*;

    #[test]
    fn first_lookup_creates_a_reserved_index() {
        let t = setup();
        let (i1, created) = t.lookup(7, 11);
        assert!(created);
        assert!(i1 >= 2, "indices 0 and 1 are reserved");
    }
}

mod tc_1_2_repeat_insert_dedups {
    use super::*;

    #[test]
    fn second_lookup_of_same_payload_returns_same_index() {
        let t = setup();
        let (i1, _) = t.lookup(7, 11);
        let (i1b, created) = t.lookup(7, 11);
        assert!(!created);
        assert_eq!(i1, i1b);
    }
}

mod tc_1_3_distinct_payload_gets_distinct_index {
    use super::*;

    #[test]
    fn differing_second_word_is_a_distinct_entry() {
        let t = setup();
        let (i1, _) = t.lookup(7, 11);
        let (i2, created) = t.lookup(7, 12);
        assert!(created);
        assert_ne!(i1, i2);
    }
}
