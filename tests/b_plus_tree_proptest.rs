//! Property tests: the tree behaves like an ordered map and stays balanced.

use std::collections::BTreeMap;
use std::sync::Arc;

use crabtree::{BPlusTree, BufferPoolManager, DiskManager, IndexOptions, PageId, RecordId};
use proptest::prelude::*;
use tempfile::tempdir;

#[derive(Debug, Clone)]
enum Op {
    Insert(i32),
    Remove(i32),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..200i32).prop_map(Op::Insert),
        2 => (0..200i32).prop_map(Op::Remove),
    ]
}

fn rid(key: i32) -> RecordId {
    RecordId::new(PageId::new(key as u32), 7)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_matches_btreemap(
        leaf_max in 2usize..7,
        internal_max in 3usize..7,
        ops in prop::collection::vec(op_strategy(), 1..400),
    ) {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("prop.db")).unwrap();
        let bpm = Arc::new(BufferPoolManager::new(128, dm));
        let tree = BPlusTree::<i32>::create("prop", bpm, IndexOptions::new(leaf_max, internal_max)).unwrap();
        let mut model = BTreeMap::new();

        for op in &ops {
            match *op {
                Op::Insert(key) => {
                    let fresh = !model.contains_key(&key);
                    prop_assert_eq!(tree.insert(key, rid(key)).unwrap(), fresh);
                    model.entry(key).or_insert_with(|| rid(key));
                }
                Op::Remove(key) => {
                    prop_assert_eq!(tree.remove(&key).unwrap(), model.remove(&key).is_some());
                    prop_assert_eq!(tree.search(&key).unwrap(), None);
                }
            }
        }

        tree.check_integrity().unwrap();
        let scanned: Vec<(i32, RecordId)> = tree.iter().unwrap().map(|e| e.unwrap()).collect();
        let expected: Vec<(i32, RecordId)> = model.iter().map(|(k, v)| (*k, *v)).collect();
        prop_assert_eq!(scanned, expected);
        prop_assert_eq!(tree.is_empty().unwrap(), model.is_empty());
    }

    #[test]
    fn prop_range_matches_btreemap(
        keys in prop::collection::btree_set(-500i32..500, 0..200),
        lo in -600i32..600,
        len in 0i32..300,
    ) {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("range.db")).unwrap();
        let bpm = Arc::new(BufferPoolManager::new(64, dm));
        let tree = BPlusTree::<i32>::create("range", bpm, IndexOptions::new(4, 4)).unwrap();
        for &key in &keys {
            tree.insert(key, rid(key)).unwrap();
        }

        let hi = lo + len;
        let scanned: Vec<i32> = tree.range(lo..hi).unwrap().map(|e| e.unwrap().0).collect();
        let expected: Vec<i32> = keys.range(lo..hi).copied().collect();
        prop_assert_eq!(scanned, expected);

        let inclusive: Vec<i32> = tree.range(lo..=hi).unwrap().map(|e| e.unwrap().0).collect();
        let expected: Vec<i32> = keys.range(lo..=hi).copied().collect();
        prop_assert_eq!(inclusive, expected);
    }
}
