//! B+Tree integration tests: structure, persistence and concurrency.

use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;

use crabtree::storage::page::{InternalPage, LeafPage};
use crabtree::{
    BPlusTree, BufferPoolManager, DiskManager, Error, GenericKey, IndexOptions, PageId, RecordId,
    ReplacerKind,
};
use tempfile::tempdir;

fn rid(key: i64) -> RecordId {
    RecordId::new(PageId::new((key as u32) >> 8), key as u32 & 0xFF)
}

fn create_bpm(pool_size: usize) -> (Arc<BufferPoolManager>, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let dm = DiskManager::create(dir.path().join("index.db")).unwrap();
    (Arc::new(BufferPoolManager::new(pool_size, dm)), dir)
}

fn keys_of(tree: &BPlusTree<i64>) -> Vec<i64> {
    tree.iter().unwrap().map(|entry| entry.unwrap().0).collect()
}

fn leaf_keys(bpm: &BufferPoolManager, page_id: PageId) -> Vec<i64> {
    let guard = bpm.fetch_page_read(page_id).unwrap();
    let leaf = LeafPage::<i64>::decode(&guard).unwrap();
    leaf.entries().iter().map(|(key, _)| *key).collect()
}

// ============================================================================
// Structure
// ============================================================================

#[test]
fn test_fifth_insert_splits_leaf() {
    let (bpm, _dir) = create_bpm(16);
    let tree = BPlusTree::<i64>::create("idx", bpm.clone(), IndexOptions::new(4, 4)).unwrap();

    for key in 1..=4 {
        tree.insert(key, rid(key)).unwrap();
    }
    // Still a single leaf.
    assert_eq!(leaf_keys(&bpm, tree.root_page_id().unwrap()), vec![1, 2, 3, 4]);

    tree.insert(5, rid(5)).unwrap();
    let root = {
        let guard = bpm.fetch_page_read(tree.root_page_id().unwrap()).unwrap();
        InternalPage::<i64>::decode(&guard).unwrap()
    };
    assert_eq!(root.len(), 2);
    assert_eq!(root.key_at(1), 4);
    assert_eq!(leaf_keys(&bpm, root.child_at(0)), vec![1, 2, 3]);
    assert_eq!(leaf_keys(&bpm, root.child_at(1)), vec![4, 5]);
    tree.check_integrity().unwrap();
}

#[test]
fn test_underflow_against_minimal_sibling_merges() {
    let (bpm, _dir) = create_bpm(16);
    let tree = BPlusTree::<i64>::create("idx", bpm.clone(), IndexOptions::new(4, 4)).unwrap();
    for key in [1, 2, 3, 4, 5] {
        tree.insert(key, rid(key)).unwrap();
    }
    // [1,2,3] [4,5] -> [1,2] [4,5]: both leaves now at minimum.
    tree.remove(&3).unwrap();
    let root_before = tree.root_page_id().unwrap();

    // [1] underflows next to [4,5] at minimum: merge, root collapses.
    tree.remove(&2).unwrap();
    let root = tree.root_page_id().unwrap();
    assert_ne!(root, root_before);
    assert_eq!(leaf_keys(&bpm, root), vec![1, 4, 5]);
    assert!(!bpm.contains_page(root_before));
    tree.check_integrity().unwrap();
}

#[test]
fn test_underflow_borrows_from_richer_sibling() {
    let (bpm, _dir) = create_bpm(16);
    let tree = BPlusTree::<i64>::create("idx", bpm.clone(), IndexOptions::new(4, 4)).unwrap();
    for key in 1..=6 {
        tree.insert(key, rid(key)).unwrap();
    }
    // [1,2,3] [4,5,6]: removing 1 and 2 leaves [3] beside [4,5,6].
    tree.remove(&1).unwrap();
    tree.remove(&2).unwrap();

    let root = {
        let guard = bpm.fetch_page_read(tree.root_page_id().unwrap()).unwrap();
        InternalPage::<i64>::decode(&guard).unwrap()
    };
    assert_eq!(root.len(), 2);
    assert_eq!(leaf_keys(&bpm, root.child_at(0)), vec![3, 4]);
    assert_eq!(leaf_keys(&bpm, root.child_at(1)), vec![5, 6]);
    assert_eq!(root.key_at(1), 5);
    tree.check_integrity().unwrap();
}

#[test]
fn test_deep_tree_grows_and_shrinks() {
    let (bpm, _dir) = create_bpm(64);
    let tree = BPlusTree::<i64>::create("idx", bpm.clone(), IndexOptions::new(3, 3)).unwrap();

    for key in 0..500 {
        assert!(tree.insert(key, rid(key)).unwrap());
    }
    tree.check_integrity().unwrap();
    assert_eq!(keys_of(&tree), (0..500).collect::<Vec<_>>());

    for key in (0..500).rev() {
        assert!(tree.remove(&key).unwrap(), "remove {}", key);
        if key % 50 == 0 {
            tree.check_integrity().unwrap();
        }
    }
    assert!(tree.is_empty().unwrap());
    assert_eq!(tree.root_page_id().unwrap(), PageId::INVALID);
}

#[test]
fn test_search_and_remove_round_trip() {
    let (bpm, _dir) = create_bpm(32);
    let tree = BPlusTree::<i64>::create("idx", bpm, IndexOptions::new(5, 4)).unwrap();

    for key in (0..200).map(|i| (i * 7919) % 1000) {
        assert!(tree.insert(key, rid(key)).unwrap());
        assert_eq!(tree.search(&key).unwrap(), Some(rid(key)));
    }
    assert!(!tree.insert(7919 % 1000, rid(0)).unwrap());

    for key in (0..200).map(|i| (i * 7919) % 1000).step_by(2) {
        assert!(tree.remove(&key).unwrap());
        assert_eq!(tree.search(&key).unwrap(), None);
        assert!(!tree.remove(&key).unwrap());
    }
    tree.check_integrity().unwrap();
}

#[test]
fn test_small_pool_forces_eviction() {
    for kind in [ReplacerKind::Fifo, ReplacerKind::Clock] {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("index.db")).unwrap();
        let bpm = Arc::new(BufferPoolManager::with_replacer(24, dm, kind));
        let tree = BPlusTree::<i64>::create("idx", bpm.clone(), IndexOptions::new(4, 4)).unwrap();

        for key in 0..400 {
            tree.insert(key, rid(key)).unwrap();
        }
        for key in (0..400).step_by(3) {
            tree.remove(&key).unwrap();
        }
        tree.check_integrity().unwrap();
        let expected: Vec<i64> = (0..400).filter(|k| k % 3 != 0).collect();
        assert_eq!(keys_of(&tree), expected, "{kind:?}");
        assert!(bpm.stats().snapshot().evictions > 0);
    }
}

// ============================================================================
// Directory and persistence
// ============================================================================

#[test]
fn test_reopen_after_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.db");
    let options = IndexOptions::new(8, 8);

    {
        let bpm = Arc::new(BufferPoolManager::new(32, DiskManager::create(&path).unwrap()));
        let tree = BPlusTree::<i64>::create("orders", bpm.clone(), options).unwrap();
        for key in 0..300 {
            tree.insert(key, rid(key)).unwrap();
        }
        for key in 100..200 {
            tree.remove(&key).unwrap();
        }
        bpm.flush_all_pages().unwrap();
    }

    let bpm = Arc::new(BufferPoolManager::new(32, DiskManager::open(&path).unwrap()));
    let tree = BPlusTree::<i64>::open("orders", bpm, options).unwrap();
    tree.check_integrity().unwrap();

    let expected: Vec<i64> = (0..100).chain(200..300).collect();
    assert_eq!(keys_of(&tree), expected);
    assert_eq!(tree.search(&250).unwrap(), Some(rid(250)));
    assert_eq!(tree.search(&150).unwrap(), None);
}

#[test]
fn test_indexes_share_a_file() {
    let (bpm, _dir) = create_bpm(32);
    let options = IndexOptions::new(4, 4);
    let evens = BPlusTree::<i64>::create("evens", bpm.clone(), options).unwrap();
    let odds = BPlusTree::<i64>::create("odds", bpm.clone(), options).unwrap();

    for key in 0..100 {
        let tree = if key % 2 == 0 { &evens } else { &odds };
        tree.insert(key, rid(key)).unwrap();
    }

    assert!(keys_of(&evens).iter().all(|k| k % 2 == 0));
    assert!(keys_of(&odds).iter().all(|k| k % 2 == 1));
    assert_ne!(evens.root_page_id().unwrap(), odds.root_page_id().unwrap());

    let again = BPlusTree::<i64>::open("odds", bpm, options).unwrap();
    assert_eq!(again.search(&51).unwrap(), Some(rid(51)));
}

#[test]
fn test_directory_rejects_bad_names() {
    let (bpm, _dir) = create_bpm(8);
    let options = IndexOptions::new(4, 4);

    let long = "x".repeat(33);
    assert!(matches!(
        BPlusTree::<i64>::create(&long, bpm.clone(), options),
        Err(Error::InvalidIndexName(_))
    ));
    assert!(matches!(
        BPlusTree::<i64>::create("", bpm.clone(), options),
        Err(Error::InvalidIndexName(_))
    ));
    assert!(matches!(
        BPlusTree::<i64>::open("nope", bpm.clone(), options),
        Err(Error::IndexNotFound(_))
    ));
    assert!(matches!(
        BPlusTree::<i64>::create("idx", bpm, IndexOptions::new(1, 4)),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn test_generic_keys() {
    let (bpm, _dir) = create_bpm(32);
    let tree = BPlusTree::<GenericKey<16>>::create("names", bpm, IndexOptions::new(6, 6)).unwrap();

    let names = ["delta", "alpha", "echo", "charlie", "bravo", "foxtrot", "golf", "hotel"];
    for (i, name) in names.iter().enumerate() {
        tree.insert(GenericKey::from_bytes(name.as_bytes()), RecordId::new(PageId::new(i as u32), 0))
            .unwrap();
    }
    tree.check_integrity().unwrap();

    let ordered: Vec<GenericKey<16>> = tree.iter().unwrap().map(|e| e.unwrap().0).collect();
    let mut expected: Vec<GenericKey<16>> =
        names.iter().map(|name| GenericKey::from_bytes(name.as_bytes())).collect();
    expected.sort();
    assert_eq!(ordered, expected);

    let from = GenericKey::from_bytes(b"d");
    let tail: Vec<_> = tree.iter_from(&from).unwrap().map(|e| e.unwrap().0).collect();
    assert_eq!(tail.first(), Some(&GenericKey::from_bytes(b"delta")));
    assert_eq!(tail.len(), 5);
}

#[test]
fn test_destroy_frees_pages() {
    let (bpm, _dir) = create_bpm(32);
    let options = IndexOptions::new(4, 4);
    let keep = BPlusTree::<i64>::create("keep", bpm.clone(), options).unwrap();
    let doomed = BPlusTree::<i64>::create("doomed", bpm.clone(), options).unwrap();
    keep.insert(1, rid(1)).unwrap();
    for key in 0..60 {
        doomed.insert(key, rid(key)).unwrap();
    }
    let doomed_root = doomed.root_page_id().unwrap();

    assert!(doomed.destroy().unwrap().is_empty());
    assert!(!bpm.contains_page(doomed_root));
    assert!(matches!(
        BPlusTree::<i64>::open("doomed", bpm.clone(), options),
        Err(Error::IndexNotFound(_))
    ));
    assert_eq!(keep.search(&1).unwrap(), Some(rid(1)));

    // Page 0 is the directory and page 1 is `keep`'s root; the lowest freed
    // page comes back first.
    let fresh = BPlusTree::<i64>::create("doomed", bpm.clone(), options).unwrap();
    fresh.insert(5, rid(5)).unwrap();
    assert_eq!(fresh.root_page_id().unwrap(), PageId::new(2));
}

#[test]
fn test_destroy_reports_pages_a_reader_still_pins() {
    let (bpm, _dir) = create_bpm(32);
    let tree = BPlusTree::<i64>::create("idx", bpm.clone(), IndexOptions::new(4, 4)).unwrap();
    for key in 0..20 {
        tree.insert(key, rid(key)).unwrap();
    }
    let root = tree.root_page_id().unwrap();

    let reader = bpm.fetch_page_read(root).unwrap();
    assert_eq!(tree.destroy().unwrap(), vec![root]);
    drop(reader);

    bpm.delete_page(root).unwrap();
    assert!(matches!(
        BPlusTree::<i64>::open("idx", bpm, IndexOptions::new(4, 4)),
        Err(Error::IndexNotFound(_))
    ));
}

// ============================================================================
// Frame exhaustion
// ============================================================================

#[test]
fn test_failed_operations_leave_tree_unchanged_under_frame_pressure() {
    use std::sync::atomic::{AtomicBool, Ordering};

    const KEYS: i64 = 400;

    let (bpm, _dir) = create_bpm(24);
    let tree = Arc::new(BPlusTree::<i64>::create("idx", bpm.clone(), IndexOptions::new(4, 4)).unwrap());
    for key in (0..KEYS).step_by(2) {
        tree.insert(key, rid(key)).unwrap();
    }

    // Another thread keeps grabbing most of the pool, so splits and merges
    // regularly run out of frames part way through.
    let done = Arc::new(AtomicBool::new(false));
    let hog = {
        let bpm = Arc::clone(&bpm);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut grabs = 0usize;
            while !done.load(Ordering::Relaxed) {
                let held: Vec<_> = (0..14).map_while(|_| bpm.new_page().ok()).collect();
                let ids: Vec<PageId> = held.iter().map(|guard| guard.page_id()).collect();
                thread::yield_now();
                drop(held);
                for page_id in ids {
                    bpm.delete_page(page_id).unwrap();
                }
                grabs += 1;
            }
            grabs
        })
    };

    let mut expected: BTreeSet<i64> = (0..KEYS).step_by(2).collect();
    for round in 0..3 {
        for key in 0..KEYS {
            let key = (key * 7 + round * 13) % KEYS;
            let result = if expected.contains(&key) {
                tree.remove(&key).map(|removed| (removed, false))
            } else {
                tree.insert(key, rid(key)).map(|inserted| (inserted, true))
            };
            match result {
                Ok((changed, inserted)) => {
                    assert!(changed, "key {key}");
                    if inserted {
                        expected.insert(key);
                    } else {
                        expected.remove(&key);
                    }
                }
                // Nothing changed; the shadow set stays as it is.
                Err(Error::NoFreeFrames) => {}
                Err(e) => panic!("unexpected error on key {key}: {e}"),
            }
        }
    }

    done.store(true, Ordering::Relaxed);
    assert!(hog.join().unwrap() > 0);

    tree.check_integrity().unwrap();
    assert_eq!(keys_of(&tree).into_iter().collect::<BTreeSet<_>>(), expected);
    for &key in expected.iter().step_by(11) {
        assert_eq!(tree.search(&key).unwrap(), Some(rid(key)));
    }
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_inserts() {
    const THREADS: i64 = 8;
    const PER_THREAD: i64 = 250;

    let (bpm, _dir) = create_bpm(256);
    let tree = Arc::new(BPlusTree::<i64>::create("idx", bpm, IndexOptions::new(4, 4)).unwrap());

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                // Interleave key ranges so threads fight over the same leaves.
                for i in 0..PER_THREAD {
                    let key = i * THREADS + t;
                    assert!(tree.insert(key, rid(key)).unwrap());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    tree.check_integrity().unwrap();
    assert_eq!(keys_of(&tree), (0..THREADS * PER_THREAD).collect::<Vec<_>>());
}

#[test]
fn test_concurrent_mixed_workload() {
    const THREADS: i64 = 6;
    const KEYS: i64 = 1200;

    let (bpm, _dir) = create_bpm(256);
    let tree = Arc::new(BPlusTree::<i64>::create("idx", bpm, IndexOptions::new(5, 4)).unwrap());
    for key in 0..KEYS {
        tree.insert(key, rid(key)).unwrap();
    }

    let barrier = Arc::new(Barrier::new(THREADS as usize + 2));
    let mut handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let tree = Arc::clone(&tree);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                // Each thread owns keys congruent to t: remove them, then put
                // back the even ones.
                for key in (t..KEYS).step_by(THREADS as usize) {
                    assert!(tree.remove(&key).unwrap());
                }
                for key in (t..KEYS).step_by(THREADS as usize).filter(|k| k % 2 == 0) {
                    assert!(tree.insert(key, rid(key)).unwrap());
                }
            })
        })
        .collect();

    // Readers scan while the writers run; every scan must be sorted.
    for _ in 0..2 {
        let tree = Arc::clone(&tree);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..10 {
                let keys: Vec<i64> = tree.iter().unwrap().map(|e| e.unwrap().0).collect();
                assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
                for key in (0..KEYS).step_by(97) {
                    if let Some(found) = tree.search(&key).unwrap() {
                        assert_eq!(found, rid(key));
                    }
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    tree.check_integrity().unwrap();
    let expected: BTreeSet<i64> = (0..KEYS).filter(|k| k % 2 == 0).collect();
    assert_eq!(keys_of(&tree).into_iter().collect::<BTreeSet<_>>(), expected);
}
