use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use crabtree::{
    BPlusTree, BufferPoolManager, DiskManager, IndexOptions, PageId, RecordId, ReplacerKind,
};
use std::sync::Arc;
use tempfile::TempDir;

const KEYS: u64 = 10_000;

fn setup_tree(pool_size: usize, kind: ReplacerKind) -> (TempDir, BPlusTree<u64>) {
    let temp_dir = TempDir::new().unwrap();
    let dm = DiskManager::create(temp_dir.path().join("bench.db")).unwrap();
    let bpm = Arc::new(BufferPoolManager::with_replacer(pool_size, dm, kind));
    let tree = BPlusTree::create("bench", bpm, IndexOptions::page_capacity::<u64>()).unwrap();
    (temp_dir, tree)
}

fn rid(key: u64) -> RecordId {
    RecordId::new(PageId::new((key / 100) as u32), (key % 100) as u32)
}

/// Scatter keys so inserts don't always land in the rightmost leaf.
fn scrambled(i: u64) -> u64 {
    i.wrapping_mul(0x9E37_79B9_7F4A_7C15) % (KEYS * 16)
}

fn benchmark_insert(c: &mut Criterion) {
    c.bench_function("insert_10k_scrambled", |b| {
        b.iter_batched(
            || setup_tree(256, ReplacerKind::Fifo),
            |(_dir, tree)| {
                for i in 0..KEYS {
                    let key = scrambled(i);
                    tree.insert(black_box(key), rid(key)).unwrap();
                }
            },
            BatchSize::PerIteration,
        )
    });
}

fn benchmark_search(c: &mut Criterion) {
    let (_dir, tree) = setup_tree(256, ReplacerKind::Fifo);
    for i in 0..KEYS {
        tree.insert(i, rid(i)).unwrap();
    }

    let mut next = 0u64;
    c.bench_function("point_search", |b| {
        b.iter(|| {
            next = (next + 7_919) % KEYS;
            tree.search(black_box(&next)).unwrap()
        })
    });
}

fn benchmark_scan(c: &mut Criterion) {
    let (_dir, tree) = setup_tree(256, ReplacerKind::Fifo);
    for i in 0..KEYS {
        tree.insert(i, rid(i)).unwrap();
    }

    c.bench_function("range_scan_1k", |b| {
        b.iter(|| {
            tree.range(black_box(4_000..5_000))
                .unwrap()
                .map(|entry| entry.unwrap().0)
                .sum::<u64>()
        })
    });
}

fn benchmark_replacers_under_pressure(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_small_pool");
    for kind in [ReplacerKind::Fifo, ReplacerKind::Clock] {
        let (_dir, tree) = setup_tree(16, kind);
        for i in 0..KEYS {
            tree.insert(i, rid(i)).unwrap();
        }

        let mut next = 0u64;
        group.bench_function(format!("{kind:?}"), |b| {
            b.iter(|| {
                next = scrambled(next + 1) % KEYS;
                tree.search(black_box(&next)).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_insert,
    benchmark_search,
    benchmark_scan,
    benchmark_replacers_under_pressure
);
criterion_main!(benches);
