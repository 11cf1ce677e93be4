//! B-tree benchmarks for burrowdb
//!
//! Measures the operations that dominate real workloads: ordered and
//! shuffled inserts, point lookups, range scans, and appends to a single
//! hot key that runs through the overflow protocol.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::tempdir;

use burrowdb::BTree;

fn populated_tree(count: u32) -> (BTree, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let tree = BTree::open(dir.path().join("bench"), 3).unwrap();
    for i in 0..count {
        let key = format!("key{i:08}");
        tree.put(key.as_bytes(), key.as_bytes()).unwrap();
    }
    (tree, dir)
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree_insert");

    for count in [100u32, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("sequential", count), count, |b, &count| {
            b.iter_with_setup(
                || {
                    let dir = tempdir().unwrap();
                    let tree = BTree::open(dir.path().join("bench"), 3).unwrap();
                    (dir, tree)
                },
                |(dir, tree)| {
                    for i in 0..count {
                        let key = format!("key{i:08}");
                        tree.put(key.as_bytes(), key.as_bytes()).unwrap();
                    }
                    (dir, tree)
                },
            );
        });

        group.bench_with_input(BenchmarkId::new("shuffled", count), count, |b, &count| {
            b.iter_with_setup(
                || {
                    let mut keys: Vec<u32> = (0..count).collect();
                    for i in (1..keys.len()).rev() {
                        keys.swap(i, (i * 7 + 3) % (i + 1));
                    }
                    let dir = tempdir().unwrap();
                    let tree = BTree::open(dir.path().join("bench"), 3).unwrap();
                    (dir, tree, keys)
                },
                |(dir, tree, keys)| {
                    for i in keys {
                        let key = format!("key{i:08}");
                        tree.put(key.as_bytes(), key.as_bytes()).unwrap();
                    }
                    (dir, tree)
                },
            );
        });
    }

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree_get");
    let (tree, _dir) = populated_tree(1000);

    group.throughput(Throughput::Elements(1));
    group.bench_function("point_lookup", |b| {
        b.iter(|| {
            let values = tree.get(black_box(b"key00000500")).unwrap();
            black_box(values)
        });
    });

    group.bench_function("missing_key", |b| {
        b.iter(|| {
            let values = tree.get(black_box(b"nope")).unwrap();
            black_box(values)
        });
    });

    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree_scan");
    let (tree, _dir) = populated_tree(1000);

    group.throughput(Throughput::Elements(100));
    group.bench_function("range_100", |b| {
        b.iter(|| {
            let keys = tree
                .range(black_box(b"key00000100"), black_box(b"key00000199"))
                .unwrap();
            black_box(keys)
        });
    });

    group.throughput(Throughput::Elements(1000));
    group.bench_function("in_order_1000", |b| {
        b.iter(|| black_box(tree.in_order().unwrap()));
    });

    group.finish();
}

fn bench_hot_key_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree_hot_key");

    group.throughput(Throughput::Elements(200));
    group.bench_function("append_200_values", |b| {
        b.iter_with_setup(
            || {
                let dir = tempdir().unwrap();
                let tree = BTree::open(dir.path().join("bench"), 3).unwrap();
                (dir, tree)
            },
            |(dir, tree)| {
                for i in 0..200u32 {
                    tree.put(b"hot", format!("{i:06}").as_bytes()).unwrap();
                }
                (dir, tree)
            },
        );
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_insert,
    bench_get,
    bench_scan,
    bench_hot_key_append
);
criterion_main!(benches);
