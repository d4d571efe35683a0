//! Micro benchmarks for the two-file B+Tree and the tuple index over it.
#![forbid(unsafe_code)]
#![allow(missing_docs)]

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::TempDir;
use tuplestore::storage::btree::{BPlusTree, BPlusTreeParams};
use tuplestore::storage::{
    ColumnMap, NodeId, RangeIndex, Record, RecordFactory, Tuple, TupleIndex, TupleIndexRecord,
};
use tuplestore::StoreError;

const INSERT_COUNT: u64 = 32_768;
const LOOKUP_SAMPLES: usize = 4_096;
const RANGE_WIDTH: u64 = 512;

fn factory() -> RecordFactory {
    RecordFactory::new(8, 0)
}

fn record(key: u64) -> Record {
    factory().create(&key.to_be_bytes()).expect("record")
}

fn params() -> BPlusTreeParams {
    BPlusTreeParams::for_node_block_size(4096, factory()).expect("params")
}

fn micro_btree(c: &mut Criterion) {
    let mut group = c.benchmark_group("micro/bptree");
    group.sample_size(30);

    group.throughput(Throughput::Elements(INSERT_COUNT));
    group.bench_function("sequential_insert", |b| {
        b.iter_batched(
            FreshTree::new,
            |mut tree| {
                tree.insert_keys(0..INSERT_COUNT);
                black_box(tree.tree.root_id());
            },
            BatchSize::SmallInput,
        );
    });

    let mut random_keys: Vec<u64> = (0..INSERT_COUNT).collect();
    random_keys.shuffle(&mut ChaCha8Rng::seed_from_u64(0xBEEF_F00D));
    group.throughput(Throughput::Elements(INSERT_COUNT));
    group.bench_function("random_insert", |b| {
        b.iter_batched(
            FreshTree::new,
            |mut tree| {
                tree.insert_keys(random_keys.iter().copied());
                black_box(tree.tree.root_id());
            },
            BatchSize::SmallInput,
        );
    });

    group.throughput(Throughput::Elements(INSERT_COUNT));
    group.bench_function("bulk_pack", |b| {
        b.iter_batched(
            FreshTree::new,
            |mut tree| {
                let mut sorted = (0..INSERT_COUNT).map(|k| Ok::<_, StoreError>(record(k)));
                black_box(tree.tree.replace_sorted(&mut sorted).expect("pack"));
            },
            BatchSize::SmallInput,
        );
    });

    group.throughput(Throughput::Elements(INSERT_COUNT));
    group.bench_function("delete_random", |b| {
        b.iter_batched(
            || {
                let mut tree = FreshTree::new();
                tree.insert_keys(0..INSERT_COUNT);
                tree
            },
            |mut tree| {
                for key in &random_keys {
                    tree.tree.delete(&record(*key)).expect("delete");
                }
                black_box(tree.tree.root_id());
            },
            BatchSize::SmallInput,
        );
    });

    let mut loaded = LoadedTree::new(INSERT_COUNT);
    group.throughput(Throughput::Elements(LOOKUP_SAMPLES as u64));
    group.bench_function(BenchmarkId::new("point_lookup", LOOKUP_SAMPLES), |b| {
        b.iter(|| loaded.point_lookup(LOOKUP_SAMPLES));
    });

    group.throughput(Throughput::Elements(RANGE_WIDTH));
    group.bench_function(BenchmarkId::new("range_scan", RANGE_WIDTH), |b| {
        b.iter(|| loaded.range_scan(RANGE_WIDTH));
    });

    group.finish();
}

fn micro_tuple_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("micro/tuple_index");
    group.sample_size(30);

    let tree = BPlusTree::in_memory(
        BPlusTreeParams::for_node_block_size(4096, RecordFactory::for_tuples(3)).expect("params"),
    )
    .expect("tree");
    let mut index =
        TupleIndexRecord::new(ColumnMap::from_name("SPO").expect("map"), tree).expect("index");
    let mut rng = ChaCha8Rng::seed_from_u64(0x5150_0000);
    let mut input = (0..INSERT_COUNT as i64).map(|n| {
        Ok::<_, StoreError>(Tuple::triple(
            NodeId::create(n / 16),
            NodeId::create(n % 16),
            NodeId::create(rng.gen_range(0..1_000_000)),
        ))
    });
    index.replace_all(&mut input).expect("load");

    let any = NodeId::ANY;
    let mut rng = ChaCha8Rng::seed_from_u64(0xFACE_0001);
    group.bench_function("prefix_find", |b| {
        b.iter(|| {
            let s = NodeId::create(rng.gen_range(0..(INSERT_COUNT as i64 / 16)));
            black_box(index.find(&Tuple::triple(s, any, any)).expect("find").count());
        });
    });
    group.bench_function("filtered_find", |b| {
        b.iter(|| {
            let s = NodeId::create(rng.gen_range(0..(INSERT_COUNT as i64 / 16)));
            let pattern = Tuple::triple(s, any, NodeId::create(7));
            black_box(index.find(&pattern).expect("find").count());
        });
    });
    group.finish();
}

struct FreshTree {
    _tmpdir: TempDir,
    tree: BPlusTree,
}

impl FreshTree {
    fn new() -> Self {
        let tmpdir = tempfile::tempdir().expect("tmpdir");
        let tree = BPlusTree::open_file(tmpdir.path(), "bench", params(), 256).expect("tree");
        Self {
            _tmpdir: tmpdir,
            tree,
        }
    }

    fn insert_keys(&mut self, keys: impl IntoIterator<Item = u64>) {
        for key in keys {
            self.tree.add(record(key)).expect("insert");
        }
    }
}

struct LoadedTree {
    fresh: FreshTree,
    max_key: u64,
    rng: ChaCha8Rng,
}

impl LoadedTree {
    fn new(count: u64) -> Self {
        let mut fresh = FreshTree::new();
        fresh.insert_keys(0..count);
        Self {
            fresh,
            max_key: count,
            rng: ChaCha8Rng::seed_from_u64(0xFEED_FACE),
        }
    }

    fn point_lookup(&mut self, samples: usize) {
        for _ in 0..samples {
            let key = self.rng.gen_range(0..self.max_key);
            black_box(self.fresh.tree.find(&record(key)).expect("find"));
        }
    }

    fn range_scan(&mut self, width: u64) {
        for _ in 0..16 {
            let start = self.rng.gen_range(0..(self.max_key - width));
            let (lo, hi) = (record(start), record(start + width));
            for entry in self.fresh.tree.iter_range(Some(&lo), Some(&hi)).expect("range") {
                black_box(entry.expect("entry"));
            }
        }
    }
}

criterion_group!(benches, micro_btree, micro_tuple_index);
criterion_main!(benches);
