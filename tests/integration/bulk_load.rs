#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::sync::Once;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::tempdir;
use tracing_subscriber::EnvFilter;
use tuplestore::{
    storage::{
        btree::{BPlusTree, BPlusTreeParams},
        RangeIndex, RecordFactory,
    },
    types::Result,
    NodeId, Store, StoreOptions, Tuple,
};

const SEED: u64 = 0x5eed_b01d;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("tuplestore::store=info,tuplestore::rewriter=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

fn random_triples(rng: &mut ChaCha8Rng, count: usize) -> Vec<Tuple<NodeId>> {
    (0..count)
        .map(|_| {
            Tuple::triple(
                NodeId::create(rng.gen_range(0..200)),
                NodeId::create(rng.gen_range(0..12)),
                NodeId::create(rng.gen_range(0..500)),
            )
        })
        .collect()
}

fn small_options(dir: &std::path::Path) -> StoreOptions {
    let mut options = StoreOptions::at(dir);
    options.order = Some(4);
    options.record_block_size = Some(8 + 16 * 24);
    options.quad_indexes.clear();
    options
}

#[test]
fn bulk_loaded_store_matches_a_brute_force_filter() -> Result<()> {
    init_tracing();
    let dir = tempdir()?;
    let mut store = Store::open(small_options(dir.path()))?;
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let input = random_triples(&mut rng, 4000);
    let expected: BTreeSet<_> = input.iter().copied().collect();

    let stats = store.bulk_load(input)?;
    assert_eq!(stats.triples, expected.len() as u64);

    let report = store.check_integrity()?;
    assert!(report.is_consistent(), "{:?}", report.problems);

    let any = NodeId::ANY;
    let sample = *expected.iter().nth(expected.len() / 2).unwrap();
    let [s, p, o] = match sample {
        Tuple::Triple(slots) => slots,
        Tuple::Quad(_) => unreachable!(),
    };
    for pattern in [
        Tuple::triple(s, any, any),
        Tuple::triple(any, p, any),
        Tuple::triple(any, any, o),
        Tuple::triple(s, any, o),
        Tuple::triple(s, p, any),
        Tuple::triple(s, p, o),
        Tuple::triple(any, any, any),
    ] {
        let mut found: Vec<_> = store.find(&pattern)?.collect::<Result<_>>()?;
        found.sort();
        let want: Vec<_> = expected.iter().filter(|t| t.matches(&pattern)).copied().collect();
        assert_eq!(found, want, "pattern {pattern}");
    }
    Ok(())
}

#[test]
fn incremental_writes_after_a_bulk_load() -> Result<()> {
    init_tracing();
    let dir = tempdir()?;
    let mut store = Store::open(small_options(dir.path()))?;
    let mut rng = ChaCha8Rng::seed_from_u64(SEED + 1);
    let input = random_triples(&mut rng, 1500);
    let mut model: BTreeSet<_> = input.iter().copied().collect();
    store.bulk_load(input)?;

    for (i, tuple) in random_triples(&mut rng, 600).into_iter().enumerate() {
        if i % 3 == 0 {
            let victim = *model.iter().nth(rng.gen_range(0..model.len())).unwrap();
            assert!(store.delete(&victim)?);
            model.remove(&victim);
        } else {
            assert_eq!(store.add(&tuple)?, model.insert(tuple));
        }
    }
    assert_eq!(store.triple_count()?, model.len() as u64);
    let report = store.check_integrity()?;
    assert!(report.is_consistent(), "{:?}", report.problems);
    Ok(())
}

#[test]
fn replace_sorted_survives_reopen() -> Result<()> {
    let dir = tempdir()?;
    let factory = RecordFactory::new(8, 0);
    let params = BPlusTreeParams::new(3, factory).with_record_capacity(5);
    {
        let mut tree = BPlusTree::open_file(dir.path(), "numbers", params, 8)?;
        for k in 0..50u64 {
            tree.add(factory.create(&(k * 7).to_be_bytes())?)?;
        }
        let mut sorted = (0..300u64).map(|k| factory.create(&k.to_be_bytes()));
        assert_eq!(tree.replace_sorted(&mut sorted)?, 300);
        tree.close()?;
    }
    let tree = BPlusTree::open_file(dir.path(), "numbers", params, 8)?;
    assert_eq!(tree.verify()?, 300);
    let first = tree.min_key()?.unwrap();
    let last = tree.max_key()?.unwrap();
    assert_eq!(first.key(), &0u64.to_be_bytes());
    assert_eq!(last.key(), &299u64.to_be_bytes());
    Ok(())
}
