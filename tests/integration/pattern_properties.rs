#![allow(missing_docs)]

use std::collections::BTreeSet;

use proptest::prelude::*;
use tuplestore::{
    storage::{
        btree::{BPlusTree, BPlusTreeParams},
        ColumnMap, NodeId, RecordFactory, Tuple, TupleIndex, TupleIndexRecord,
    },
    types::Result,
    Store, StoreOptions,
};

fn quad_strategy() -> impl Strategy<Value = Tuple<NodeId>> {
    (0i64..3, 0i64..6, 0i64..4, 0i64..6)
        .prop_map(|(g, s, p, o)| Tuple::quad(NodeId::create(g), NodeId::create(s), NodeId::create(p), NodeId::create(o)))
}

fn slot_strategy(max: i64) -> impl Strategy<Value = NodeId> {
    prop_oneof![Just(NodeId::ANY), (0..max).prop_map(NodeId::create)]
}

fn pattern_strategy() -> impl Strategy<Value = Tuple<NodeId>> {
    (slot_strategy(3), slot_strategy(6), slot_strategy(4), slot_strategy(6))
        .prop_map(|(g, s, p, o)| Tuple::quad(g, s, p, o))
}

fn small_store() -> Result<Store> {
    let mut options = StoreOptions::in_memory();
    options.order = Some(2);
    options.record_block_size = Some(8 + 3 * 32);
    Store::open(options)
}

fn index(label: &str) -> Result<TupleIndexRecord<BPlusTree>> {
    let params = BPlusTreeParams::new(2, RecordFactory::for_tuples(4)).with_record_capacity(3);
    TupleIndexRecord::new(ColumnMap::from_name(label)?, BPlusTree::in_memory(params)?)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn store_answers_like_a_filter(
        quads in proptest::collection::vec(quad_strategy(), 0..120),
        patterns in proptest::collection::vec(pattern_strategy(), 1..12),
    ) {
        let mut store = small_store().unwrap();
        let mut model = BTreeSet::new();
        for quad in &quads {
            prop_assert_eq!(store.add(quad).unwrap(), model.insert(*quad));
        }
        for pattern in &patterns {
            let mut found: Vec<_> = store.find(pattern).unwrap().collect::<Result<_>>().unwrap();
            found.sort();
            let want: Vec<_> = model.iter().filter(|q| q.matches(pattern)).copied().collect();
            prop_assert_eq!(found, want, "pattern {}", pattern);
        }
    }

    #[test]
    fn every_ordering_answers_every_pattern(
        quads in proptest::collection::vec(quad_strategy(), 0..80),
        pattern in pattern_strategy(),
    ) {
        let model: BTreeSet<_> = quads.iter().copied().collect();
        let want: Vec<_> = model.iter().filter(|q| q.matches(&pattern)).copied().collect();
        for label in ["GSPO", "GPOS", "GOSP", "SPOG", "POSG", "OSPG"] {
            let mut idx = index(label).unwrap();
            idx.add_all(&quads).unwrap();
            let mut found: Vec<_> = idx.find(&pattern).unwrap().collect::<Result<_>>().unwrap();
            found.sort();
            prop_assert_eq!(&found, &want, "index {} pattern {}", label, pattern);

            // Index-only lookups either answer exactly or decline.
            if let Some(iter) = idx.find_by_index(&pattern).unwrap() {
                let mut exact: Vec<_> = iter.collect::<Result<_>>().unwrap();
                exact.sort();
                prop_assert_eq!(&exact, &want);
            } else {
                prop_assert!(idx.weight(&pattern) < 4);
            };
        }
    }

    #[test]
    fn add_and_delete_are_idempotent(
        quads in proptest::collection::vec(quad_strategy(), 1..60),
    ) {
        let mut idx = index("SPOG").unwrap();
        for quad in &quads {
            idx.add(quad).unwrap();
        }
        let size = idx.size().unwrap();
        for quad in &quads {
            prop_assert!(!idx.add(quad).unwrap());
        }
        prop_assert_eq!(idx.size().unwrap(), size);

        let distinct: BTreeSet<_> = quads.iter().copied().collect();
        for quad in &distinct {
            prop_assert!(idx.delete(quad).unwrap());
            prop_assert!(!idx.delete(quad).unwrap());
        }
        prop_assert!(idx.is_empty().unwrap());
        prop_assert_eq!(idx.all().unwrap().count(), 0);
        prop_assert_eq!(idx.range_index().verify().unwrap(), 0);
    }

    #[test]
    fn column_maps_are_exact_inverses(
        quad in quad_strategy(),
        label in prop_oneof![Just("GSPO"), Just("OSPG"), Just("POSG"), Just("SOGP")],
    ) {
        let map = ColumnMap::from_name(label).unwrap();
        prop_assert_eq!(map.unmap(&map.map(&quad).unwrap()).unwrap(), quad);
    }
}

#[test]
fn clear_leaves_nothing_to_find() -> Result<()> {
    let mut store = small_store()?;
    for n in 0..40 {
        store.add(&Tuple::quad(
            NodeId::create(n % 3),
            NodeId::create(n),
            NodeId::create(1),
            NodeId::create(2),
        ))?;
    }
    store.clear()?;
    assert_eq!(store.quad_count()?, 0);
    assert_eq!(store.find(&Tuple::any(4)?)?.count(), 0);
    Ok(())
}
