#![allow(missing_docs)]

use std::sync::Arc;

use tempfile::tempdir;
use tuplestore::{
    primitives::block::{BlockMgr, MemBlockMgr},
    storage::{
        btree::{BPlusTree, BPlusTreeParams, BPlusTreeRewriter, NodeManager, RecordsManager},
        ColumnMap, NodeId, RangeIndex, RecordFactory, Tuple, TupleIndex, TupleIndexRecord,
    },
    types::Result,
};

fn id(v: i64) -> NodeId {
    NodeId::create(v)
}

fn t(s: i64, p: i64, o: i64) -> Tuple<NodeId> {
    Tuple::triple(id(s), id(p), id(o))
}

fn spo_on_disk(dir: &std::path::Path) -> Result<TupleIndexRecord<BPlusTree>> {
    let params = BPlusTreeParams::new(3, RecordFactory::for_tuples(3)).with_record_capacity(8);
    let tree = BPlusTree::open_file(dir, "SPO", params, 16)?;
    TupleIndexRecord::new(ColumnMap::from_name("SPO")?, tree)
}

fn collect(index: &dyn TupleIndex, pattern: Tuple<NodeId>) -> Result<Vec<Tuple<NodeId>>> {
    index.find(&pattern)?.collect()
}

#[test]
fn prefix_and_non_contiguous_patterns() -> Result<()> {
    let dir = tempdir()?;
    let mut index = spo_on_disk(dir.path())?;
    for tuple in [t(1, 2, 3), t(1, 2, 4), t(1, 3, 5)] {
        assert!(index.add(&tuple)?);
    }
    let any = NodeId::ANY;

    assert_eq!(
        collect(&index, Tuple::triple(id(1), id(2), any))?,
        vec![t(1, 2, 3), t(1, 2, 4)]
    );
    assert_eq!(collect(&index, Tuple::triple(id(1), any, id(5)))?, vec![t(1, 3, 5)]);
    assert_eq!(
        collect(&index, Tuple::triple(any, any, any))?,
        vec![t(1, 2, 3), t(1, 2, 4), t(1, 3, 5)],
        "full scan comes back in key order"
    );
    Ok(())
}

#[test]
fn duplicate_add_and_missing_delete() -> Result<()> {
    let dir = tempdir()?;
    let mut index = spo_on_disk(dir.path())?;
    assert!(index.add(&t(1, 2, 3))?);
    assert!(!index.add(&t(1, 2, 3))?, "second add reports a duplicate");
    assert_eq!(index.size()?, 1);

    for tuple in [t(1, 2, 4), t(1, 3, 5)] {
        index.add(&tuple)?;
    }
    assert!(index.delete(&t(1, 3, 5))?);
    assert!(collect(&index, Tuple::triple(id(1), id(3), NodeId::ANY))?.is_empty());
    assert!(!index.delete(&t(9, 9, 9))?);
    assert_eq!(index.size()?, 2);
    Ok(())
}

#[test]
fn bulk_load_of_nine_triples_with_four_per_page() -> Result<()> {
    let factory = RecordFactory::for_tuples(3);
    let params = BPlusTreeParams::new(2, factory).with_record_capacity(4);
    let node_blocks: Arc<dyn BlockMgr> = Arc::new(MemBlockMgr::new("nodes", params.node_block_size()));
    let page_blocks: Arc<dyn BlockMgr> =
        Arc::new(MemBlockMgr::new("records", params.record_block_size()));
    let nodes = NodeManager::new(node_blocks, params)?;
    let pages = RecordsManager::new(page_blocks, params)?;

    let spo = ColumnMap::from_name("SPO")?;
    let records: Vec<_> = (1..=9)
        .map(|n| factory.record_for_tuple(&t(n, n, n), &spo))
        .collect::<Result<_>>()?;
    let tree = BPlusTreeRewriter::pack(params, nodes, pages, records.iter().cloned().map(Ok))?;

    let root = tree.nodes().get_read(tree.root_id(), None)?;
    assert!(root.is_leaf(), "one node level above the pages");
    assert_eq!(root.keys(), &[records[3].key_only(), records[7].key_only()]);
    let children = root.children().to_vec();
    tree.nodes().release(root);

    let mut sizes = Vec::new();
    let mut scanned = Vec::new();
    for child in children {
        let page = tree.pages().get_read(child)?;
        sizes.push(page.len());
        scanned.extend(page.records().iter().cloned());
        tree.pages().release(page);
    }
    assert_eq!(sizes, vec![4, 4, 1]);
    assert_eq!(scanned, records);
    assert_eq!(tree.verify()?, 9);
    assert_eq!(tree.outstanding(), 0);
    Ok(())
}

#[test]
fn each_ordering_answers_its_own_prefix() -> Result<()> {
    let params = BPlusTreeParams::new(2, RecordFactory::for_tuples(3)).with_record_capacity(4);
    let mut indexes = Vec::new();
    for label in ["SPO", "POS", "OSP"] {
        let mut index = TupleIndexRecord::new(ColumnMap::from_name(label)?, BPlusTree::in_memory(params)?)?;
        for s in 0..20 {
            index.add(&t(s, s % 3, s % 5))?;
        }
        indexes.push(index);
    }
    let any = NodeId::ANY;
    let by_p = Tuple::triple(any, id(1), any);
    assert!(indexes[0].find_by_index(&by_p)?.is_none());
    let from_pos: Vec<_> = indexes[1].find_by_index(&by_p)?.unwrap().collect::<Result<_>>()?;
    let mut from_spo: Vec<_> = indexes[0].find(&by_p)?.collect::<Result<_>>()?;
    from_spo.sort();
    let mut sorted_pos = from_pos.clone();
    sorted_pos.sort();
    assert_eq!(sorted_pos, from_spo);
    assert_eq!(from_pos.len(), 7);

    for index in &indexes {
        assert_eq!(index.range_index().outstanding(), 0, "{}", index.name());
        assert_eq!(index.range_index().check_integrity()?, 20);
    }
    Ok(())
}
