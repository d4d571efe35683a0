//! Bottom-up construction of a B+Tree from records already in key order.
//!
//! Record pages are filled to capacity and chained. Each node level is then
//! built from the `(block, max key)` pairs of the level below: a node takes
//! pointers until its pointer buffer is full, keeps every key but the last as
//! separators, and hands the last key up as its own maximum. The level with a
//! single node is the root.

use super::node::{BPTreeNode, NodeManager};
use super::page::{RecordPage, RecordsManager};
use super::params::BPlusTreeParams;
use super::tree::{new_leaf_root, BPlusTree};
use crate::storage::record::Record;
use crate::types::{BlockId, Result, StoreError};

/// Builds trees from sorted input.
pub struct BPlusTreeRewriter;

impl BPlusTreeRewriter {
    /// Packs `records`, which must be strictly ascending, into a new tree
    /// over fresh managers. Aborts on the first out-of-order record.
    pub fn pack<I>(
        params: BPlusTreeParams,
        nodes: NodeManager,
        pages: RecordsManager,
        records: I,
    ) -> Result<BPlusTree>
    where
        I: IntoIterator<Item = Result<Record>>,
    {
        params.validate()?;
        let (root, _) = build(&params, &nodes, &pages, &mut records.into_iter())?;
        Ok(BPlusTree::attach(params, nodes, pages, root))
    }
}

/// Writes the tree for `records` and returns its root and record count.
///
/// On failure every block written so far goes back to its manager, so the
/// managers hold what they held before the call.
pub(crate) fn build(
    params: &BPlusTreeParams,
    nodes: &NodeManager,
    pages: &RecordsManager,
    records: &mut dyn Iterator<Item = Result<Record>>,
) -> Result<(BlockId, u64)> {
    let mut allocated = Allocated::default();
    match build_levels(params, nodes, pages, records, &mut allocated) {
        Ok(built) => Ok(built),
        Err(err) => {
            tracing::debug!(
                target: "tuplestore::rewriter",
                pages = allocated.pages.len(),
                nodes = allocated.nodes.len(),
                error = %err,
                "discarding partial build"
            );
            allocated.discard(nodes, pages)?;
            Err(err)
        }
    }
}

/// Blocks allocated by one build.
#[derive(Default)]
struct Allocated {
    pages: Vec<BlockId>,
    nodes: Vec<BlockId>,
}

impl Allocated {
    fn discard(self, nodes: &NodeManager, pages: &RecordsManager) -> Result<()> {
        for (blocks, ids) in [(pages.blocks(), self.pages), (nodes.blocks(), self.nodes)] {
            for id in ids {
                let block = blocks.get_write(id)?;
                blocks.free(block)?;
            }
        }
        Ok(())
    }
}

fn build_levels(
    params: &BPlusTreeParams,
    nodes: &NodeManager,
    pages: &RecordsManager,
    records: &mut dyn Iterator<Item = Result<Record>>,
    allocated: &mut Allocated,
) -> Result<(BlockId, u64)> {
    let (mut level, count) = write_pages(params, pages, records, allocated)?;
    if level.is_empty() {
        tracing::debug!(target: "tuplestore::rewriter", "packed empty tree");
        return Ok((new_leaf_root(nodes, pages)?, 0));
    }
    tracing::debug!(
        target: "tuplestore::rewriter",
        records = count,
        pages = level.len(),
        "wrote record pages"
    );

    let mut is_leaf = true;
    let mut height = 1;
    loop {
        level = write_nodes(nodes, level, is_leaf, allocated)?;
        if let [(root, _)] = level.as_slice() {
            tracing::debug!(
                target: "tuplestore::rewriter",
                root = root.0,
                height,
                "packed tree"
            );
            return Ok((*root, count));
        }
        tracing::trace!(target: "tuplestore::rewriter", height, nodes = level.len(), "wrote node level");
        is_leaf = false;
        height += 1;
    }
}

fn write_pages(
    params: &BPlusTreeParams,
    pages: &RecordsManager,
    records: &mut dyn Iterator<Item = Result<Record>>,
    allocated: &mut Allocated,
) -> Result<(Vec<(BlockId, Record)>, u64)> {
    let key_len = params.key_len();
    let factory = params.record_factory();
    let mut out = Vec::new();
    let mut count = 0u64;
    let mut current: Option<RecordPage> = None;
    let mut last: Option<Record> = None;

    for record in records {
        let record = record?;
        if record.key().len() != key_len {
            return Err(StoreError::KeyLength {
                expected: key_len,
                actual: record.key().len(),
            });
        }
        factory.check_value(&record)?;
        if let Some(prev) = &last {
            if prev.key() >= record.key() {
                return Err(StoreError::invariant(format!(
                    "bulk input not strictly ascending: {record} after {prev}"
                )));
            }
        }
        last = Some(record.key_only());

        let mut page = match current.take() {
            Some(mut full) if full.is_full() => {
                let next = pages.create()?;
                allocated.pages.push(next.id());
                full.link = Some(next.id());
                out.push(seal_page(pages, full)?);
                next
            }
            Some(open) => open,
            None => {
                let first = pages.create()?;
                allocated.pages.push(first.id());
                first
            }
        };
        page.records.push(record)?;
        current = Some(page);
        count += 1;
    }
    if let Some(page) = current {
        out.push(seal_page(pages, page)?);
    }
    Ok((out, count))
}

fn seal_page(pages: &RecordsManager, page: RecordPage) -> Result<(BlockId, Record)> {
    let max = page
        .max_key()
        .ok_or_else(|| StoreError::invariant("sealing an empty record page"))?;
    let id = page.id();
    pages.put(page)?;
    Ok((id, max))
}

fn write_nodes(
    nodes: &NodeManager,
    children: Vec<(BlockId, Record)>,
    is_leaf: bool,
    allocated: &mut Allocated,
) -> Result<Vec<(BlockId, Record)>> {
    let mut out = Vec::new();
    let mut node: Option<BPTreeNode> = None;
    // Key of the last pointer pushed; becomes a separator once another pointer follows.
    let mut pending: Option<Record> = None;

    for (child, max) in children {
        let open = match node.take() {
            Some(full) if full.ptrs.is_full() => {
                out.push(seal_node(nodes, full, pending.take())?);
                let next = nodes.create(is_leaf, None)?;
                allocated.nodes.push(next.id());
                next
            }
            Some(open) => open,
            None => {
                let first = nodes.create(is_leaf, None)?;
                allocated.nodes.push(first.id());
                first
            }
        };
        let open = node.insert(open);
        if let Some(sep) = pending.take() {
            open.records.push(sep)?;
        }
        open.ptrs.push(child)?;
        pending = Some(max);
    }
    if let Some(last) = node {
        out.push(seal_node(nodes, last, pending)?);
    }
    Ok(out)
}

fn seal_node(
    nodes: &NodeManager,
    node: BPTreeNode,
    max: Option<Record>,
) -> Result<(BlockId, Record)> {
    let max = match max {
        Some(max) if !node.ptrs.is_empty() => max,
        _ => {
            return Err(StoreError::invariant(format!(
                "sealing node {} with no pointers",
                node.id()
            )))
        }
    };
    let id = node.id();
    nodes.put(node)?;
    Ok((id, max))
}
