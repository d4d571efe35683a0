use std::path::Path;
use std::sync::Arc;

use super::iter::RangeIter;
use super::node::{BPTreeNode, NodeManager};
use super::page::{RecordPage, RecordsManager};
use super::params::BPlusTreeParams;
use super::rewriter;
use super::state::{StateFile, TreeFiles, TreeState};
use super::stats::{BTreeStats, BTreeStatsSnapshot};
use crate::primitives::block::{BlockMgr, FileBlockMgr, MemBlockMgr};
use crate::storage::range_index::{RangeIndex, RecordIter};
use crate::storage::record::{Record, RecordFactory};
use crate::types::{BlockId, Result, StoreError};

mod delete;
mod insert;
mod maintenance;

/// A B+Tree of fixed-length records over two block managers: one for tree
/// nodes, one for the chained record pages that hold the data.
///
/// The root keeps its block id for the life of the tree: a full root is split
/// in place and an empty branch root absorbs its only child.
pub struct BPlusTree {
    params: BPlusTreeParams,
    nodes: NodeManager,
    pages: RecordsManager,
    root: BlockId,
    state: Option<StateFile>,
    stats: Arc<BTreeStats>,
}

impl BPlusTree {
    /// Creates an empty tree in the given managers.
    pub fn create(params: BPlusTreeParams, nodes: NodeManager, pages: RecordsManager) -> Result<Self> {
        params.validate()?;
        let root = new_leaf_root(&nodes, &pages)?;
        Ok(Self::attach(params, nodes, pages, root))
    }

    /// Creates an empty tree backed by memory.
    pub fn in_memory(params: BPlusTreeParams) -> Result<Self> {
        params.validate()?;
        let node_blocks: Arc<dyn BlockMgr> =
            Arc::new(MemBlockMgr::new("nodes", params.node_block_size()));
        let page_blocks: Arc<dyn BlockMgr> =
            Arc::new(MemBlockMgr::new("records", params.record_block_size()));
        let nodes = NodeManager::new(node_blocks, params)?;
        let pages = RecordsManager::new(page_blocks, params)?;
        Self::create(params, nodes, pages)
    }

    /// Opens tree `name` in `dir`, creating its three files when absent.
    ///
    /// The stored block sizes are checked before the block files are touched;
    /// a difference is [`StoreError::BlockSizeMismatch`].
    pub fn open_file(
        dir: impl AsRef<Path>,
        name: &str,
        params: BPlusTreeParams,
        cache_blocks: usize,
    ) -> Result<Self> {
        params.validate()?;
        let files = TreeFiles::new(dir, name);
        let state_file = StateFile::open(&files.state)?;
        let stored = state_file.read(&params)?;

        let node_blocks: Arc<dyn BlockMgr> = Arc::new(FileBlockMgr::open(
            &files.nodes,
            params.node_block_size(),
            cache_blocks,
        )?);
        let page_blocks: Arc<dyn BlockMgr> = Arc::new(FileBlockMgr::open(
            &files.pages,
            params.record_block_size(),
            cache_blocks,
        )?);
        let nodes = NodeManager::new(Arc::clone(&node_blocks), params)?;
        let pages = RecordsManager::new(Arc::clone(&page_blocks), params)?;

        let mut tree = match stored {
            Some(state) => {
                if node_blocks.allocation_limit() < state.node_limit
                    || page_blocks.allocation_limit() < state.page_limit
                {
                    return Err(StoreError::Corruption("block file shorter than tree state"));
                }
                if !node_blocks.valid(state.root) {
                    return Err(StoreError::Corruption("tree root outside the node file"));
                }
                Self::attach(params, nodes, pages, state.root)
            }
            None => {
                if node_blocks.allocation_limit() > 0 || page_blocks.allocation_limit() > 0 {
                    return Err(StoreError::Corruption("block files present without tree state"));
                }
                let root = new_leaf_root(&nodes, &pages)?;
                Self::attach(params, nodes, pages, root)
            }
        };
        tree.state = Some(state_file);
        tree.persist_state()?;
        tracing::debug!(
            target: "tuplestore::btree",
            name,
            root = tree.root.0,
            fresh = stored.is_none(),
            "opened file tree"
        );
        Ok(tree)
    }

    pub(crate) fn attach(
        params: BPlusTreeParams,
        nodes: NodeManager,
        pages: RecordsManager,
        root: BlockId,
    ) -> Self {
        Self {
            params,
            nodes,
            pages,
            root,
            state: None,
            stats: Arc::new(BTreeStats::default()),
        }
    }

    /// Tree shape.
    pub fn params(&self) -> &BPlusTreeParams {
        &self.params
    }

    /// Block id of the root node.
    pub fn root_id(&self) -> BlockId {
        self.root
    }

    /// Node manager.
    pub fn nodes(&self) -> &NodeManager {
        &self.nodes
    }

    /// Record page manager.
    pub fn pages(&self) -> &RecordsManager {
        &self.pages
    }

    /// Node and page checkouts not yet returned.
    pub fn outstanding(&self) -> usize {
        self.nodes.blocks().outstanding() + self.pages.blocks().outstanding()
    }

    /// Access the live statistics counters for this tree.
    pub fn stats(&self) -> Arc<BTreeStats> {
        Arc::clone(&self.stats)
    }

    /// Snapshot the current statistics counters.
    pub fn stats_snapshot(&self) -> BTreeStatsSnapshot {
        self.stats.snapshot()
    }

    /// Emit the current statistics to the tracing sink.
    pub fn emit_stats(&self) {
        self.stats.emit_tracing();
    }

    fn check_key(&self, record: &Record) -> Result<()> {
        if record.key().len() != self.params.key_len() {
            return Err(StoreError::KeyLength {
                expected: self.params.key_len(),
                actual: record.key().len(),
            });
        }
        Ok(())
    }

    fn root_read(&self) -> Result<BPTreeNode> {
        self.nodes.get_read(self.root, None)
    }

    /// Descends to the record page that holds, or would hold, `key`.
    fn find_page(&self, key: &[u8]) -> Result<RecordPage> {
        self.stats.inc_searches();
        let mut node = self.root_read()?;
        loop {
            let child = node.ptr(node.find_child(key))?;
            let (id, is_leaf) = (node.id(), node.is_leaf);
            self.nodes.release(node);
            if is_leaf {
                return self.pages.get_read(child);
            }
            node = self.nodes.get_read(child, Some(id))?;
        }
    }

    /// Descends along the first (`rightmost == false`) or last pointer of each node.
    fn edge_page(&self, rightmost: bool) -> Result<RecordPage> {
        let mut node = self.root_read()?;
        loop {
            let idx = if rightmost { node.count() } else { 0 };
            let child = node.ptr(idx)?;
            let (id, is_leaf) = (node.id(), node.is_leaf);
            self.nodes.release(node);
            if is_leaf {
                return self.pages.get_read(child);
            }
            node = self.nodes.get_read(child, Some(id))?;
        }
    }

    /// Key of the largest record under node `id`.
    fn subtree_max(&self, id: BlockId) -> Result<Record> {
        let mut node = self.nodes.get_read(id, None)?;
        loop {
            let child = node.ptr(node.count())?;
            let is_leaf = node.is_leaf;
            self.nodes.release(node);
            if is_leaf {
                let page = self.pages.get_read(child)?;
                let max = page.max_key();
                self.pages.release(page);
                return max.ok_or_else(|| {
                    StoreError::invariant(format!("record page {child} under a separator is empty"))
                });
            }
            node = self.nodes.get_read(child, None)?;
        }
    }

    fn persist_state(&self) -> Result<()> {
        if let Some(state) = &self.state {
            state.write(
                &self.params,
                &TreeState {
                    root: self.root,
                    node_limit: self.nodes.blocks().allocation_limit(),
                    page_limit: self.pages.blocks().allocation_limit(),
                },
            )?;
        }
        Ok(())
    }
}

/// Allocates a leaf root pointing at one empty record page.
pub(crate) fn new_leaf_root(nodes: &NodeManager, pages: &RecordsManager) -> Result<BlockId> {
    let page = pages.create()?;
    let mut root = nodes.create(true, None)?;
    root.ptrs.push(page.id())?;
    pages.put(page)?;
    let id = root.id();
    nodes.put(root)?;
    Ok(id)
}

impl RangeIndex for BPlusTree {
    fn record_factory(&self) -> RecordFactory {
        self.params.record_factory()
    }

    fn find(&self, key: &Record) -> Result<Option<Record>> {
        self.check_key(key)?;
        let page = self.find_page(key.key())?;
        let found = page.get(key.key()).cloned();
        self.pages.release(page);
        Ok(found)
    }

    fn iter_range(&self, min: Option<&Record>, max: Option<&Record>) -> Result<RecordIter<'_>> {
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo.key() >= hi.key() {
                return Ok(Box::new(std::iter::empty()));
            }
        }
        let (page, idx) = match min {
            Some(lo) => {
                self.check_key(lo)?;
                let page = self.find_page(lo.key())?;
                let idx = page.search(lo.key()).unwrap_or_else(|at| at);
                (page, idx)
            }
            None => (self.edge_page(false)?, 0),
        };
        Ok(Box::new(RangeIter::new(
            self.pages.clone(),
            page,
            idx,
            max.map(Record::key_only),
        )))
    }

    fn insert(&mut self, record: Record) -> Result<Option<Record>> {
        self.check_key(&record)?;
        self.params.record_factory().check_value(&record)?;
        self.insert_record(record)
    }

    fn remove(&mut self, key: &Record) -> Result<Option<Record>> {
        self.check_key(key)?;
        self.delete_record(key.key())
    }

    fn min_key(&self) -> Result<Option<Record>> {
        self.iter_all()?.next().transpose()
    }

    fn max_key(&self) -> Result<Option<Record>> {
        let page = self.edge_page(true)?;
        let max = page.records.last().cloned();
        self.pages.release(page);
        Ok(max)
    }

    fn clear(&mut self) -> Result<()> {
        self.clear_tree()?;
        self.persist_state()
    }

    fn replace_sorted(&mut self, records: &mut dyn Iterator<Item = Result<Record>>) -> Result<u64> {
        let (root, count) = rewriter::build(&self.params, &self.nodes, &self.pages, records)?;
        let old = std::mem::replace(&mut self.root, root);
        self.free_subtree(old)?;
        self.persist_state()?;
        Ok(count)
    }

    fn sync(&self) -> Result<()> {
        self.nodes.blocks().sync()?;
        self.pages.blocks().sync()?;
        self.persist_state()
    }

    fn close(&self) -> Result<()> {
        self.persist_state()?;
        self.nodes.blocks().close()?;
        self.pages.blocks().close()?;
        tracing::debug!(target: "tuplestore::btree", root = self.root.0, "closed tree");
        Ok(())
    }

    fn check_integrity(&self) -> Result<u64> {
        self.verify()
    }
}
