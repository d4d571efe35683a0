//! Insertion with splits on the way down: a full node is never entered.

use super::BPlusTree;
use crate::storage::btree::node::BPTreeNode;
use crate::storage::btree::page::RecordPage;
use crate::storage::record::Record;
use crate::types::{Result, StoreError};

impl BPlusTree {
    pub(crate) fn insert_record(&mut self, record: Record) -> Result<Option<Record>> {
        self.stats.inc_searches();
        let mut node = self.nodes.get_write(self.root, None)?;
        if node.is_full() {
            self.split_root(&mut node)?;
        }
        loop {
            if node.is_leaf {
                let replaced = self.insert_into_page(&mut node, record);
                self.nodes.release(node);
                return replaced;
            }
            let idx = node.find_child(record.key());
            let mut child = self.nodes.get_write(node.ptr(idx)?, Some(node.id()))?;
            if child.is_full() {
                let right = self.split_node(&mut node, idx, &mut child)?;
                if node.records.at(idx)?.key() < record.key() {
                    self.nodes.release(child);
                    child = right;
                } else {
                    self.nodes.release(right);
                }
            }
            self.nodes.release(node);
            node = child;
        }
    }

    /// Inserts into the record page under leaf node `node`, splitting the page when full.
    fn insert_into_page(&self, node: &mut BPTreeNode, record: Record) -> Result<Option<Record>> {
        let idx = node.find_child(record.key());
        let mut page = self.pages.get_write(node.ptr(idx)?)?;
        if page.is_full() && page.get(record.key()).is_none() {
            let mut right = self.split_page(node, idx, &mut page)?;
            let goes_right = node.records.at(idx)?.key() < record.key();
            let target = if goes_right { &mut right } else { &mut page };
            let replaced = target.insert(record)?;
            self.pages.put(page)?;
            self.pages.put(right)?;
            return Ok(replaced);
        }
        let replaced = page.insert(record)?;
        self.pages.put(page)?;
        Ok(replaced)
    }

    /// Splits the full root in place: its halves move to two new nodes and the
    /// root keeps its id with one key.
    fn split_root(&self, root: &mut BPTreeNode) -> Result<()> {
        let ix = self.params.split_index();
        let mut right_records = root.records.split_off(ix + 1)?;
        let median = root
            .records
            .pop()
            .ok_or_else(|| StoreError::invariant("splitting a root with no keys"))?;
        let mut right_ptrs = root.ptrs.split_off(ix + 1)?;

        let mut left = self.nodes.create(root.is_leaf, Some(root.id()))?;
        let mut right = self.nodes.create(root.is_leaf, Some(root.id()))?;
        left.records.append(&mut root.records)?;
        left.ptrs.append(&mut root.ptrs)?;
        right.records.append(&mut right_records)?;
        right.ptrs.append(&mut right_ptrs)?;

        root.is_leaf = false;
        root.records.push(median)?;
        root.ptrs.push(left.id())?;
        root.ptrs.push(right.id())?;

        self.stats.inc_root_splits();
        tracing::trace!(
            target: "tuplestore::btree::split",
            root = root.id().0,
            left = left.id().0,
            right = right.id().0,
            "split root in place"
        );
        self.nodes.put(left)?;
        self.nodes.put(right)?;
        self.nodes.write(root)
    }

    /// Splits the full `child` at `parent.ptrs[idx]`; the median moves up into
    /// `parent`. Returns the new right sibling, still checked out.
    fn split_node(
        &self,
        parent: &mut BPTreeNode,
        idx: usize,
        child: &mut BPTreeNode,
    ) -> Result<BPTreeNode> {
        let ix = self.params.split_index();
        let right_records = child.records.split_off(ix + 1)?;
        let median = child
            .records
            .pop()
            .ok_or_else(|| StoreError::invariant("splitting a node with no keys"))?;
        let right_ptrs = child.ptrs.split_off(ix + 1)?;

        let mut right = self.nodes.create(child.is_leaf, Some(parent.id()))?;
        right.records = right_records;
        right.ptrs = right_ptrs;
        parent.records.insert(idx, median)?;
        parent.ptrs.insert(idx + 1, right.id())?;

        self.stats.inc_node_splits();
        tracing::trace!(
            target: "tuplestore::btree::split",
            parent = parent.id().0,
            left = child.id().0,
            right = right.id().0,
            "split node"
        );
        self.nodes.write(&mut right)?;
        self.nodes.write(child)?;
        self.nodes.write(parent)?;
        Ok(right)
    }

    /// Moves the upper half of the full `page` (child `idx` of leaf node
    /// `node`) into a new page linked after it. Both pages stay checked out.
    fn split_page(
        &self,
        node: &mut BPTreeNode,
        idx: usize,
        page: &mut RecordPage,
    ) -> Result<RecordPage> {
        let mut right = self.pages.create()?;
        right.records = page.records.split_off(self.params.record_capacity() / 2)?;
        right.link = page.link;
        page.link = Some(right.id());
        let sep = page
            .max_key()
            .ok_or_else(|| StoreError::invariant("page split left an empty page"))?;
        node.records.insert(idx, sep)?;
        node.ptrs.insert(idx + 1, right.id())?;

        self.stats.inc_page_splits();
        tracing::trace!(
            target: "tuplestore::btree::split",
            node = node.id().0,
            left = page.id().0,
            right = right.id().0,
            "split record page"
        );
        self.nodes.write(node)?;
        Ok(right)
    }
}
