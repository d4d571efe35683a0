//! Deletion with rebalancing on the way down: a child at or below its minimum
//! is topped up from a sibling, or merged with one, before it is entered.

use super::BPlusTree;
use crate::storage::btree::node::BPTreeNode;
use crate::storage::btree::page::RecordPage;
use crate::storage::record::Record;
use crate::types::{Result, StoreError};

impl BPlusTree {
    pub(crate) fn delete_record(&mut self, key: &[u8]) -> Result<Option<Record>> {
        self.stats.inc_searches();
        let root = self.nodes.get_write(self.root, None)?;
        let removed = self.delete_below(root, key)?;
        self.reduce_root()?;
        Ok(removed)
    }

    fn delete_below(&self, mut node: BPTreeNode, key: &[u8]) -> Result<Option<Record>> {
        if node.is_leaf {
            let removed = self.delete_from_page(&mut node, key);
            self.nodes.release(node);
            return removed;
        }
        let mut idx = node.find_child(key);
        let mut child = self.nodes.get_write(node.ptr(idx)?, Some(node.id()))?;
        if child.count() <= self.params.min_rec() && node.count() > 0 {
            self.rebalance_node(&mut node, idx, child)?;
            idx = node.find_child(key);
            child = self.nodes.get_write(node.ptr(idx)?, Some(node.id()))?;
        }
        let removed = self.delete_below(child, key)?;
        if removed.is_some() && idx < node.count() && node.records.at(idx)?.key() == key {
            let max = self.subtree_max(node.ptr(idx)?)?;
            node.records.set(idx, max)?;
            self.nodes.write(&mut node)?;
        }
        self.nodes.release(node);
        Ok(removed)
    }

    fn delete_from_page(&self, node: &mut BPTreeNode, key: &[u8]) -> Result<Option<Record>> {
        let mut idx = node.find_child(key);
        let mut page = self.pages.get_write(node.ptr(idx)?)?;
        if page.len() <= self.params.min_page_records() && node.count() > 0 {
            self.rebalance_page(node, idx, page)?;
            idx = node.find_child(key);
            page = self.pages.get_write(node.ptr(idx)?)?;
        }
        let removed = page.remove(key)?;
        if removed.is_none() {
            self.pages.release(page);
            return Ok(None);
        }
        if idx < node.count() && node.records.at(idx)?.key() == key {
            let max = page.max_key().ok_or_else(|| {
                StoreError::invariant(format!("record page {} emptied under a separator", page.id()))
            })?;
            node.records.set(idx, max)?;
            self.nodes.write(node)?;
        }
        self.pages.put(page)?;
        Ok(removed)
    }

    /// Tops up the underfull node `child` at `parent.ptrs[idx]`: borrow from
    /// the left sibling, else from the right, else merge. Writes everything it
    /// touches and ends the checkout of `child`.
    fn rebalance_node(&self, parent: &mut BPTreeNode, idx: usize, mut child: BPTreeNode) -> Result<()> {
        let min = self.params.min_rec();
        let parent_id = Some(parent.id());
        let left = match idx {
            0 => None,
            _ => Some(self.nodes.get_write(parent.ptr(idx - 1)?, parent_id)?),
        };
        let right = if idx < parent.count() {
            Some(self.nodes.get_write(parent.ptr(idx + 1)?, parent_id)?)
        } else {
            None
        };

        match (left, right) {
            (Some(mut left), right) if left.count() > min => {
                // Rotate left's last entry through the parent separator.
                let moved = left.records.pop();
                let ptr = left.ptrs.pop();
                let (Some(moved), Some(ptr)) = (moved, ptr) else {
                    return Err(StoreError::invariant("borrowing from an empty node"));
                };
                let sep = parent.records.set(idx - 1, moved)?;
                child.records.insert(0, sep)?;
                child.ptrs.insert(0, ptr)?;
                self.stats.inc_node_borrows();
                tracing::trace!(
                    target: "tuplestore::btree::merge",
                    from = left.id().0,
                    to = child.id().0,
                    direction = "left",
                    "borrowed node entry"
                );
                self.nodes.put(left)?;
                self.nodes.put(child)?;
                if let Some(right) = right {
                    self.nodes.release(right);
                }
            }
            (left, Some(mut right)) if right.count() > min => {
                let moved = right.records.remove(0)?;
                let ptr = right.ptrs.remove(0)?;
                let sep = parent.records.set(idx, moved)?;
                child.records.push(sep)?;
                child.ptrs.push(ptr)?;
                self.stats.inc_node_borrows();
                tracing::trace!(
                    target: "tuplestore::btree::merge",
                    from = right.id().0,
                    to = child.id().0,
                    direction = "right",
                    "borrowed node entry"
                );
                self.nodes.put(right)?;
                self.nodes.put(child)?;
                if let Some(left) = left {
                    self.nodes.release(left);
                }
            }
            (Some(mut left), right) => {
                if let Some(right) = right {
                    self.nodes.release(right);
                }
                self.merge_nodes(parent, idx - 1, &mut left, child)?;
                self.nodes.put(left)?;
            }
            (None, Some(right)) => {
                self.merge_nodes(parent, idx, &mut child, right)?;
                self.nodes.put(child)?;
            }
            (None, None) => {
                return Err(StoreError::invariant(format!(
                    "node {} has no sibling to rebalance with",
                    child.id()
                )))
            }
        }
        self.nodes.write(parent)
    }

    /// Folds `right` and the separator at `sep_idx` into `left`, then frees `right`.
    fn merge_nodes(
        &self,
        parent: &mut BPTreeNode,
        sep_idx: usize,
        left: &mut BPTreeNode,
        mut right: BPTreeNode,
    ) -> Result<()> {
        let sep = parent.records.remove(sep_idx)?;
        parent.ptrs.remove(sep_idx + 1)?;
        left.records.push(sep)?;
        left.records.append(&mut right.records)?;
        left.ptrs.append(&mut right.ptrs)?;
        self.stats.inc_node_merges();
        tracing::trace!(
            target: "tuplestore::btree::merge",
            survivor = left.id().0,
            removed = right.id().0,
            "merged nodes"
        );
        self.nodes.free(right)
    }

    /// Page counterpart of [`rebalance_node`](Self::rebalance_node). `node` is a
    /// leaf node; separators follow the pages' new maximum keys.
    fn rebalance_page(&self, node: &mut BPTreeNode, idx: usize, mut page: RecordPage) -> Result<()> {
        let min = self.params.min_page_records();
        let left = match idx {
            0 => None,
            _ => Some(self.pages.get_write(node.ptr(idx - 1)?)?),
        };
        let right = if idx < node.count() {
            Some(self.pages.get_write(node.ptr(idx + 1)?)?)
        } else {
            None
        };

        match (left, right) {
            (Some(mut left), right) if left.len() > min => {
                let moved = left
                    .records
                    .pop()
                    .ok_or_else(|| StoreError::invariant("borrowing from an empty page"))?;
                page.records.insert(0, moved)?;
                let sep = left
                    .max_key()
                    .ok_or_else(|| StoreError::invariant("borrow emptied the left page"))?;
                node.records.set(idx - 1, sep)?;
                self.stats.inc_page_borrows();
                tracing::trace!(
                    target: "tuplestore::btree::merge",
                    from = left.id().0,
                    to = page.id().0,
                    direction = "left",
                    "borrowed record"
                );
                self.pages.put(left)?;
                self.pages.put(page)?;
                if let Some(right) = right {
                    self.pages.release(right);
                }
            }
            (left, Some(mut right)) if right.len() > min => {
                let moved = right.records.remove(0)?;
                node.records.set(idx, moved.key_only())?;
                page.records.push(moved)?;
                self.stats.inc_page_borrows();
                tracing::trace!(
                    target: "tuplestore::btree::merge",
                    from = right.id().0,
                    to = page.id().0,
                    direction = "right",
                    "borrowed record"
                );
                self.pages.put(right)?;
                self.pages.put(page)?;
                if let Some(left) = left {
                    self.pages.release(left);
                }
            }
            (Some(mut left), right) => {
                if let Some(right) = right {
                    self.pages.release(right);
                }
                self.merge_pages(node, idx - 1, &mut left, page)?;
                self.pages.put(left)?;
            }
            (None, Some(right)) => {
                self.merge_pages(node, idx, &mut page, right)?;
                self.pages.put(page)?;
            }
            (None, None) => {
                return Err(StoreError::invariant(format!(
                    "record page {} has no sibling to rebalance with",
                    page.id()
                )))
            }
        }
        self.nodes.write(node)
    }

    fn merge_pages(
        &self,
        node: &mut BPTreeNode,
        sep_idx: usize,
        left: &mut RecordPage,
        mut right: RecordPage,
    ) -> Result<()> {
        node.records.remove(sep_idx)?;
        node.ptrs.remove(sep_idx + 1)?;
        left.records.append(&mut right.records)?;
        left.link = right.link;
        self.stats.inc_page_merges();
        tracing::trace!(
            target: "tuplestore::btree::merge",
            survivor = left.id().0,
            removed = right.id().0,
            "merged record pages"
        );
        self.pages.free(right)
    }

    /// Collapses a branch root with no keys into its only child, repeatedly.
    /// The root block keeps its id.
    pub(crate) fn reduce_root(&self) -> Result<()> {
        let mut root = self.nodes.get_write(self.root, None)?;
        let mut collapsed = false;
        while !root.is_leaf && root.count() == 0 {
            let mut child = self.nodes.get_write(root.ptr(0)?, Some(root.id()))?;
            root.is_leaf = child.is_leaf;
            root.ptrs.clear();
            root.records.append(&mut child.records)?;
            root.ptrs.append(&mut child.ptrs)?;
            self.stats.inc_root_collapses();
            tracing::trace!(
                target: "tuplestore::btree::merge",
                root = root.id().0,
                absorbed = child.id().0,
                "collapsed root"
            );
            self.nodes.free(child)?;
            collapsed = true;
        }
        if collapsed {
            self.nodes.put(root)
        } else {
            self.nodes.release(root);
            Ok(())
        }
    }
}
