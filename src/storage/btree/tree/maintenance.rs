use std::fmt::Write as _;

use super::BPlusTree;
use crate::storage::btree::node::BPTreeNode;
use crate::storage::record::Record;
use crate::types::{BlockId, Result, StoreError};

#[derive(Default)]
struct Walk {
    leaf_depth: Option<usize>,
    pages: Vec<BlockId>,
    records: u64,
}

impl BPlusTree {
    /// Number of node levels; a tree whose root points at record pages has height 1.
    pub fn height(&self) -> Result<usize> {
        let mut height = 1;
        let mut node = self.root_read()?;
        while !node.is_leaf {
            let child = node.ptr(0)?;
            let id = node.id();
            self.nodes.release(node);
            node = self.nodes.get_read(child, Some(id))?;
            height += 1;
        }
        self.nodes.release(node);
        Ok(height)
    }

    /// Frees every node and page, then reformats the root as a leaf over one
    /// empty page.
    pub(crate) fn clear_tree(&mut self) -> Result<()> {
        let mut root = self.nodes.get_write(self.root, None)?;
        for ptr in root.ptrs.iter().copied().collect::<Vec<_>>() {
            if root.is_leaf {
                let page = self.pages.get_write(ptr)?;
                self.pages.free(page)?;
            } else {
                self.free_subtree(ptr)?;
            }
        }
        let page = self.pages.create()?;
        root.is_leaf = true;
        root.records.clear();
        root.ptrs.clear();
        root.ptrs.push(page.id())?;
        self.pages.put(page)?;
        self.nodes.put(root)?;
        tracing::debug!(target: "tuplestore::btree", root = self.root.0, "cleared tree");
        Ok(())
    }

    /// Frees node `id` and everything below it.
    pub(crate) fn free_subtree(&self, id: BlockId) -> Result<()> {
        let node = self.nodes.get_write(id, None)?;
        for &ptr in node.ptrs.iter() {
            if node.is_leaf {
                let page = self.pages.get_write(ptr)?;
                self.pages.free(page)?;
            } else {
                self.free_subtree(ptr)?;
            }
        }
        self.nodes.free(node)
    }

    /// Checks the whole structure and returns the number of records.
    ///
    /// Keys ascend within every node and page, each separator equals the
    /// largest key of the subtree to its left, all record pages sit at the
    /// same depth, no page but a lone root page is empty, and the page chain
    /// visits exactly the pages reached by descent, in order.
    pub fn verify(&self) -> Result<u64> {
        let mut walk = Walk::default();
        let root = self.root_read()?;
        self.verify_node(root, 0, None, None, &mut walk)?;

        let mut chained = Vec::with_capacity(walk.pages.len());
        let mut next = walk.pages.first().copied();
        while let Some(id) = next {
            if chained.len() > walk.pages.len() {
                return Err(StoreError::invariant("record page chain does not terminate"));
            }
            chained.push(id);
            let page = self.pages.get_read(id)?;
            next = page.link;
            self.pages.release(page);
        }
        if chained != walk.pages {
            return Err(StoreError::invariant(format!(
                "record page chain {chained:?} differs from tree order {:?}",
                walk.pages
            )));
        }
        Ok(walk.records)
    }

    /// Verifies `node`, whose keys must lie in `(lo, hi]`. Returns the subtree's largest key.
    fn verify_node(
        &self,
        node: BPTreeNode,
        depth: usize,
        lo: Option<&Record>,
        hi: Option<&Record>,
        walk: &mut Walk,
    ) -> Result<Option<Record>> {
        let id = node.id();
        if node.ptrs.len() != node.count() + 1 {
            return Err(StoreError::invariant(format!(
                "node {id} has {} keys and {} pointers",
                node.count(),
                node.ptrs.len()
            )));
        }
        check_keys(node.records.as_slice(), lo, hi).map_err(|why| {
            StoreError::invariant(format!("node {id}: {why}"))
        })?;
        if node.is_leaf {
            match walk.leaf_depth {
                None => walk.leaf_depth = Some(depth),
                Some(d) if d != depth => {
                    return Err(StoreError::invariant(format!(
                        "leaf node {id} at depth {depth}, expected {d}"
                    )))
                }
                Some(_) => {}
            }
        }

        let mut max = None;
        for (i, &ptr) in node.ptrs.iter().enumerate() {
            let child_lo = if i == 0 { lo } else { node.records.get(i - 1) };
            let child_hi = node.records.get(i).or(hi);
            max = if node.is_leaf {
                let page = self.pages.get_read(ptr)?;
                let lone_root_page = node.is_root() && node.count() == 0;
                if page.is_empty() && !lone_root_page {
                    return Err(StoreError::invariant(format!("record page {ptr} is empty")));
                }
                check_keys(page.records.as_slice(), child_lo, child_hi).map_err(|why| {
                    StoreError::invariant(format!("record page {ptr}: {why}"))
                })?;
                walk.pages.push(ptr);
                walk.records += page.len() as u64;
                let page_max = page.max_key();
                self.pages.release(page);
                page_max
            } else {
                let child = self.nodes.get_read(ptr, Some(id))?;
                self.verify_node(child, depth + 1, child_lo, child_hi, walk)?
            };
            if let Some(sep) = node.records.get(i) {
                if max.as_ref().map(Record::key) != Some(sep.key()) {
                    return Err(StoreError::invariant(format!(
                        "node {id} separator {i} is {sep}, subtree maximum is {}",
                        max.as_ref().map_or_else(|| "none".to_owned(), Record::to_string)
                    )));
                }
            }
        }
        self.nodes.release(node);
        Ok(max)
    }

    /// Indented rendering of every node and page, for debugging.
    pub fn dump(&self) -> Result<String> {
        let mut out = String::new();
        self.dump_node(self.root, 0, &mut out)?;
        Ok(out)
    }

    fn dump_node(&self, id: BlockId, depth: usize, out: &mut String) -> Result<()> {
        let node = self.nodes.get_read(id, None)?;
        let indent = "  ".repeat(depth);
        let keys: Vec<String> = node.records.iter().map(Record::to_string).collect();
        let kind = if node.is_leaf { "leaf" } else { "branch" };
        let _ = writeln!(out, "{indent}node {id} ({kind}) [{}]", keys.join(" "));
        for &ptr in node.ptrs.iter() {
            if node.is_leaf {
                let page = self.pages.get_read(ptr)?;
                let records: Vec<String> = page.records.iter().map(Record::to_string).collect();
                let link = page.link.map_or_else(|| "-".to_owned(), |l| l.to_string());
                let _ = writeln!(
                    out,
                    "{indent}  page {ptr} -> {link} [{}]",
                    records.join(" ")
                );
                self.pages.release(page);
            } else {
                self.dump_node(ptr, depth + 1, out)?;
            }
        }
        self.nodes.release(node);
        Ok(())
    }
}

/// Keys strictly ascending and inside `(lo, hi]`.
fn check_keys(records: &[Record], lo: Option<&Record>, hi: Option<&Record>) -> std::result::Result<(), String> {
    if let Some(pair) = records.windows(2).find(|w| w[0].key() >= w[1].key()) {
        return Err(format!("keys out of order at {}", pair[1]));
    }
    if let (Some(first), Some(lo)) = (records.first(), lo) {
        if first.key() <= lo.key() {
            return Err(format!("key {first} not above lower bound {lo}"));
        }
    }
    if let (Some(last), Some(hi)) = (records.last(), hi) {
        if last.key() > hi.key() {
            return Err(format!("key {last} above upper bound {hi}"));
        }
    }
    Ok(())
}
