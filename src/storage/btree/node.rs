//! Tree nodes and their block codec.
//!
//! ```text
//! [kind u8][pad 3][count i32][max_rec keys][max_ptr u32 pointers]
//! ```
//!
//! `count` is the number of keys; a node always holds `count + 1` pointers.
//! A leaf node's pointers name record pages, a branch node's name nodes.

use std::sync::Arc;

use super::params::{BPlusTreeParams, NODE_HEADER_LEN, PTR_LEN};
use crate::primitives::block::{Block, BlockMgr};
use crate::primitives::bytes::{ord, BoundedVec};
use crate::storage::record::{Record, RecordFactory};
use crate::types::{BlockId, Result, StoreError};

const KIND_BRANCH: u8 = 1;
const KIND_LEAF: u8 = 2;

/// A decoded tree node, checked out from the node block manager.
pub struct BPTreeNode {
    block: Block,
    /// Parent node, `None` for the root. Set during descent; not persisted.
    pub(crate) parent: Option<BlockId>,
    /// True when the pointers name record pages.
    pub(crate) is_leaf: bool,
    /// Separator keys; `records[i]` is the largest key under `ptrs[i]`.
    pub(crate) records: BoundedVec<Record>,
    pub(crate) ptrs: BoundedVec<BlockId>,
}

impl BPTreeNode {
    /// Block id of this node.
    pub fn id(&self) -> BlockId {
        self.block.id()
    }

    /// Number of keys.
    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// True when no further key fits.
    pub fn is_full(&self) -> bool {
        self.records.is_full()
    }

    /// True when the children are record pages.
    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    /// Separator keys.
    pub fn keys(&self) -> &[Record] {
        self.records.as_slice()
    }

    /// Child pointers.
    pub fn children(&self) -> &[BlockId] {
        self.ptrs.as_slice()
    }

    /// True for the tree root.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Index of the child whose subtree may hold `key`: the first separator not below it.
    pub fn find_child(&self, key: &[u8]) -> usize {
        self.records
            .as_slice()
            .partition_point(|sep| sep.key() < key)
    }

    /// Pointer at `idx`.
    pub fn ptr(&self, idx: usize) -> Result<BlockId> {
        self.ptrs.at(idx).copied()
    }

    fn check_shape(&self) -> Result<()> {
        if self.ptrs.len() != self.records.len() + 1 {
            return Err(StoreError::invariant(format!(
                "node {} has {} keys and {} pointers",
                self.id(),
                self.records.len(),
                self.ptrs.len()
            )));
        }
        Ok(())
    }
}

/// Checks nodes in and out of a block manager.
#[derive(Clone)]
pub struct NodeManager {
    blocks: Arc<dyn BlockMgr>,
    params: BPlusTreeParams,
    keys: RecordFactory,
}

impl NodeManager {
    /// Wraps `blocks`, whose block size must match the params.
    pub fn new(blocks: Arc<dyn BlockMgr>, params: BPlusTreeParams) -> Result<Self> {
        if blocks.block_size() != params.node_block_size() {
            return Err(StoreError::BlockSizeMismatch {
                expected: params.node_block_size(),
                found: blocks.block_size(),
            });
        }
        Ok(Self {
            blocks,
            params,
            keys: RecordFactory::new(params.key_len(), 0),
        })
    }

    /// Underlying block manager.
    pub fn blocks(&self) -> &Arc<dyn BlockMgr> {
        &self.blocks
    }

    fn empty_records(&self) -> BoundedVec<Record> {
        BoundedVec::new(self.params.max_rec(), "node record buffer")
    }

    fn empty_ptrs(&self) -> BoundedVec<BlockId> {
        BoundedVec::new(self.params.max_ptr(), "node pointer buffer")
    }

    /// Allocates an empty node. It has no pointers until the caller adds them.
    pub fn create(&self, is_leaf: bool, parent: Option<BlockId>) -> Result<BPTreeNode> {
        let block = self.blocks.allocate()?;
        Ok(BPTreeNode {
            block,
            parent,
            is_leaf,
            records: self.empty_records(),
            ptrs: self.empty_ptrs(),
        })
    }

    /// Checks out a node for reading.
    pub fn get_read(&self, id: BlockId, parent: Option<BlockId>) -> Result<BPTreeNode> {
        let block = self.blocks.get_read(id)?;
        self.decode(block, parent)
    }

    /// Checks out a node for modification.
    pub fn get_write(&self, id: BlockId, parent: Option<BlockId>) -> Result<BPTreeNode> {
        let block = self.blocks.get_write(id)?;
        self.decode(block, parent)
    }

    /// Writes `node` and ends its checkout.
    pub fn put(&self, mut node: BPTreeNode) -> Result<()> {
        self.write(&mut node)
    }

    /// Writes `node`, keeping it checked out.
    pub fn write(&self, node: &mut BPTreeNode) -> Result<()> {
        self.encode(node)?;
        self.blocks.write(&node.block)
    }

    /// Ends a checkout without writing.
    pub fn release(&self, node: BPTreeNode) {
        self.blocks.release(node.block);
    }

    /// Returns the node's block to the free list.
    pub fn free(&self, node: BPTreeNode) -> Result<()> {
        self.blocks.free(node.block)
    }

    fn decode(&self, block: Block, parent: Option<BlockId>) -> Result<BPTreeNode> {
        let data = block.data();
        let is_leaf = match data.first().copied() {
            Some(KIND_LEAF) => true,
            Some(KIND_BRANCH) => false,
            _ => return Err(StoreError::Corruption("unknown node kind")),
        };
        let count = ord::get_i32_be(data, 4)?;
        let count = usize::try_from(count)
            .ok()
            .filter(|c| *c <= self.params.max_rec())
            .ok_or(StoreError::Corruption("node key count out of range"))?;
        let key_len = self.params.key_len();
        let mut records = self.empty_records();
        for i in 0..count {
            records.push(self.keys.read_key(&data[NODE_HEADER_LEN + i * key_len..])?)?;
        }
        let ptr_base = NODE_HEADER_LEN + self.params.max_rec() * key_len;
        let mut ptrs = self.empty_ptrs();
        for i in 0..=count {
            ptrs.push(BlockId(ord::get_u32_be(data, ptr_base + i * PTR_LEN)?))?;
        }
        Ok(BPTreeNode {
            block,
            parent,
            is_leaf,
            records,
            ptrs,
        })
    }

    fn encode(&self, node: &mut BPTreeNode) -> Result<()> {
        node.check_shape()?;
        let key_len = self.params.key_len();
        let ptr_base = NODE_HEADER_LEN + self.params.max_rec() * key_len;
        let is_leaf = node.is_leaf;
        let count = node.records.len() as i32;
        let data = node.block.data_mut();
        data.fill(0);
        data[0] = if is_leaf { KIND_LEAF } else { KIND_BRANCH };
        ord::put_i32_be(data, 4, count);
        for (i, record) in node.records.iter().enumerate() {
            let off = NODE_HEADER_LEN + i * key_len;
            data[off..off + key_len].copy_from_slice(record.key());
        }
        for (i, ptr) in node.ptrs.iter().enumerate() {
            ord::put_u32_be(data, ptr_base + i * PTR_LEN, ptr.0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::block::MemBlockMgr;

    fn manager() -> NodeManager {
        let params = BPlusTreeParams::new(2, RecordFactory::new(4, 0));
        let blocks: Arc<dyn BlockMgr> =
            Arc::new(MemBlockMgr::new("nodes", params.node_block_size()));
        NodeManager::new(blocks, params).unwrap()
    }

    #[test]
    fn node_round_trips_through_block() -> Result<()> {
        let mgr = manager();
        let keys = RecordFactory::new(4, 0);
        let mut node = mgr.create(true, None)?;
        let id = node.id();
        node.records.push(keys.create(&[0, 0, 0, 5])?)?;
        node.ptrs.push(BlockId(7))?;
        node.ptrs.push(BlockId(9))?;
        mgr.put(node)?;

        let back = mgr.get_read(id, Some(BlockId(3)))?;
        assert!(back.is_leaf);
        assert_eq!(back.count(), 1);
        assert_eq!(back.ptrs.as_slice(), &[BlockId(7), BlockId(9)]);
        assert_eq!(back.parent, Some(BlockId(3)));
        assert_eq!(back.find_child(&[0, 0, 0, 5]), 0);
        assert_eq!(back.find_child(&[0, 0, 0, 6]), 1);
        mgr.release(back);
        assert_eq!(mgr.blocks().outstanding(), 0);
        Ok(())
    }

    #[test]
    fn pointer_count_must_match_keys() -> Result<()> {
        let mgr = manager();
        let node = mgr.create(false, None)?;
        let err = mgr.put(node).unwrap_err();
        assert!(err.is_invariant());
        Ok(())
    }

    #[test]
    fn garbage_kind_is_corruption() -> Result<()> {
        let mgr = manager();
        let block = mgr.blocks().allocate()?;
        let id = block.id();
        drop(block);
        assert!(matches!(
            mgr.get_read(id, None),
            Err(StoreError::Corruption(_))
        ));
        Ok(())
    }
}
