use crate::storage::record::RecordFactory;
use crate::types::{Result, StoreError};

/// Bytes before the keys of a node block: kind, padding, count.
pub const NODE_HEADER_LEN: usize = 8;
/// Bytes before the records of a record page: count, link.
pub const PAGE_HEADER_LEN: usize = 8;
/// Width of one child pointer in a node block.
pub const PTR_LEN: usize = 4;
/// Record page size used when none is configured.
pub const DEFAULT_RECORD_BLOCK_SIZE: usize = 8192;

/// Shape of a B+Tree: fan-out, record layout and block sizes.
///
/// A node holds at most `2 * order - 1` keys and `2 * order` pointers; a
/// non-root node below `order - 1` keys is rebalanced on the delete path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BPlusTreeParams {
    order: usize,
    key_len: usize,
    value_len: usize,
    node_block_size: usize,
    record_block_size: usize,
}

impl BPlusTreeParams {
    /// Params for `order` with records shaped by `factory`.
    pub fn new(order: usize, factory: RecordFactory) -> Self {
        Self {
            order,
            key_len: factory.key_len(),
            value_len: factory.value_len(),
            node_block_size: Self::node_block_size_for(order, factory.key_len()),
            record_block_size: DEFAULT_RECORD_BLOCK_SIZE,
        }
    }

    /// Params with the largest order whose node fits in `block_size` bytes.
    pub fn for_node_block_size(block_size: usize, factory: RecordFactory) -> Result<Self> {
        // size(order) = header + (2o - 1) * key + 2o * ptr
        let per_order = 2 * (factory.key_len() + PTR_LEN);
        let budget = (block_size + factory.key_len())
            .checked_sub(NODE_HEADER_LEN)
            .ok_or(StoreError::Invalid("node block smaller than its header"))?;
        let order = budget / per_order;
        if order < 2 {
            return Err(StoreError::Invalid("node block too small for order 2"));
        }
        let mut params = Self::new(order, factory);
        params.node_block_size = block_size;
        Ok(params)
    }

    /// Sets the record page size so that exactly `capacity` records fit.
    pub fn with_record_capacity(mut self, capacity: usize) -> Self {
        self.record_block_size = PAGE_HEADER_LEN + capacity * self.record_len();
        self
    }

    /// Sets the record page size in bytes.
    pub fn with_record_block_size(mut self, block_size: usize) -> Self {
        self.record_block_size = block_size;
        self
    }

    /// Bytes a node block needs for `order` and `key_len`.
    pub fn node_block_size_for(order: usize, key_len: usize) -> usize {
        NODE_HEADER_LEN + (2 * order).saturating_sub(1) * key_len + 2 * order * PTR_LEN
    }

    /// Rejects shapes the tree cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.order < 2 {
            return Err(StoreError::Invalid("B+Tree order must be at least 2"));
        }
        if self.key_len == 0 {
            return Err(StoreError::Invalid("B+Tree keys must be non-empty"));
        }
        if self.node_block_size < Self::node_block_size_for(self.order, self.key_len) {
            return Err(StoreError::Invalid("node block too small for the order"));
        }
        if self.record_capacity() < 2 {
            return Err(StoreError::Invalid("record page must hold at least two records"));
        }
        if self.record_capacity() > i32::MAX as usize || self.max_rec() > i32::MAX as usize {
            return Err(StoreError::Invalid("block counts exceed the on-disk field width"));
        }
        Ok(())
    }

    /// Fan-out parameter.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Key length in bytes.
    pub fn key_len(&self) -> usize {
        self.key_len
    }

    /// Value length in bytes.
    pub fn value_len(&self) -> usize {
        self.value_len
    }

    /// Full record length in a record page.
    pub fn record_len(&self) -> usize {
        self.key_len + self.value_len
    }

    /// Factory for the records this tree stores.
    pub fn record_factory(&self) -> RecordFactory {
        RecordFactory::new(self.key_len, self.value_len)
    }

    /// Node block size in bytes.
    pub fn node_block_size(&self) -> usize {
        self.node_block_size
    }

    /// Record page size in bytes.
    pub fn record_block_size(&self) -> usize {
        self.record_block_size
    }

    /// Maximum keys in a node.
    pub fn max_rec(&self) -> usize {
        2 * self.order - 1
    }

    /// Maximum pointers in a node.
    pub fn max_ptr(&self) -> usize {
        2 * self.order
    }

    /// Keys at or below which a non-root node is rebalanced before descent.
    pub fn min_rec(&self) -> usize {
        self.order - 1
    }

    /// Position of the median key moved up by a node split.
    pub fn split_index(&self) -> usize {
        self.order - 1
    }

    /// Records per page.
    pub fn record_capacity(&self) -> usize {
        self.record_block_size.saturating_sub(PAGE_HEADER_LEN) / self.record_len().max(1)
    }

    /// Records at or below which a page is rebalanced before deletion.
    pub fn min_page_records(&self) -> usize {
        self.record_capacity() / 2
    }
}
