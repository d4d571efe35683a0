use std::{collections::BTreeSet, sync::Arc};

use parking_lot::Mutex;

use super::{Block, BlockMgr, BlockMgrStats, BlockMgrStatsSnapshot};
use crate::types::{BlockId, Result, StoreError};

/// Block manager that keeps every block on the heap. Used for in-memory stores and tests.
pub struct MemBlockMgr {
    label: String,
    block_size: usize,
    state: Mutex<MemState>,
    stats: Arc<BlockMgrStats>,
}

#[derive(Default)]
struct MemState {
    blocks: Vec<Option<Vec<u8>>>,
    free: BTreeSet<BlockId>,
}

impl MemBlockMgr {
    /// Creates an empty manager for blocks of `block_size` bytes.
    pub fn new(label: impl Into<String>, block_size: usize) -> Self {
        Self {
            label: label.into(),
            block_size,
            state: Mutex::new(MemState::default()),
            stats: Arc::new(BlockMgrStats::default()),
        }
    }
}

impl BlockMgr for MemBlockMgr {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn allocate(&self) -> Result<Block> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let id = match state.free.pop_first() {
            Some(id) => {
                state.blocks[id.index()] = Some(vec![0u8; self.block_size]);
                id
            }
            None => {
                let next = u32::try_from(state.blocks.len())
                    .map_err(|_| StoreError::Invalid("block id space exhausted"))?;
                state.blocks.push(Some(vec![0u8; self.block_size]));
                BlockId(next)
            }
        };
        self.stats.on_allocate();
        tracing::trace!(target: "tuplestore::block", mgr = %self.label, block = %id, "allocate");
        Ok(Block::new(id, vec![0u8; self.block_size], &self.stats))
    }

    fn get_read(&self, id: BlockId) -> Result<Block> {
        let state = self.state.lock();
        match state.blocks.get(id.index()) {
            Some(Some(bytes)) => {
                self.stats.on_read();
                Ok(Block::new(id, bytes.clone(), &self.stats))
            }
            Some(None) => Err(StoreError::invariant(format!(
                "{}: read of freed block {id}",
                self.label
            ))),
            None => Err(StoreError::invariant(format!(
                "{}: block {id} was never allocated",
                self.label
            ))),
        }
    }

    fn write(&self, block: &Block) -> Result<()> {
        if block.data().len() != self.block_size {
            return Err(StoreError::Invalid("block buffer has the wrong size"));
        }
        let mut state = self.state.lock();
        match state.blocks.get_mut(block.id().index()) {
            Some(Some(slot)) => {
                slot.copy_from_slice(block.data());
                self.stats.on_write();
                Ok(())
            }
            _ => Err(StoreError::invariant(format!(
                "{}: write to unallocated block {}",
                self.label,
                block.id()
            ))),
        }
    }

    fn free(&self, block: Block) -> Result<()> {
        let id = block.id();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        match state.blocks.get_mut(id.index()) {
            Some(slot @ Some(_)) => {
                *slot = None;
                state.free.insert(id);
                self.stats.on_free();
                tracing::trace!(target: "tuplestore::block", mgr = %self.label, block = %id, "free");
                Ok(())
            }
            _ => Err(StoreError::invariant(format!(
                "{}: double free of block {id}",
                self.label
            ))),
        }
    }

    fn valid(&self, id: BlockId) -> bool {
        matches!(self.state.lock().blocks.get(id.index()), Some(Some(_)))
    }

    fn allocation_limit(&self) -> u32 {
        self.state.lock().blocks.len() as u32
    }

    fn outstanding(&self) -> usize {
        self.stats.outstanding()
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> BlockMgrStatsSnapshot {
        self.stats.snapshot()
    }

    fn label(&self) -> &str {
        &self.label
    }
}
