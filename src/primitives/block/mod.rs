#![forbid(unsafe_code)]
//! Fixed-size block managers.
//!
//! A block manager owns the bytes of one block file. Callers check blocks out
//! with [`BlockMgr::get_read`], [`BlockMgr::get_write`] or
//! [`BlockMgr::allocate`]. A checked-out [`Block`] is counted in
//! [`BlockMgr::outstanding`] until it is dropped, released or freed, so every
//! exit path (errors included) returns it. `Block` is not `Clone`.

use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering},
    Arc,
};

use crate::types::{BlockId, Result};

mod file;
mod mem;

pub use file::FileBlockMgr;
pub use mem::MemBlockMgr;

/// A checked-out copy of one block.
#[derive(Debug)]
pub struct Block {
    id: BlockId,
    data: Vec<u8>,
    _checkout: Checkout,
}

impl Block {
    pub(crate) fn new(id: BlockId, data: Vec<u8>, stats: &Arc<BlockMgrStats>) -> Self {
        Self {
            id,
            data,
            _checkout: Checkout::new(stats),
        }
    }

    /// Block id within its manager.
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Block bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable block bytes; changes persist only through [`BlockMgr::write`].
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Storage for fixed-size blocks addressed by [`BlockId`].
pub trait BlockMgr: Send + Sync + 'static {
    /// Size of every block in bytes.
    fn block_size(&self) -> usize;
    /// Allocates a zero-filled block, reusing freed ids first. The block is checked out.
    fn allocate(&self) -> Result<Block>;
    /// Checks out a block for reading.
    fn get_read(&self, id: BlockId) -> Result<Block>;
    /// Checks out a block that the caller intends to modify and [`write`](BlockMgr::write).
    fn get_write(&self, id: BlockId) -> Result<Block> {
        self.get_read(id)
    }
    /// Persists the bytes of a checked-out block. The block stays checked out.
    fn write(&self, block: &Block) -> Result<()>;
    /// Ends a checkout without writing.
    fn release(&self, block: Block) {
        drop(block);
    }
    /// Ends a checkout and returns the id to the free list.
    fn free(&self, block: Block) -> Result<()>;
    /// True if `id` names a live (allocated, not freed) block.
    fn valid(&self, id: BlockId) -> bool;
    /// One past the highest block id ever allocated.
    fn allocation_limit(&self) -> u32;
    /// Number of checkouts not yet released or freed.
    fn outstanding(&self) -> usize;
    /// Flushes to stable storage.
    fn sync(&self) -> Result<()>;
    /// Flushes and stops accepting work.
    fn close(&self) -> Result<()> {
        self.sync()
    }
    /// Counters for this manager.
    fn stats(&self) -> BlockMgrStatsSnapshot;
    /// Short name used in logs.
    fn label(&self) -> &str;
}

// Counts one live checkout; dropping it returns the checkout.
#[derive(Debug)]
struct Checkout {
    stats: Arc<BlockMgrStats>,
}

impl Checkout {
    fn new(stats: &Arc<BlockMgrStats>) -> Self {
        stats.outstanding.fetch_add(1, AtomicOrdering::Relaxed);
        Self {
            stats: Arc::clone(stats),
        }
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        self.stats.outstanding.fetch_sub(1, AtomicOrdering::Relaxed);
    }
}

/// Counters shared by block manager implementations.
#[derive(Default, Debug)]
pub struct BlockMgrStats {
    reads: AtomicU64,
    writes: AtomicU64,
    allocations: AtomicU64,
    frees: AtomicU64,
    cache_hits: AtomicU64,
    outstanding: AtomicUsize,
}

/// Point-in-time copy of [`BlockMgrStats`].
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMgrStatsSnapshot {
    /// Blocks checked out for read or write.
    pub reads: u64,
    /// Blocks written back.
    pub writes: u64,
    /// Blocks allocated.
    pub allocations: u64,
    /// Blocks returned to the free list.
    pub frees: u64,
    /// Reads served from a cache.
    pub cache_hits: u64,
    /// Checkouts not yet returned.
    pub outstanding: usize,
}

impl BlockMgrStats {
    pub(crate) fn on_read(&self) {
        self.reads.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn on_write(&self) {
        self.writes.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn on_allocate(&self) {
        self.allocations.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn on_free(&self) {
        self.frees.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn on_cache_hit(&self) {
        self.cache_hits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(AtomicOrdering::Relaxed)
    }

    pub(crate) fn snapshot(&self) -> BlockMgrStatsSnapshot {
        BlockMgrStatsSnapshot {
            reads: self.reads.load(AtomicOrdering::Relaxed),
            writes: self.writes.load(AtomicOrdering::Relaxed),
            allocations: self.allocations.load(AtomicOrdering::Relaxed),
            frees: self.frees.load(AtomicOrdering::Relaxed),
            cache_hits: self.cache_hits.load(AtomicOrdering::Relaxed),
            outstanding: self.outstanding(),
        }
    }
}
