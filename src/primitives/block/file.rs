use std::{collections::BTreeSet, num::NonZeroUsize, path::Path, sync::Arc};

use lru::LruCache;
use parking_lot::Mutex;

use super::{Block, BlockMgr, BlockMgrStats, BlockMgrStatsSnapshot};
use crate::primitives::io::{short_read_is_corruption, FileIo, StdFileIo};
use crate::types::{BlockId, Result, StoreError};

/// Block manager over one file, with an LRU cache of clean block images.
///
/// Block `n` lives at byte offset `n * block_size`. Freed ids are reused within
/// a session; the free list is not persisted, so blocks freed before a close
/// stay allocated after reopen.
pub struct FileBlockMgr {
    label: String,
    block_size: usize,
    io: StdFileIo,
    state: Mutex<FileState>,
    stats: Arc<BlockMgrStats>,
}

struct FileState {
    limit: u32,
    free: BTreeSet<BlockId>,
    cache: Option<LruCache<BlockId, Vec<u8>>>,
}

impl FileBlockMgr {
    /// Opens or creates the block file at `path`.
    ///
    /// `cache_blocks == 0` disables the read cache.
    pub fn open(path: impl AsRef<Path>, block_size: usize, cache_blocks: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(StoreError::Invalid("block size must be positive"));
        }
        let path = path.as_ref();
        let io = StdFileIo::open(path)?;
        let len = io.len()?;
        if len % block_size as u64 != 0 {
            return Err(StoreError::Corruption(
                "block file length is not a multiple of the block size",
            ));
        }
        let limit = u32::try_from(len / block_size as u64)
            .map_err(|_| StoreError::Corruption("block file too large"))?;
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        tracing::debug!(
            target: "tuplestore::block",
            mgr = %label,
            block_size,
            blocks = limit,
            cache_blocks,
            "opened block file"
        );
        Ok(Self {
            label,
            block_size,
            io,
            state: Mutex::new(FileState {
                limit,
                free: BTreeSet::new(),
                cache: NonZeroUsize::new(cache_blocks).map(LruCache::new),
            }),
            stats: Arc::new(BlockMgrStats::default()),
        })
    }

    fn offset(&self, id: BlockId) -> u64 {
        id.0 as u64 * self.block_size as u64
    }

    fn check_live(&self, state: &FileState, id: BlockId) -> Result<()> {
        if id.0 >= state.limit {
            return Err(StoreError::invariant(format!(
                "{}: block {id} was never allocated",
                self.label
            )));
        }
        if state.free.contains(&id) {
            return Err(StoreError::invariant(format!(
                "{}: access to freed block {id}",
                self.label
            )));
        }
        Ok(())
    }
}

impl BlockMgr for FileBlockMgr {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn allocate(&self) -> Result<Block> {
        let mut state = self.state.lock();
        let id = match state.free.pop_first() {
            Some(id) => id,
            None => {
                let id = BlockId(state.limit);
                state.limit = state
                    .limit
                    .checked_add(1)
                    .ok_or(StoreError::Invalid("block id space exhausted"))?;
                id
            }
        };
        let zeros = vec![0u8; self.block_size];
        // Extend the file now so its length always covers every allocated id.
        self.io.write_at(self.offset(id), &zeros)?;
        if let Some(cache) = state.cache.as_mut() {
            cache.put(id, zeros.clone());
        }
        self.stats.on_allocate();
        tracing::trace!(target: "tuplestore::block", mgr = %self.label, block = %id, "allocate");
        Ok(Block::new(id, zeros, &self.stats))
    }

    fn get_read(&self, id: BlockId) -> Result<Block> {
        let mut state = self.state.lock();
        self.check_live(&state, id)?;
        if let Some(bytes) = state.cache.as_mut().and_then(|c| c.get(&id)) {
            let data = bytes.clone();
            self.stats.on_cache_hit();
            self.stats.on_read();
            return Ok(Block::new(id, data, &self.stats));
        }
        let mut data = vec![0u8; self.block_size];
        self.io
            .read_at(self.offset(id), &mut data)
            .map_err(|err| short_read_is_corruption(err, "block file truncated"))?;
        if let Some(cache) = state.cache.as_mut() {
            cache.put(id, data.clone());
        }
        self.stats.on_read();
        Ok(Block::new(id, data, &self.stats))
    }

    fn write(&self, block: &Block) -> Result<()> {
        if block.data().len() != self.block_size {
            return Err(StoreError::Invalid("block buffer has the wrong size"));
        }
        let mut state = self.state.lock();
        self.check_live(&state, block.id())?;
        self.io.write_at(self.offset(block.id()), block.data())?;
        if let Some(cache) = state.cache.as_mut() {
            cache.put(block.id(), block.data().to_vec());
        }
        self.stats.on_write();
        Ok(())
    }

    fn free(&self, block: Block) -> Result<()> {
        let id = block.id();
        let mut state = self.state.lock();
        self.check_live(&state, id)?;
        if let Some(cache) = state.cache.as_mut() {
            cache.pop(&id);
        }
        state.free.insert(id);
        self.stats.on_free();
        tracing::trace!(target: "tuplestore::block", mgr = %self.label, block = %id, "free");
        Ok(())
    }

    fn valid(&self, id: BlockId) -> bool {
        let state = self.state.lock();
        id.0 < state.limit && !state.free.contains(&id)
    }

    fn allocation_limit(&self) -> u32 {
        self.state.lock().limit
    }

    fn outstanding(&self) -> usize {
        self.stats.outstanding()
    }

    fn sync(&self) -> Result<()> {
        self.io.sync_all()
    }

    fn close(&self) -> Result<()> {
        let outstanding = self.outstanding();
        if outstanding != 0 {
            tracing::warn!(
                target: "tuplestore::block",
                mgr = %self.label,
                outstanding,
                "closing with blocks still checked out"
            );
        }
        self.sync()
    }

    fn stats(&self) -> BlockMgrStatsSnapshot {
        self.stats.snapshot()
    }

    fn label(&self) -> &str {
        &self.label
    }
}
