//! Record pages: the bottom level of the tree, chained in key order.
//!
//! ```text
//! [count i32][link i32, -1 = none][capacity records]
//! ```

use std::sync::Arc;

use super::params::{BPlusTreeParams, PAGE_HEADER_LEN};
use crate::primitives::block::{Block, BlockMgr};
use crate::primitives::bytes::{ord, BoundedVec};
use crate::storage::record::{Record, RecordFactory};
use crate::types::{BlockId, Result, StoreError};

const NO_LINK: i32 = -1;

/// A decoded record page, checked out from the record block manager.
pub struct RecordPage {
    block: Block,
    /// Next page in key order.
    pub(crate) link: Option<BlockId>,
    pub(crate) records: BoundedVec<Record>,
}

impl RecordPage {
    /// Block id of this page.
    pub fn id(&self) -> BlockId {
        self.block.id()
    }

    /// Next page in key order.
    pub fn link(&self) -> Option<BlockId> {
        self.link
    }

    /// Records in key order.
    pub fn records(&self) -> &[Record] {
        self.records.as_slice()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the page holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when no further record fits.
    pub fn is_full(&self) -> bool {
        self.records.is_full()
    }

    /// Position of `key`, or where it would be inserted.
    pub fn search(&self, key: &[u8]) -> std::result::Result<usize, usize> {
        self.records
            .as_slice()
            .binary_search_by(|probe| probe.key().cmp(key))
    }

    /// Inserts `record`, replacing a record with the same key. Returns the replaced record.
    pub fn insert(&mut self, record: Record) -> Result<Option<Record>> {
        match self.search(record.key()) {
            Ok(idx) => self.records.set(idx, record).map(Some),
            Err(idx) => {
                self.records.insert(idx, record)?;
                Ok(None)
            }
        }
    }

    /// Removes the record with `key`.
    pub fn remove(&mut self, key: &[u8]) -> Result<Option<Record>> {
        match self.search(key) {
            Ok(idx) => self.records.remove(idx).map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Record with `key`.
    pub fn get(&self, key: &[u8]) -> Option<&Record> {
        self.search(key).ok().and_then(|idx| self.records.get(idx))
    }

    /// Key of the last record, without its value.
    pub fn max_key(&self) -> Option<Record> {
        self.records.last().map(Record::key_only)
    }
}

/// Checks record pages in and out of a block manager.
#[derive(Clone)]
pub struct RecordsManager {
    blocks: Arc<dyn BlockMgr>,
    factory: RecordFactory,
    capacity: usize,
}

impl RecordsManager {
    /// Wraps `blocks`, whose block size must match the params.
    pub fn new(blocks: Arc<dyn BlockMgr>, params: BPlusTreeParams) -> Result<Self> {
        if blocks.block_size() != params.record_block_size() {
            return Err(StoreError::BlockSizeMismatch {
                expected: params.record_block_size(),
                found: blocks.block_size(),
            });
        }
        Ok(Self {
            blocks,
            factory: params.record_factory(),
            capacity: params.record_capacity(),
        })
    }

    /// Underlying block manager.
    pub fn blocks(&self) -> &Arc<dyn BlockMgr> {
        &self.blocks
    }

    /// Records per page.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn empty_records(&self) -> BoundedVec<Record> {
        BoundedVec::new(self.capacity, "record page")
    }

    /// Allocates an empty, unlinked page.
    pub fn create(&self) -> Result<RecordPage> {
        Ok(RecordPage {
            block: self.blocks.allocate()?,
            link: None,
            records: self.empty_records(),
        })
    }

    /// Checks out a page for reading.
    pub fn get_read(&self, id: BlockId) -> Result<RecordPage> {
        let block = self.blocks.get_read(id)?;
        self.decode(block)
    }

    /// Checks out a page for modification.
    pub fn get_write(&self, id: BlockId) -> Result<RecordPage> {
        let block = self.blocks.get_write(id)?;
        self.decode(block)
    }

    /// Writes `page` and ends its checkout.
    pub fn put(&self, mut page: RecordPage) -> Result<()> {
        self.write(&mut page)
    }

    /// Writes `page`, keeping it checked out.
    pub fn write(&self, page: &mut RecordPage) -> Result<()> {
        self.encode(page)?;
        self.blocks.write(&page.block)
    }

    /// Ends a checkout without writing.
    pub fn release(&self, page: RecordPage) {
        self.blocks.release(page.block);
    }

    /// Returns the page's block to the free list.
    pub fn free(&self, page: RecordPage) -> Result<()> {
        self.blocks.free(page.block)
    }

    fn decode(&self, block: Block) -> Result<RecordPage> {
        let data = block.data();
        let count = usize::try_from(ord::get_i32_be(data, 0)?)
            .ok()
            .filter(|c| *c <= self.capacity)
            .ok_or(StoreError::Corruption("record page count out of range"))?;
        let link = match ord::get_i32_be(data, 4)? {
            NO_LINK => None,
            id if id >= 0 => Some(BlockId(id as u32)),
            _ => return Err(StoreError::Corruption("record page link out of range")),
        };
        let record_len = self.factory.record_len();
        let mut records = self.empty_records();
        for i in 0..count {
            let off = PAGE_HEADER_LEN + i * record_len;
            records.push(self.factory.read_record(&data[off..])?)?;
        }
        Ok(RecordPage {
            block,
            link,
            records,
        })
    }

    fn encode(&self, page: &mut RecordPage) -> Result<()> {
        let link = match page.link {
            None => NO_LINK,
            Some(id) => i32::try_from(id.0)
                .map_err(|_| StoreError::Invalid("record page id exceeds link width"))?,
        };
        let record_len = self.factory.record_len();
        let count = page.records.len() as i32;
        let data = page.block.data_mut();
        data.fill(0);
        ord::put_i32_be(data, 0, count);
        ord::put_i32_be(data, 4, link);
        for (i, record) in page.records.iter().enumerate() {
            let off = PAGE_HEADER_LEN + i * record_len;
            self.factory
                .write_record(record, &mut data[off..off + record_len])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::block::MemBlockMgr;

    fn manager(capacity: usize) -> RecordsManager {
        let params =
            BPlusTreeParams::new(2, RecordFactory::new(2, 1)).with_record_capacity(capacity);
        let blocks: Arc<dyn BlockMgr> =
            Arc::new(MemBlockMgr::new("pages", params.record_block_size()));
        RecordsManager::new(blocks, params).unwrap()
    }

    #[test]
    fn page_keeps_order_and_replaces() -> Result<()> {
        let mgr = manager(4);
        let factory = RecordFactory::new(2, 1);
        let mut page = mgr.create()?;
        assert!(page.insert(factory.create_with_value(&[0, 3], &[1])?)?.is_none());
        assert!(page.insert(factory.create_with_value(&[0, 1], &[1])?)?.is_none());
        let old = page.insert(factory.create_with_value(&[0, 3], &[2])?)?;
        assert_eq!(old.and_then(|r| r.value().map(|v| v[0])), Some(1));
        assert_eq!(page.len(), 2);
        assert_eq!(page.max_key().unwrap().key(), &[0, 3]);
        assert!(page.remove(&[0, 2])?.is_none());
        Ok(())
    }

    #[test]
    fn page_round_trips_with_link() -> Result<()> {
        let mgr = manager(3);
        let factory = RecordFactory::new(2, 1);
        let mut page = mgr.create()?;
        let id = page.id();
        page.link = Some(BlockId(12));
        page.insert(factory.create_with_value(&[9, 9], &[7])?)?;
        mgr.put(page)?;

        let back = mgr.get_read(id)?;
        assert_eq!(back.link, Some(BlockId(12)));
        assert_eq!(back.get(&[9, 9]).and_then(|r| r.value()), Some(&[7u8][..]));
        mgr.release(back);
        assert_eq!(mgr.blocks().outstanding(), 0);
        Ok(())
    }

    #[test]
    fn full_page_rejects_insert() -> Result<()> {
        let mgr = manager(2);
        let factory = RecordFactory::new(2, 1);
        let mut page = mgr.create()?;
        page.insert(factory.create(&[0, 1])?)?;
        page.insert(factory.create(&[0, 2])?)?;
        assert!(page.is_full());
        assert!(page.insert(factory.create(&[0, 3])?).unwrap_err().is_invariant());
        Ok(())
    }
}
