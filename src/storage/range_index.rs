//! Ordered record collections.

use crate::storage::record::{Record, RecordFactory};
use crate::types::{Result, StoreError};

/// Lazy, finite iterator over records in key order.
pub type RecordIter<'a> = Box<dyn Iterator<Item = Result<Record>> + Send + 'a>;

/// An ordered set of fixed-length records keyed on the full key.
///
/// Reads take `&self`; writes take `&mut self`, so one writer excludes readers
/// of the same handle.
pub trait RangeIndex: Send + Sync {
    /// Shape of the records held.
    fn record_factory(&self) -> RecordFactory;

    /// Stored record whose key equals `key`'s key.
    fn find(&self, key: &Record) -> Result<Option<Record>>;

    /// True if a record with `key`'s key is stored.
    fn contains(&self, key: &Record) -> Result<bool> {
        Ok(self.find(key)?.is_some())
    }

    /// Records with `min <= key < max`. `None` leaves that end unbounded.
    fn iter_range(&self, min: Option<&Record>, max: Option<&Record>) -> Result<RecordIter<'_>>;

    /// Every record in key order.
    fn iter_all(&self) -> Result<RecordIter<'_>> {
        self.iter_range(None, None)
    }

    /// Inserts `record`, replacing any record with the same key. Returns the replaced record.
    fn insert(&mut self, record: Record) -> Result<Option<Record>>;

    /// Inserts `record`. Returns true if its key was not present.
    fn add(&mut self, record: Record) -> Result<bool> {
        Ok(self.insert(record)?.is_none())
    }

    /// Removes the record with `key`'s key and returns it.
    fn remove(&mut self, key: &Record) -> Result<Option<Record>>;

    /// Removes the record with `key`'s key. Returns true if one was present.
    fn delete(&mut self, key: &Record) -> Result<bool> {
        Ok(self.remove(key)?.is_some())
    }

    /// Smallest stored record.
    fn min_key(&self) -> Result<Option<Record>>;

    /// Largest stored record.
    fn max_key(&self) -> Result<Option<Record>>;

    /// Number of stored records. May scan.
    fn size(&self) -> Result<u64> {
        let mut count = 0u64;
        for record in self.iter_all()? {
            record?;
            count += 1;
        }
        Ok(count)
    }

    /// True when nothing is stored.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.min_key()?.is_none())
    }

    /// Removes every record.
    fn clear(&mut self) -> Result<()>;

    /// Replaces the contents with `records`, which must be strictly ascending.
    /// Returns the number of records loaded.
    fn replace_sorted(&mut self, records: &mut dyn Iterator<Item = Result<Record>>) -> Result<u64> {
        self.clear()?;
        let mut last: Option<Record> = None;
        let mut count = 0u64;
        for record in records {
            let record = record?;
            if last.as_ref().is_some_and(|prev| prev >= &record) {
                return Err(StoreError::invariant(format!(
                    "sorted load out of order at {record}"
                )));
            }
            last = Some(record.key_only());
            self.insert(record)?;
            count += 1;
        }
        Ok(count)
    }

    /// Checks the structure and returns the record count.
    fn check_integrity(&self) -> Result<u64> {
        self.size()
    }

    /// Flushes to stable storage.
    fn sync(&self) -> Result<()>;

    /// Flushes and releases storage.
    fn close(&self) -> Result<()>;
}
