//! Fixed-length binary records and the factory that shapes them.

use std::{cmp::Ordering, fmt, hash};

use smallvec::SmallVec;

use crate::storage::colmap::ColumnMap;
use crate::storage::nodeid::NodeId;
use crate::storage::tuple::Tuple;
use crate::types::{Result, StoreError};

/// A key plus an optional value, both of fixed length.
///
/// Equality, ordering and hashing look at the key only; ordering is unsigned
/// lexicographic on the key bytes.
#[derive(Clone)]
pub struct Record {
    key: Box<[u8]>,
    value: Option<Box<[u8]>>,
}

impl Record {
    /// Key bytes.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Value bytes, if the record carries a value.
    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// True when the value bytes of `self` and `other` are equal.
    pub fn same_value(&self, other: &Record) -> bool {
        self.value == other.value
    }

    /// True when both key and value are equal.
    pub fn identical(&self, other: &Record) -> bool {
        self.key == other.key && self.value == other.value
    }

    /// Copy of this record without its value.
    pub fn key_only(&self) -> Record {
        Record {
            key: self.key.clone(),
            value: None,
        }
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Record {}

impl PartialOrd for Record {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Record {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl hash::Hash for Record {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.key))?;
        if let Some(value) = &self.value {
            write!(f, "={}", hex::encode(value))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record[{self}]")
    }
}

/// Shapes records of one key length and value length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RecordFactory {
    key_len: usize,
    value_len: usize,
}

impl RecordFactory {
    /// Factory for `key_len`-byte keys and `value_len`-byte values (0 for none).
    pub fn new(key_len: usize, value_len: usize) -> Self {
        Self { key_len, value_len }
    }

    /// Key-only factory for tuples of `arity` node ids.
    pub fn for_tuples(arity: usize) -> Self {
        Self::new(arity * NodeId::SIZE, 0)
    }

    /// Key length in bytes.
    pub fn key_len(&self) -> usize {
        self.key_len
    }

    /// Value length in bytes.
    pub fn value_len(&self) -> usize {
        self.value_len
    }

    /// True when records carry values.
    pub fn has_value(&self) -> bool {
        self.value_len > 0
    }

    /// Bytes one full record occupies in a record page.
    pub fn record_len(&self) -> usize {
        self.key_len + self.value_len
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.key_len {
            return Err(StoreError::KeyLength {
                expected: self.key_len,
                actual: key.len(),
            });
        }
        Ok(())
    }

    /// Rejects a record whose value does not fit this factory. Key-only
    /// records pass; their value is stored zero-filled.
    pub fn check_value(&self, record: &Record) -> Result<()> {
        match record.value() {
            Some(value) if value.len() != self.value_len => Err(StoreError::ValueLength {
                expected: self.value_len,
                actual: value.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Record for `key`; the value, if this factory has one, is zero-filled.
    pub fn create(&self, key: &[u8]) -> Result<Record> {
        self.check_key(key)?;
        Ok(Record {
            key: key.into(),
            value: self
                .has_value()
                .then(|| vec![0u8; self.value_len].into_boxed_slice()),
        })
    }

    /// Record for `key` and `value`.
    pub fn create_with_value(&self, key: &[u8], value: &[u8]) -> Result<Record> {
        self.check_key(key)?;
        if value.len() != self.value_len {
            return Err(StoreError::ValueLength {
                expected: self.value_len,
                actual: value.len(),
            });
        }
        Ok(Record {
            key: key.into(),
            value: self.has_value().then(|| value.into()),
        })
    }

    /// Record for a key without its value, as held by tree nodes.
    pub fn create_key(&self, key: &[u8]) -> Result<Record> {
        self.check_key(key)?;
        Ok(Record {
            key: key.into(),
            value: None,
        })
    }

    /// Zero-filled key with no value, the lowest possible key.
    pub fn create_key_only(&self) -> Record {
        Record {
            key: vec![0u8; self.key_len].into_boxed_slice(),
            value: None,
        }
    }

    /// Key for a natural-order tuple laid out in `map` order.
    pub fn record_for_tuple(&self, tuple: &Tuple<NodeId>, map: &ColumnMap) -> Result<Record> {
        if tuple.len() * NodeId::SIZE != self.key_len {
            return Err(StoreError::KeyLength {
                expected: self.key_len,
                actual: tuple.len() * NodeId::SIZE,
            });
        }
        let physical = map.map(tuple)?;
        let mut key: SmallVec<[u8; 32]> = SmallVec::from_elem(0, self.key_len);
        for (slot, id) in physical.iter().enumerate() {
            id.write_to(&mut key, slot * NodeId::SIZE);
        }
        self.create(&key)
    }

    /// Natural-order tuple for a record stored in `map` order.
    pub fn tuple_for_record(&self, record: &Record, map: &ColumnMap) -> Result<Tuple<NodeId>> {
        self.check_key(record.key())?;
        let arity = self.key_len / NodeId::SIZE;
        if arity != map.len() || arity * NodeId::SIZE != self.key_len {
            return Err(StoreError::Invalid("record key does not hold a tuple of the map's arity"));
        }
        let mut slots: SmallVec<[NodeId; 4]> = SmallVec::new();
        for slot in 0..arity {
            slots.push(NodeId::read_from(record.key(), slot * NodeId::SIZE)?);
        }
        map.unmap(&Tuple::from_slice(&slots)?)
    }

    /// Writes `record` (key then value) into `dst[..record_len]`.
    pub fn write_record(&self, record: &Record, dst: &mut [u8]) -> Result<()> {
        self.check_key(record.key())?;
        self.check_value(record)?;
        let dst = dst
            .get_mut(..self.record_len())
            .ok_or(StoreError::Invalid("record slot too small"))?;
        dst[..self.key_len].copy_from_slice(record.key());
        match record.value() {
            Some(value) => dst[self.key_len..].copy_from_slice(value),
            None => dst[self.key_len..].fill(0),
        }
        Ok(())
    }

    /// Reads a full record from `src[..record_len]`.
    pub fn read_record(&self, src: &[u8]) -> Result<Record> {
        let src = src
            .get(..self.record_len())
            .ok_or(StoreError::Corruption("record slot truncated"))?;
        let (key, value) = src.split_at(self.key_len);
        Ok(Record {
            key: key.into(),
            value: self.has_value().then(|| value.into()),
        })
    }

    /// Reads a key-only record from `src[..key_len]`.
    pub fn read_key(&self, src: &[u8]) -> Result<Record> {
        let key = src
            .get(..self.key_len)
            .ok_or(StoreError::Corruption("key slot truncated"))?;
        Ok(Record {
            key: key.into(),
            value: None,
        })
    }
}
