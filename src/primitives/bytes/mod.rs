#![forbid(unsafe_code)]
//! Fixed-width big-endian helpers and a capacity-checked vector.

use crate::types::{Result, StoreError};

pub mod ord {
    //! Big-endian accessors for fixed block layouts.
    //!
    //! Every getter checks the source length and reports a short buffer as
    //! corruption instead of panicking.

    use crate::types::{Result, StoreError};

    /// Writes `v` big-endian at `dst[off..off + 8]`.
    pub fn put_u64_be(dst: &mut [u8], off: usize, v: u64) {
        dst[off..off + 8].copy_from_slice(&v.to_be_bytes());
    }

    /// Reads a big-endian u64 at `src[off..off + 8]`.
    pub fn get_u64_be(src: &[u8], off: usize) -> Result<u64> {
        let bytes: [u8; 8] = src
            .get(off..off + 8)
            .and_then(|s| s.try_into().ok())
            .ok_or(StoreError::Corruption("u64 field truncated"))?;
        Ok(u64::from_be_bytes(bytes))
    }

    /// Writes `v` big-endian at `dst[off..off + 4]`.
    pub fn put_u32_be(dst: &mut [u8], off: usize, v: u32) {
        dst[off..off + 4].copy_from_slice(&v.to_be_bytes());
    }

    /// Reads a big-endian u32 at `src[off..off + 4]`.
    pub fn get_u32_be(src: &[u8], off: usize) -> Result<u32> {
        let bytes: [u8; 4] = src
            .get(off..off + 4)
            .and_then(|s| s.try_into().ok())
            .ok_or(StoreError::Corruption("u32 field truncated"))?;
        Ok(u32::from_be_bytes(bytes))
    }

    /// Writes `v` big-endian at `dst[off..off + 4]`.
    pub fn put_i32_be(dst: &mut [u8], off: usize, v: i32) {
        dst[off..off + 4].copy_from_slice(&v.to_be_bytes());
    }

    /// Reads a big-endian i32 at `src[off..off + 4]`.
    pub fn get_i32_be(src: &[u8], off: usize) -> Result<i32> {
        get_u32_be(src, off).map(|v| v as i32)
    }

    /// Writes `v` big-endian at `dst[off..off + 2]`.
    pub fn put_u16_be(dst: &mut [u8], off: usize, v: u16) {
        dst[off..off + 2].copy_from_slice(&v.to_be_bytes());
    }

    /// Reads a big-endian u16 at `src[off..off + 2]`.
    pub fn get_u16_be(src: &[u8], off: usize) -> Result<u16> {
        let bytes: [u8; 2] = src
            .get(off..off + 2)
            .and_then(|s| s.try_into().ok())
            .ok_or(StoreError::Corruption("u16 field truncated"))?;
        Ok(u16::from_be_bytes(bytes))
    }
}

/// A vector that refuses to grow past a fixed capacity.
///
/// Node record and pointer buffers are sized by the tree order; overfilling
/// one is a structural bug, so `push`/`insert` fail at the offending call
/// with [`StoreError::Invariant`] instead of letting a later consistency
/// check discover the damage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundedVec<T> {
    items: Vec<T>,
    capacity: usize,
    what: &'static str,
}

impl<T> BoundedVec<T> {
    /// Creates an empty buffer; `what` names it in error messages.
    pub fn new(capacity: usize, what: &'static str) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            what,
        }
    }

    /// Wraps existing items, failing if there are more than `capacity`.
    pub fn from_vec(items: Vec<T>, capacity: usize, what: &'static str) -> Result<Self> {
        if items.len() > capacity {
            return Err(StoreError::invariant(format!(
                "{what} holds {} items, capacity {capacity}",
                items.len()
            )));
        }
        Ok(Self {
            items,
            capacity,
            what,
        })
    }

    /// Maximum number of items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when no items are held.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True when another push would fail.
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    fn overflow(&self) -> StoreError {
        StoreError::invariant(format!("{} overfull (capacity {})", self.what, self.capacity))
    }

    fn out_of_range(&self, idx: usize) -> StoreError {
        StoreError::invariant(format!(
            "{} index {idx} out of range (len {})",
            self.what,
            self.items.len()
        ))
    }

    /// Appends `item`.
    pub fn push(&mut self, item: T) -> Result<()> {
        if self.is_full() {
            return Err(self.overflow());
        }
        self.items.push(item);
        Ok(())
    }

    /// Inserts `item` at `idx`, shifting later items up.
    pub fn insert(&mut self, idx: usize, item: T) -> Result<()> {
        if self.is_full() {
            return Err(self.overflow());
        }
        if idx > self.items.len() {
            return Err(self.out_of_range(idx));
        }
        self.items.insert(idx, item);
        Ok(())
    }

    /// Removes and returns the item at `idx`.
    pub fn remove(&mut self, idx: usize) -> Result<T> {
        if idx >= self.items.len() {
            return Err(self.out_of_range(idx));
        }
        Ok(self.items.remove(idx))
    }

    /// Replaces the item at `idx`, returning the old one.
    pub fn set(&mut self, idx: usize, item: T) -> Result<T> {
        match self.items.get_mut(idx) {
            Some(slot) => Ok(std::mem::replace(slot, item)),
            None => Err(self.out_of_range(idx)),
        }
    }

    /// Removes the last item.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Item at `idx`.
    pub fn get(&self, idx: usize) -> Option<&T> {
        self.items.get(idx)
    }

    /// Item at `idx`, or an invariant error naming this buffer.
    pub fn at(&self, idx: usize) -> Result<&T> {
        self.items.get(idx).ok_or_else(|| self.out_of_range(idx))
    }

    /// First item.
    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    /// Last item.
    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    /// All items as a slice.
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Iterates over the items.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Splits off `[at..]` into a new buffer with the same capacity.
    pub fn split_off(&mut self, at: usize) -> Result<Self> {
        if at > self.items.len() {
            return Err(self.out_of_range(at));
        }
        Ok(Self {
            items: self.items.split_off(at),
            capacity: self.capacity,
            what: self.what,
        })
    }

    /// Moves every item of `other` to the end of `self`.
    pub fn append(&mut self, other: &mut BoundedVec<T>) -> Result<()> {
        if self.items.len() + other.items.len() > self.capacity {
            return Err(self.overflow());
        }
        self.items.append(&mut other.items);
        Ok(())
    }

    /// Drops every item.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Consumes the buffer.
    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<'a, T> IntoIterator for &'a BoundedVec<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u64_roundtrip_preserves_order() {
        let mut a = [0u8; 8];
        let mut b = [0u8; 8];
        ord::put_u64_be(&mut a, 0, 255);
        ord::put_u64_be(&mut b, 0, 256);
        assert!(a < b);
        assert_eq!(ord::get_u64_be(&a, 0).unwrap(), 255);
    }

    #[test]
    fn short_buffer_is_corruption() {
        let buf = [0u8; 3];
        assert!(matches!(
            ord::get_u32_be(&buf, 0),
            Err(StoreError::Corruption(_))
        ));
        assert!(ord::get_u16_be(&buf, 2).is_err());
    }

    #[test]
    fn i32_roundtrip_keeps_sign() {
        let mut buf = [0u8; 4];
        ord::put_i32_be(&mut buf, 0, -1);
        assert_eq!(ord::get_i32_be(&buf, 0).unwrap(), -1);
    }

    #[test]
    fn push_past_capacity_fails_fast() {
        let mut v = BoundedVec::new(2, "ptr buffer");
        v.push(1).unwrap();
        v.push(2).unwrap();
        assert!(v.is_full());
        let err = v.push(3).unwrap_err();
        assert!(err.to_string().contains("ptr buffer overfull"), "{err}");
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn insert_and_remove_shift_items() {
        let mut v = BoundedVec::new(4, "records");
        v.push(10).unwrap();
        v.push(30).unwrap();
        v.insert(1, 20).unwrap();
        assert_eq!(v.as_slice(), &[10, 20, 30]);
        assert_eq!(v.remove(0).unwrap(), 10);
        assert!(v.remove(5).is_err());
        assert_eq!(v.set(0, 21).unwrap(), 20);
        assert_eq!(v.as_slice(), &[21, 30]);
    }

    #[test]
    fn split_and_append_respect_capacity() {
        let mut left = BoundedVec::from_vec(vec![1, 2, 3, 4], 4, "records").unwrap();
        let mut right = left.split_off(2).unwrap();
        assert_eq!(left.as_slice(), &[1, 2]);
        assert_eq!(right.as_slice(), &[3, 4]);
        left.append(&mut right).unwrap();
        assert_eq!(left.as_slice(), &[1, 2, 3, 4]);
        assert!(right.is_empty());

        let mut extra = BoundedVec::from_vec(vec![5], 4, "records").unwrap();
        assert!(left.append(&mut extra).is_err());
        assert!(BoundedVec::from_vec(vec![1, 2, 3], 2, "records").is_err());
    }
}
