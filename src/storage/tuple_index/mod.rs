#![forbid(unsafe_code)]

//! Query-facing tuple indexes.
//!
//! A [`TupleIndex`] stores one set of tuples in the physical order of its
//! [`ColumnMap`] and answers bound/wildcard patterns against it. Patterns and
//! results are always in natural order; only the stored keys are permuted.

mod index_record;
mod table;

pub use index_record::{ScanPolicy, TupleIndexRecord};
pub use table::TupleTable;

use crate::storage::colmap::ColumnMap;
use crate::storage::nodeid::NodeId;
use crate::storage::tuple::Tuple;
use crate::types::Result;

/// Lazy, finite stream of natural-order tuples. Not restartable.
pub type TupleIter<'a> = Box<dyn Iterator<Item = Result<Tuple<NodeId>>> + Send + 'a>;

/// One physical ordering of a tuple set.
pub trait TupleIndex: Send + Sync {
    /// Index name, the column map label (`"POS"`).
    fn name(&self) -> &str;

    /// Permutation from natural to physical order.
    fn column_map(&self) -> &ColumnMap;

    /// Arity of the stored tuples.
    fn tuple_len(&self) -> usize {
        self.column_map().len()
    }

    /// Stores `tuple`. Returns false if it was already present.
    fn add(&mut self, tuple: &Tuple<NodeId>) -> Result<bool>;

    /// Removes `tuple`. Returns false if it was absent.
    fn delete(&mut self, tuple: &Tuple<NodeId>) -> Result<bool>;

    /// Adds every tuple; returns how many were new.
    fn add_all(&mut self, tuples: &[Tuple<NodeId>]) -> Result<u64> {
        let mut added = 0;
        for tuple in tuples {
            if self.add(tuple)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Deletes every tuple; returns how many were present.
    fn delete_all(&mut self, tuples: &[Tuple<NodeId>]) -> Result<u64> {
        let mut deleted = 0;
        for tuple in tuples {
            if self.delete(tuple)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Tuples matching `pattern`, scanning as much as needed.
    fn find(&self, pattern: &Tuple<NodeId>) -> Result<TupleIter<'_>>;

    /// Every stored tuple in physical order.
    fn all(&self) -> Result<TupleIter<'_>>;

    /// Selectivity hint for `pattern`: the number of leading bound slots in
    /// this index's order. Higher is better.
    fn weight(&self, pattern: &Tuple<NodeId>) -> usize;

    /// Replaces the contents with `tuples`, which may arrive in any order and
    /// may repeat. Returns the number of distinct tuples stored.
    fn replace_all(&mut self, tuples: &mut dyn Iterator<Item = Result<Tuple<NodeId>>>) -> Result<u64>;

    /// Number of stored tuples. May scan.
    fn size(&self) -> Result<u64>;

    /// True when nothing is stored.
    fn is_empty(&self) -> Result<bool>;

    /// Checks the underlying structure and returns the tuple count.
    fn check_integrity(&self) -> Result<u64>;

    /// Removes every tuple.
    fn clear(&mut self) -> Result<()>;

    /// Flushes to stable storage.
    fn sync(&self) -> Result<()>;

    /// Flushes and releases storage.
    fn close(&self) -> Result<()>;
}

/// Number of bound slots before the first wildcard of `physical`.
pub(crate) fn leading_run(physical: &Tuple<NodeId>) -> usize {
    physical.iter().take_while(|id| !id.is_any()).count()
}
