use super::{TupleIndex, TupleIter};
use crate::storage::nodeid::NodeId;
use crate::storage::tuple::Tuple;
use crate::types::{Result, StoreError};

/// The same tuple set held in several orderings.
///
/// The first index is the primary: it decides whether a write changed
/// anything and is preferred when orderings tie on weight. Every other index
/// must agree with it.
pub struct TupleTable {
    arity: usize,
    indexes: Vec<Box<dyn TupleIndex>>,
}

impl TupleTable {
    /// Table over `indexes`, all of arity `arity`, primary first.
    pub fn new(arity: usize, indexes: Vec<Box<dyn TupleIndex>>) -> Result<Self> {
        if indexes.is_empty() {
            return Err(StoreError::Invalid("tuple table needs at least one index"));
        }
        for (i, index) in indexes.iter().enumerate() {
            if index.tuple_len() != arity {
                return Err(StoreError::Config(format!(
                    "index {} has arity {}, table has {arity}",
                    index.name(),
                    index.tuple_len()
                )));
            }
            if indexes[..i].iter().any(|other| other.name() == index.name()) {
                return Err(StoreError::Config(format!("index {} listed twice", index.name())));
            }
        }
        Ok(Self { arity, indexes })
    }

    /// Tuple arity.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// All indexes, primary first.
    pub fn indexes(&self) -> impl Iterator<Item = &dyn TupleIndex> + '_ {
        self.indexes.iter().map(|index| index.as_ref())
    }

    /// Index named `name`.
    pub fn index(&self, name: &str) -> Option<&dyn TupleIndex> {
        self.indexes().find(|index| index.name() == name)
    }

    /// Index to answer `pattern` from: the highest weight, the primary on ties.
    pub fn choose_index(&self, pattern: &Tuple<NodeId>) -> &dyn TupleIndex {
        let mut best = self.indexes[0].as_ref();
        let mut best_weight = best.weight(pattern);
        for index in &self.indexes[1..] {
            let weight = index.weight(pattern);
            if weight > best_weight {
                best = index.as_ref();
                best_weight = weight;
            }
        }
        best
    }

    /// Adds `tuple` to every index. Returns false if it was already present.
    pub fn add(&mut self, tuple: &Tuple<NodeId>) -> Result<bool> {
        self.write(tuple, |index, tuple| index.add(tuple))
    }

    /// Deletes `tuple` from every index. Returns false if it was absent.
    pub fn delete(&mut self, tuple: &Tuple<NodeId>) -> Result<bool> {
        self.write(tuple, |index, tuple| index.delete(tuple))
    }

    fn write<F>(&mut self, tuple: &Tuple<NodeId>, mut op: F) -> Result<bool>
    where
        F: FnMut(&mut dyn TupleIndex, &Tuple<NodeId>) -> Result<bool>,
    {
        let (primary, rest) = self.split()?;
        if !op(&mut *primary, tuple)? {
            return Ok(false);
        }
        for index in rest {
            if !op(index.as_mut(), tuple)? {
                return Err(StoreError::invariant(format!(
                    "index {} out of step with {} at {tuple}",
                    index.name(),
                    primary.name()
                )));
            }
        }
        Ok(true)
    }

    fn split(&mut self) -> Result<(&mut dyn TupleIndex, &mut [Box<dyn TupleIndex>])> {
        let (primary, rest) = self
            .indexes
            .split_first_mut()
            .ok_or(StoreError::Invalid("tuple table needs at least one index"))?;
        Ok((primary.as_mut(), rest))
    }

    /// Tuples matching `pattern`, from the best index for it.
    pub fn find(&self, pattern: &Tuple<NodeId>) -> Result<TupleIter<'_>> {
        let index = self.choose_index(pattern);
        tracing::trace!(
            target: "tuplestore::tuple_index",
            index = index.name(),
            %pattern,
            "chose index"
        );
        index.find(pattern)
    }

    /// Every tuple, in primary order.
    pub fn all(&self) -> Result<TupleIter<'_>> {
        self.indexes[0].all()
    }

    /// Replaces the contents with `tuples`: the primary is loaded first and
    /// every other index is rebuilt from it. Returns the distinct tuple count.
    pub fn bulk_load(&mut self, tuples: &mut dyn Iterator<Item = Result<Tuple<NodeId>>>) -> Result<u64> {
        let (primary, rest) = self.split()?;
        let count = primary.replace_all(tuples)?;
        for index in rest {
            let rebuilt = index.replace_all(&mut primary.all()?)?;
            if rebuilt != count {
                return Err(StoreError::invariant(format!(
                    "index {} loaded {rebuilt} tuples, primary {count}",
                    index.name()
                )));
            }
        }
        tracing::debug!(
            target: "tuplestore::tuple_index",
            indexes = self.indexes.len(),
            tuples = count,
            "bulk loaded tuple table"
        );
        Ok(count)
    }

    /// Number of tuples.
    pub fn size(&self) -> Result<u64> {
        self.indexes[0].size()
    }

    /// True when no tuple is stored.
    pub fn is_empty(&self) -> Result<bool> {
        self.indexes[0].is_empty()
    }

    /// Empties every index.
    pub fn clear(&mut self) -> Result<()> {
        for index in &mut self.indexes {
            index.clear()?;
        }
        Ok(())
    }

    /// Flushes every index.
    pub fn sync(&self) -> Result<()> {
        for index in &self.indexes {
            index.sync()?;
        }
        Ok(())
    }

    /// Flushes and releases every index.
    pub fn close(&self) -> Result<()> {
        for index in &self.indexes {
            index.close()?;
        }
        Ok(())
    }
}
