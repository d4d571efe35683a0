use smallvec::SmallVec;

use super::{leading_run, TupleIndex, TupleIter};
use crate::storage::colmap::ColumnMap;
use crate::storage::nodeid::NodeId;
use crate::storage::range_index::RangeIndex;
use crate::storage::record::{Record, RecordFactory};
use crate::storage::tuple::Tuple;
use crate::types::{Result, StoreError};

/// Which scans a lookup may fall back to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanPolicy {
    /// Allow scanning a key prefix and filtering on bound slots past a wildcard.
    pub partial_scan: bool,
    /// Allow scanning the whole index when the first physical slot is a wildcard.
    pub full_scan: bool,
}

impl ScanPolicy {
    /// Point lookups and exact prefix ranges only.
    pub const INDEX_ONLY: ScanPolicy = ScanPolicy {
        partial_scan: false,
        full_scan: false,
    };
    /// Prefix ranges with a residual filter, no full scans.
    pub const PARTIAL: ScanPolicy = ScanPolicy {
        partial_scan: true,
        full_scan: false,
    };
    /// Anything.
    pub const FULL: ScanPolicy = ScanPolicy {
        partial_scan: true,
        full_scan: true,
    };
}

/// A [`TupleIndex`] over a [`RangeIndex`] of key-only records.
///
/// Tuple `t` is stored as the record whose key is `map(t)` with each node id
/// written big-endian, so key order is physical tuple order.
pub struct TupleIndexRecord<R> {
    map: ColumnMap,
    factory: RecordFactory,
    index: R,
}

impl<R: RangeIndex> TupleIndexRecord<R> {
    /// Wraps `index`, whose keys must be `map.len()` node ids wide.
    pub fn new(map: ColumnMap, index: R) -> Result<Self> {
        let factory = index.record_factory();
        let expected = map.len() * NodeId::SIZE;
        if factory.key_len() != expected {
            return Err(StoreError::KeyLength {
                expected,
                actual: factory.key_len(),
            });
        }
        Ok(Self {
            factory: RecordFactory::for_tuples(map.len()),
            map,
            index,
        })
    }

    /// The underlying range index.
    pub fn range_index(&self) -> &R {
        &self.index
    }

    /// Unwraps the underlying range index.
    pub fn into_inner(self) -> R {
        self.index
    }

    /// Resolves `pattern` under `policy`.
    ///
    /// `Ok(None)` means this index cannot answer without a scan the policy
    /// forbids; a caller may try another ordering. `Ok(Some(iter))` is the
    /// answer, possibly empty.
    pub fn find_with(&self, pattern: &Tuple<NodeId>, policy: ScanPolicy) -> Result<Option<TupleIter<'_>>> {
        self.check_arity(pattern)?;
        let physical = self.map.map(pattern)?;
        let leading = leading_run(&physical);
        let arity = physical.len();

        if leading == arity {
            let key = self.factory.record_for_tuple(pattern, &self.map)?;
            let found = self.index.contains(&key)?;
            let iter: TupleIter<'_> = if found {
                Box::new(std::iter::once(Ok(*pattern)))
            } else {
                Box::new(std::iter::empty())
            };
            return Ok(Some(iter));
        }

        let residual = physical.iter().skip(leading).any(|id| !id.is_any());
        if leading == 0 && !policy.full_scan {
            return Ok(None);
        }
        if residual && !policy.partial_scan {
            return Ok(None);
        }
        tracing::trace!(
            target: "tuplestore::tuple_index",
            index = self.map.label(),
            %pattern,
            leading,
            residual,
            "resolving pattern"
        );

        let records = if leading == 0 {
            self.index.iter_all()?
        } else {
            let (min, max) = self.prefix_bounds(&physical, leading)?;
            self.index.iter_range(Some(&min), max.as_ref())?
        };
        let factory = self.factory;
        let map = self.map.clone();
        let tuples = records.map(move |record| record.and_then(|r| factory.tuple_for_record(&r, &map)));
        let iter: TupleIter<'_> = if residual {
            let pattern = *pattern;
            Box::new(tuples.filter(move |tuple| match tuple {
                Ok(tuple) => tuple.matches(&pattern),
                Err(_) => true,
            }))
        } else {
            Box::new(tuples)
        };
        Ok(Some(iter))
    }

    /// Answers only with point lookups and exact prefix ranges.
    pub fn find_by_index(&self, pattern: &Tuple<NodeId>) -> Result<Option<TupleIter<'_>>> {
        self.find_with(pattern, ScanPolicy::INDEX_ONLY)
    }

    /// Also accepts a filtered prefix scan.
    pub fn find_or_partial_scan(&self, pattern: &Tuple<NodeId>) -> Result<Option<TupleIter<'_>>> {
        self.find_with(pattern, ScanPolicy::PARTIAL)
    }

    /// Accepts any scan.
    pub fn find_or_scan(&self, pattern: &Tuple<NodeId>) -> Result<Option<TupleIter<'_>>> {
        self.find_with(pattern, ScanPolicy::FULL)
    }

    /// Replaces the contents with the tuples of `source`, re-sorted into this
    /// index's order.
    pub fn rebuild_from(&mut self, source: &dyn TupleIndex) -> Result<u64> {
        let count = self.replace_all(&mut source.all()?)?;
        tracing::debug!(
            target: "tuplestore::tuple_index",
            index = self.map.label(),
            source = source.name(),
            tuples = count,
            "rebuilt index"
        );
        Ok(count)
    }

    fn check_arity(&self, tuple: &Tuple<NodeId>) -> Result<()> {
        if tuple.len() != self.map.len() {
            return Err(StoreError::Invalid("tuple arity differs from index"));
        }
        Ok(())
    }

    fn key_for(&self, tuple: &Tuple<NodeId>) -> Result<Record> {
        self.check_arity(tuple)?;
        if !tuple.is_concrete() {
            return Err(StoreError::Invalid("cannot store a wildcard"));
        }
        self.factory.record_for_tuple(tuple, &self.map)
    }

    /// Scan bounds for the first `leading` physical slots: the prefix padded
    /// with zeros, and the next prefix in key order (none past the top).
    fn prefix_bounds(&self, physical: &Tuple<NodeId>, leading: usize) -> Result<(Record, Option<Record>)> {
        let slots = physical.as_slice();
        let mut key: SmallVec<[u8; 32]> = SmallVec::from_elem(0, self.factory.key_len());
        for (slot, id) in slots[..leading].iter().enumerate() {
            id.write_to(&mut key, slot * NodeId::SIZE);
        }
        let min = self.factory.create_key(&key)?;

        let mut max = None;
        for slot in (0..leading).rev() {
            if let Some(next) = slots[slot].successor() {
                key[(slot + 1) * NodeId::SIZE..].fill(0);
                next.write_to(&mut key, slot * NodeId::SIZE);
                max = Some(self.factory.create_key(&key)?);
                break;
            }
        }
        Ok((min, max))
    }
}

impl<R: RangeIndex> TupleIndex for TupleIndexRecord<R> {
    fn name(&self) -> &str {
        self.map.label()
    }

    fn column_map(&self) -> &ColumnMap {
        &self.map
    }

    fn add(&mut self, tuple: &Tuple<NodeId>) -> Result<bool> {
        let key = self.key_for(tuple)?;
        self.index.add(key)
    }

    fn delete(&mut self, tuple: &Tuple<NodeId>) -> Result<bool> {
        self.check_arity(tuple)?;
        if !tuple.is_concrete() {
            return Ok(false);
        }
        let key = self.factory.record_for_tuple(tuple, &self.map)?;
        self.index.delete(&key)
    }

    fn find(&self, pattern: &Tuple<NodeId>) -> Result<TupleIter<'_>> {
        self.find_or_scan(pattern)?
            .ok_or_else(|| StoreError::invariant("unrestricted lookup refused to scan"))
    }

    fn all(&self) -> Result<TupleIter<'_>> {
        let factory = self.factory;
        let map = self.map.clone();
        Ok(Box::new(self.index.iter_all()?.map(move |record| {
            record.and_then(|r| factory.tuple_for_record(&r, &map))
        })))
    }

    fn weight(&self, pattern: &Tuple<NodeId>) -> usize {
        match self.map.map(pattern) {
            Ok(physical) => leading_run(&physical),
            Err(_) => 0,
        }
    }

    fn replace_all(&mut self, tuples: &mut dyn Iterator<Item = Result<Tuple<NodeId>>>) -> Result<u64> {
        let mut keys = Vec::new();
        for tuple in tuples {
            keys.push(self.key_for(&tuple?)?);
        }
        keys.sort_unstable();
        keys.dedup();
        let count = self.index.replace_sorted(&mut keys.into_iter().map(Ok::<_, StoreError>))?;
        tracing::debug!(
            target: "tuplestore::tuple_index",
            index = self.map.label(),
            tuples = count,
            "loaded sorted tuples"
        );
        Ok(count)
    }

    fn size(&self) -> Result<u64> {
        self.index.size()
    }

    fn is_empty(&self) -> Result<bool> {
        self.index.is_empty()
    }

    fn check_integrity(&self) -> Result<u64> {
        self.index.check_integrity()
    }

    fn clear(&mut self) -> Result<()> {
        self.index.clear()
    }

    fn sync(&self) -> Result<()> {
        self.index.sync()
    }

    fn close(&self) -> Result<()> {
        self.index.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::btree::{BPlusTree, BPlusTreeParams};

    fn id(v: i64) -> NodeId {
        NodeId::create(v)
    }

    fn t(s: i64, p: i64, o: i64) -> Tuple<NodeId> {
        Tuple::triple(id(s), id(p), id(o))
    }

    fn pat(s: Option<i64>, p: Option<i64>, o: Option<i64>) -> Tuple<NodeId> {
        let slot = |v: Option<i64>| v.map_or(NodeId::ANY, id);
        Tuple::triple(slot(s), slot(p), slot(o))
    }

    fn index(label: &str) -> Result<TupleIndexRecord<BPlusTree>> {
        let params = BPlusTreeParams::new(2, RecordFactory::for_tuples(3)).with_record_capacity(4);
        TupleIndexRecord::new(ColumnMap::from_name(label)?, BPlusTree::in_memory(params)?)
    }

    fn scenario(label: &str) -> Result<TupleIndexRecord<BPlusTree>> {
        let mut idx = index(label)?;
        for tuple in [t(1, 2, 3), t(1, 2, 4), t(1, 3, 5)] {
            assert!(idx.add(&tuple)?);
        }
        Ok(idx)
    }

    fn collect(iter: TupleIter<'_>) -> Result<Vec<Tuple<NodeId>>> {
        iter.collect()
    }

    #[test]
    fn prefix_and_filtered_lookups() -> Result<()> {
        let idx = scenario("SPO")?;
        assert_eq!(
            collect(idx.find(&pat(Some(1), Some(2), None))?)?,
            vec![t(1, 2, 3), t(1, 2, 4)]
        );
        assert_eq!(collect(idx.find(&pat(Some(1), None, Some(5)))?)?, vec![t(1, 3, 5)]);
        Ok(())
    }

    #[test]
    fn wildcard_pattern_returns_key_order() -> Result<()> {
        let idx = scenario("SPO")?;
        assert_eq!(
            collect(idx.find(&pat(None, None, None))?)?,
            vec![t(1, 2, 3), t(1, 2, 4), t(1, 3, 5)]
        );
        Ok(())
    }

    #[test]
    fn duplicate_add_is_a_no_op() -> Result<()> {
        let mut idx = index("SPO")?;
        assert!(idx.add(&t(1, 2, 3))?);
        assert!(!idx.add(&t(1, 2, 3))?);
        assert_eq!(idx.size()?, 1);
        Ok(())
    }

    #[test]
    fn delete_reports_presence() -> Result<()> {
        let mut idx = scenario("SPO")?;
        assert!(idx.delete(&t(1, 3, 5))?);
        assert!(collect(idx.find(&pat(Some(1), Some(3), None))?)?.is_empty());
        assert!(!idx.delete(&t(9, 9, 9))?);
        assert_eq!(idx.size()?, 2);
        Ok(())
    }

    #[test]
    fn fully_bound_pattern_is_a_point_lookup() -> Result<()> {
        let idx = scenario("POS")?;
        assert_eq!(collect(idx.find_by_index(&t(1, 2, 4))?.unwrap())?, vec![t(1, 2, 4)]);
        assert!(collect(idx.find_by_index(&t(1, 2, 5))?.unwrap())?.is_empty());
        Ok(())
    }

    #[test]
    fn policy_separates_cannot_answer_from_empty() -> Result<()> {
        let idx = scenario("SPO")?;
        // Leading wildcard needs a full scan.
        assert!(idx.find_by_index(&pat(None, Some(2), None))?.is_none());
        assert!(idx.find_or_partial_scan(&pat(None, Some(2), None))?.is_none());
        assert_eq!(collect(idx.find_or_scan(&pat(None, Some(2), None))?.unwrap())?.len(), 2);

        // Bound slot after a wildcard needs a filtered scan.
        assert!(idx.find_by_index(&pat(Some(1), None, Some(5)))?.is_none());
        assert_eq!(
            collect(idx.find_or_partial_scan(&pat(Some(1), None, Some(5)))?.unwrap())?,
            vec![t(1, 3, 5)]
        );

        // Answerable, but nothing matches.
        let empty = idx.find_by_index(&pat(Some(9), None, None))?;
        assert!(collect(empty.unwrap())?.is_empty());
        Ok(())
    }

    #[test]
    fn permuted_index_answers_in_natural_order() -> Result<()> {
        let idx = scenario("OSP")?;
        let found = collect(idx.find_by_index(&pat(None, None, Some(4)))?.unwrap())?;
        assert_eq!(found, vec![t(1, 2, 4)]);
        // Physical order is O, S, P.
        assert_eq!(
            collect(idx.all()?)?,
            vec![t(1, 2, 3), t(1, 2, 4), t(1, 3, 5)]
        );
        assert_eq!(idx.weight(&pat(Some(1), None, Some(4))), 2);
        assert_eq!(idx.weight(&pat(Some(1), Some(2), None)), 0);
        Ok(())
    }

    #[test]
    fn weight_counts_leading_bound_slots() -> Result<()> {
        let idx = index("SPO")?;
        assert_eq!(idx.weight(&pat(None, None, None)), 0);
        assert_eq!(idx.weight(&pat(Some(1), None, Some(3))), 1);
        assert_eq!(idx.weight(&pat(Some(1), Some(2), None)), 2);
        assert_eq!(idx.weight(&pat(Some(1), Some(2), Some(3))), 3);
        Ok(())
    }

    #[test]
    fn wildcards_are_never_stored() -> Result<()> {
        let mut idx = index("SPO")?;
        let err = idx.add(&pat(Some(1), None, Some(3))).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert!(!idx.delete(&pat(Some(1), None, Some(3)))?);
        assert!(idx.is_empty()?);
        Ok(())
    }

    #[test]
    fn arity_is_checked() -> Result<()> {
        let idx = index("SPO")?;
        let quad = Tuple::quad(id(1), id(2), id(3), id(4));
        assert!(idx.find(&quad).is_err());
        assert_eq!(idx.weight(&quad), 0);
        Ok(())
    }

    #[test]
    fn prefix_scan_at_the_top_of_the_key_space() -> Result<()> {
        let top = NodeId::from_raw(u64::MAX);
        let mut idx = index("SPO")?;
        idx.add(&Tuple::triple(top, id(1), id(2)))?;
        idx.add(&Tuple::triple(top, top, id(3)))?;
        idx.add(&Tuple::triple(id(5), top, id(1)))?;
        idx.add(&Tuple::triple(id(6), id(0), id(0)))?;

        let found = collect(idx.find(&Tuple::triple(top, NodeId::ANY, NodeId::ANY))?)?;
        assert_eq!(found.len(), 2);
        let found = collect(idx.find(&Tuple::triple(id(5), top, NodeId::ANY))?)?;
        assert_eq!(found, vec![Tuple::triple(id(5), top, id(1))]);
        Ok(())
    }

    #[test]
    fn replace_all_sorts_and_deduplicates() -> Result<()> {
        let mut idx = index("POS")?;
        idx.add(&t(7, 7, 7))?;
        let mut input = vec![t(3, 1, 1), t(1, 2, 3), t(3, 1, 1), t(2, 1, 9)]
            .into_iter()
            .map(Ok::<_, StoreError>);
        assert_eq!(idx.replace_all(&mut input)?, 3);
        assert_eq!(idx.range_index().verify()?, 3);
        assert_eq!(
            collect(idx.all()?)?,
            vec![t(3, 1, 1), t(2, 1, 9), t(1, 2, 3)]
        );
        Ok(())
    }

    #[test]
    fn rebuild_from_another_ordering() -> Result<()> {
        let mut primary = index("SPO")?;
        for s in 0..30 {
            primary.add(&t(s, s % 4, 100 - s))?;
        }
        let mut secondary = index("POS")?;
        assert_eq!(secondary.rebuild_from(&primary)?, 30);
        let by_p = collect(secondary.find_by_index(&pat(None, Some(2), None))?.unwrap())?;
        assert_eq!(by_p.len(), 7);
        assert!(by_p.iter().all(|tuple| tuple.get(1) == Some(&id(2))));
        Ok(())
    }

    #[test]
    fn abandoned_scans_release_pages() -> Result<()> {
        let mut idx = index("SPO")?;
        for s in 0..40 {
            idx.add(&t(s, 1, 1))?;
        }
        {
            let mut iter = idx.find(&pat(None, Some(1), None))?;
            assert!(iter.next().is_some());
            assert_eq!(idx.range_index().outstanding(), 1);
        }
        assert_eq!(idx.range_index().outstanding(), 0);
        Ok(())
    }

    #[test]
    fn clear_empties_the_index() -> Result<()> {
        let mut idx = scenario("SPO")?;
        idx.clear()?;
        assert_eq!(idx.size()?, 0);
        assert!(idx.is_empty()?);
        assert!(collect(idx.find(&pat(None, None, None))?)?.is_empty());
        Ok(())
    }

    #[test]
    fn mismatched_key_width_is_rejected() -> Result<()> {
        let params = BPlusTreeParams::new(2, RecordFactory::for_tuples(4));
        let tree = BPlusTree::in_memory(params)?;
        assert!(TupleIndexRecord::new(ColumnMap::from_name("SPO")?, tree).is_err());
        Ok(())
    }
}
