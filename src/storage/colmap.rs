//! Named slot permutations.
//!
//! A `ColumnMap` such as `SPO -> POS` describes how a natural-order tuple is
//! laid out in one physical index. Slot `i` of the physical order holds the
//! natural slot named by letter `i` of the label.

use std::fmt;

use smallvec::SmallVec;

use crate::storage::tuple::Tuple;
use crate::types::{Result, StoreError};

/// Natural slot names for triples.
pub const TRIPLE_PRIMARY: &str = "SPO";
/// Natural slot names for quads.
pub const QUAD_PRIMARY: &str = "GSPO";

type Slots = SmallVec<[usize; 4]>;

/// A permutation between natural and physical slot order.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ColumnMap {
    primary: String,
    label: String,
    /// Natural slot -> physical slot.
    insert_order: Slots,
    /// Physical slot -> natural slot.
    fetch_order: Slots,
}

impl ColumnMap {
    /// Builds the permutation from `primary` (natural order) to `label`.
    pub fn new(primary: &str, label: &str) -> Result<Self> {
        if !matches!(primary.len(), 3 | 4) || !primary.is_ascii() {
            return Err(StoreError::Invalid("column map primary must name 3 or 4 slots"));
        }
        if label.len() != primary.len() || !label.is_ascii() {
            return Err(StoreError::Invalid("column map label length differs from primary"));
        }
        let primary_bytes = primary.as_bytes();
        for (i, b) in primary_bytes.iter().enumerate() {
            if primary_bytes[..i].contains(b) {
                return Err(StoreError::Invalid("column map primary repeats a slot"));
            }
        }
        let mut fetch_order = Slots::new();
        for b in label.bytes() {
            let natural = primary_bytes
                .iter()
                .position(|p| *p == b)
                .ok_or(StoreError::Invalid("column map label names an unknown slot"))?;
            if fetch_order.contains(&natural) {
                return Err(StoreError::Invalid("column map label repeats a slot"));
            }
            fetch_order.push(natural);
        }
        let mut insert_order: Slots = SmallVec::from_elem(0, fetch_order.len());
        for (physical, natural) in fetch_order.iter().enumerate() {
            insert_order[*natural] = physical;
        }
        Ok(Self {
            primary: primary.to_owned(),
            label: label.to_owned(),
            insert_order,
            fetch_order,
        })
    }

    /// Builds the map for an index name, inferring `SPO` or `GSPO` as primary.
    pub fn from_name(label: &str) -> Result<Self> {
        match label.len() {
            3 => Self::new(TRIPLE_PRIMARY, label),
            4 => Self::new(QUAD_PRIMARY, label),
            _ => Err(StoreError::Invalid("index names have three or four letters")),
        }
    }

    /// Physical order name, e.g. `POS`.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Natural order name, `SPO` or `GSPO`.
    pub fn primary(&self) -> &str {
        &self.primary
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.fetch_order.len()
    }

    /// Always false for a constructed map.
    pub fn is_empty(&self) -> bool {
        self.fetch_order.is_empty()
    }

    /// True when physical order equals natural order.
    pub fn is_identity(&self) -> bool {
        self.primary == self.label
    }

    /// Physical position of natural slot `natural`.
    pub fn map_idx(&self, natural: usize) -> usize {
        self.insert_order[natural]
    }

    /// Natural position of physical slot `physical`.
    pub fn unmap_idx(&self, physical: usize) -> usize {
        self.fetch_order[physical]
    }

    /// Value at physical slot `physical` for a natural-order tuple.
    pub fn map_slot<T: Copy>(&self, physical: usize, natural: &Tuple<T>) -> Option<T> {
        natural.get(*self.fetch_order.get(physical)?).copied()
    }

    /// Value at natural slot `natural` for a physical-order tuple.
    pub fn unmap_slot<T: Copy>(&self, natural: usize, physical: &Tuple<T>) -> Option<T> {
        physical.get(*self.insert_order.get(natural)?).copied()
    }

    fn check_len<T>(&self, tuple: &Tuple<T>) -> Result<()> {
        if tuple.len() != self.len() {
            return Err(StoreError::Invalid("tuple arity differs from column map"));
        }
        Ok(())
    }

    /// Natural order to physical order.
    pub fn map<T: Copy>(&self, natural: &Tuple<T>) -> Result<Tuple<T>> {
        self.check_len(natural)?;
        let slots = natural.as_slice();
        let physical: SmallVec<[T; 4]> = self.fetch_order.iter().map(|n| slots[*n]).collect();
        Tuple::from_slice(&physical)
    }

    /// Physical order back to natural order.
    pub fn unmap<T: Copy>(&self, physical: &Tuple<T>) -> Result<Tuple<T>> {
        self.check_len(physical)?;
        let slots = physical.as_slice();
        let natural: SmallVec<[T; 4]> = self.insert_order.iter().map(|p| slots[*p]).collect();
        Tuple::from_slice(&natural)
    }
}

impl fmt::Debug for ColumnMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.primary, self.label)
    }
}

impl fmt::Display for ColumnMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn pos_moves_predicate_first() {
        let map = ColumnMap::new("SPO", "POS").unwrap();
        let natural = Tuple::Triple(['s', 'p', 'o']);
        assert_eq!(map.map(&natural).unwrap(), Tuple::Triple(['p', 'o', 's']));
        assert_eq!(map.map_idx(0), 2);
        assert_eq!(map.unmap_idx(0), 1);
        assert_eq!(map.map_slot(0, &natural), Some('p'));
        let physical = map.map(&natural).unwrap();
        assert_eq!(map.unmap_slot(0, &physical), Some('s'));
    }

    #[test]
    fn from_name_infers_primary() {
        assert_eq!(ColumnMap::from_name("OSP").unwrap().primary(), "SPO");
        let gpos = ColumnMap::from_name("GPOS").unwrap();
        assert_eq!(gpos.primary(), "GSPO");
        let quad = Tuple::Quad(['g', 's', 'p', 'o']);
        assert_eq!(gpos.map(&quad).unwrap(), Tuple::Quad(['g', 'p', 'o', 's']));
        assert!(ColumnMap::from_name("SPOGX").is_err());
    }

    #[test]
    fn malformed_labels_are_rejected() {
        assert!(ColumnMap::new("SPO", "SPP").is_err());
        assert!(ColumnMap::new("SPO", "SPX").is_err());
        assert!(ColumnMap::new("SPO", "SPOG").is_err());
        assert!(ColumnMap::new("SS", "SS").is_err());
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let map = ColumnMap::from_name("SPO").unwrap();
        assert!(map.map(&Tuple::Quad([1, 2, 3, 4])).is_err());
        assert!(map.is_identity());
    }

    fn any_label() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("SPO"),
            Just("SOP"),
            Just("PSO"),
            Just("POS"),
            Just("OSP"),
            Just("OPS"),
            Just("GSPO"),
            Just("GPOS"),
            Just("GOSP"),
            Just("SPOG"),
            Just("POSG"),
            Just("OSPG"),
        ]
        .prop_map(str::to_owned)
    }

    proptest! {
        #[test]
        fn prop_unmap_inverts_map(label in any_label(), slots in prop::collection::vec(any::<u32>(), 4)) {
            let map = ColumnMap::from_name(&label).unwrap();
            let tuple = Tuple::from_slice(&slots[..map.len()]).unwrap();
            let physical = map.map(&tuple).unwrap();
            prop_assert_eq!(map.unmap(&physical).unwrap(), tuple);
            for i in 0..map.len() {
                prop_assert_eq!(map.map_slot(i, &tuple), physical.get(i).copied());
                prop_assert_eq!(map.map_idx(map.unmap_idx(i)), i);
            }
        }
    }
}
