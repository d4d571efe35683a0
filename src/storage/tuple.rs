//! Fixed-arity tuples of node ids.

use std::fmt;

use crate::storage::nodeid::NodeId;
use crate::types::{Result, StoreError};

/// A triple or a quad. Slots are in natural order, `(S, P, O)` or `(G, S, P, O)`,
/// unless a [`ColumnMap`](crate::storage::colmap::ColumnMap) says otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tuple<T> {
    /// Three slots.
    Triple([T; 3]),
    /// Four slots.
    Quad([T; 4]),
}

impl<T> Tuple<T> {
    /// Number of slots.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Always false; tuples have three or four slots.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Slots as a slice.
    pub fn as_slice(&self) -> &[T] {
        match self {
            Tuple::Triple(slots) => slots,
            Tuple::Quad(slots) => slots,
        }
    }

    /// Slot `idx`.
    pub fn get(&self, idx: usize) -> Option<&T> {
        self.as_slice().get(idx)
    }

    /// Iterates over the slots.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Applies `f` to every slot.
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> Tuple<U> {
        match self {
            Tuple::Triple([a, b, c]) => Tuple::Triple([f(a), f(b), f(c)]),
            Tuple::Quad([a, b, c, d]) => Tuple::Quad([f(a), f(b), f(c), f(d)]),
        }
    }
}

impl<T: Copy> Tuple<T> {
    /// Builds a tuple from three or four slots.
    pub fn from_slice(slots: &[T]) -> Result<Self> {
        match *slots {
            [a, b, c] => Ok(Tuple::Triple([a, b, c])),
            [a, b, c, d] => Ok(Tuple::Quad([a, b, c, d])),
            _ => Err(StoreError::Invalid("tuples have three or four slots")),
        }
    }
}

impl Tuple<NodeId> {
    /// `(s, p, o)`
    pub fn triple(s: NodeId, p: NodeId, o: NodeId) -> Self {
        Tuple::Triple([s, p, o])
    }

    /// `(g, s, p, o)`
    pub fn quad(g: NodeId, s: NodeId, p: NodeId, o: NodeId) -> Self {
        Tuple::Quad([g, s, p, o])
    }

    /// All-wildcard pattern of the given arity.
    pub fn any(len: usize) -> Result<Self> {
        match len {
            3 => Ok(Tuple::Triple([NodeId::ANY; 3])),
            4 => Ok(Tuple::Quad([NodeId::ANY; 4])),
            _ => Err(StoreError::Invalid("tuples have three or four slots")),
        }
    }

    /// True when no slot is [`NodeId::ANY`].
    pub fn is_concrete(&self) -> bool {
        self.iter().all(|id| !id.is_any())
    }

    /// True when `self` has a value equal to every bound slot of `pattern`.
    pub fn matches(&self, pattern: &Tuple<NodeId>) -> bool {
        self.len() == pattern.len()
            && self
                .iter()
                .zip(pattern.iter())
                .all(|(value, want)| want.is_any() || value == want)
    }
}

impl<T: fmt::Display> fmt::Display for Tuple<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, slot) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{slot}")?;
        }
        f.write_str(")")
    }
}
