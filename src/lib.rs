//! Tuple-indexed RDF storage.
//!
//! Terms are replaced by fixed-width [`NodeId`]s, tuples of ids are laid out
//! as fixed-length records under one or more column orderings, and each
//! ordering is kept in a B+Tree whose nodes and record pages live in separate
//! block files. A [`Store`] ties the orderings together behind pattern
//! lookups.

#![warn(missing_docs)]

pub mod db;
pub mod primitives;
pub mod storage;
pub mod types;

pub use db::{Store, StoreOptions};
pub use storage::{ColumnMap, NodeId, Record, RecordFactory, Term, Tuple, TupleIndex};
pub use types::{Result, StoreError};
