//! Storage engine: node ids, records, column maps, the B+Tree range index and
//! the tuple indexes built on it.

/// Two-file B+Tree and its bulk loader.
pub mod btree;

/// Named slot permutations.
pub mod colmap;

/// Term dictionaries.
pub mod node_table;

/// Fixed-width term ids and their inline encodings.
pub mod nodeid;

/// Ordered record collections.
pub mod range_index;

/// Fixed-length binary records.
pub mod record;

/// RDF terms.
pub mod term;

/// Triples and quads.
pub mod tuple;

/// Pattern lookups over column-permuted indexes.
pub mod tuple_index;

pub use btree::{BPlusTree, BPlusTreeParams, BPlusTreeRewriter};
pub use colmap::ColumnMap;
pub use node_table::{FileNodeTable, MemNodeTable, NodeTable, NodeTableInline};
pub use nodeid::{NodeId, NodeIdType};
pub use range_index::{RangeIndex, RecordIter};
pub use record::{Record, RecordFactory};
pub use term::Term;
pub use tuple::Tuple;
pub use tuple_index::{ScanPolicy, TupleIndex, TupleIndexRecord, TupleIter, TupleTable};
