#![forbid(unsafe_code)]

//! B+Tree over two block files: nodes hold separator keys, chained record
//! pages hold the records.

mod iter;
mod node;
mod page;
mod params;
mod rewriter;
mod state;
mod stats;
mod tree;

pub use iter::RangeIter;
pub use node::{BPTreeNode, NodeManager};
pub use page::{RecordPage, RecordsManager};
pub use params::{BPlusTreeParams, DEFAULT_RECORD_BLOCK_SIZE};
pub use rewriter::BPlusTreeRewriter;
pub use state::TreeFiles;
pub use stats::{BTreeStats, BTreeStatsSnapshot};
pub use tree::BPlusTree;
