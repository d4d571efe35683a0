#![forbid(unsafe_code)]

//! Store assembly: options and the [`Store`] built from them.

mod config;
mod store;

pub use config::{StoreOptions, DEFAULT_NODE_BLOCK_SIZE};
pub use store::{BulkLoadStats, IndexReport, IntegrityReport, Store, NODE_TABLE_FILE};
