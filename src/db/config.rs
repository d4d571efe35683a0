use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::storage::btree::{BPlusTreeParams, DEFAULT_RECORD_BLOCK_SIZE};
use crate::storage::colmap::{ColumnMap, QUAD_PRIMARY, TRIPLE_PRIMARY};
use crate::storage::record::RecordFactory;
use crate::types::{Result, StoreError};

/// Node block size used to derive the order when none is configured.
pub const DEFAULT_NODE_BLOCK_SIZE: usize = 8192;

/// Everything [`Store::open`](super::Store::open) needs.
///
/// Loadable from TOML; every field is optional there:
///
/// ```toml
/// location = "/var/lib/tuples"
/// order = 32
/// triple_indexes = ["SPO", "POS", "OSP"]
/// quad_indexes = []
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreOptions {
    /// Directory holding the index files; `None` keeps everything in memory.
    pub location: Option<PathBuf>,
    /// B+Tree order; `None` picks the largest order whose node fits
    /// [`DEFAULT_NODE_BLOCK_SIZE`].
    pub order: Option<usize>,
    /// Record page size in bytes; `None` uses [`DEFAULT_RECORD_BLOCK_SIZE`].
    pub record_block_size: Option<usize>,
    /// Triple index orderings, primary first.
    pub triple_indexes: Vec<String>,
    /// Quad index orderings, primary first. Empty disables quads.
    pub quad_indexes: Vec<String>,
    /// Blocks cached per file-backed block manager.
    pub block_cache_blocks: usize,
    /// Walk every tree and compare index sizes when opening.
    pub verify_on_open: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            location: None,
            order: None,
            record_block_size: None,
            triple_indexes: ["SPO", "POS", "OSP"].map(String::from).to_vec(),
            quad_indexes: ["GSPO", "GPOS", "GOSP", "SPOG", "POSG", "OSPG"]
                .map(String::from)
                .to_vec(),
            block_cache_blocks: 1024,
            verify_on_open: false,
        }
    }
}

impl StoreOptions {
    /// In-memory store with the default orderings.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// File-backed store in `dir` with the default orderings.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            location: Some(dir.into()),
            ..Self::default()
        }
    }

    /// Parses options from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| StoreError::Config(format!("parse: {err}")))
    }

    /// Reads options from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|err| StoreError::Config(format!("read {}: {err}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Renders the options as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|err| StoreError::Config(format!("serialize: {err}")))
    }

    /// Checks the options without touching storage.
    pub fn validate(&self) -> Result<()> {
        if self.triple_indexes.is_empty() {
            return Err(StoreError::Config("at least one triple index is required".into()));
        }
        check_labels(&self.triple_indexes, TRIPLE_PRIMARY)?;
        check_labels(&self.quad_indexes, QUAD_PRIMARY)?;
        if self.block_cache_blocks == 0 {
            return Err(StoreError::Config("block_cache_blocks must be positive".into()));
        }
        for arity in [3, 4] {
            self.tree_params(arity)?;
        }
        Ok(())
    }

    /// Tree shape for indexes over tuples of `arity` node ids.
    pub fn tree_params(&self, arity: usize) -> Result<BPlusTreeParams> {
        let factory = RecordFactory::for_tuples(arity);
        let params = match self.order {
            Some(order) => BPlusTreeParams::new(order, factory),
            None => BPlusTreeParams::for_node_block_size(DEFAULT_NODE_BLOCK_SIZE, factory)?,
        }
        .with_record_block_size(self.record_block_size.unwrap_or(DEFAULT_RECORD_BLOCK_SIZE));
        params
            .validate()
            .map_err(|err| StoreError::Config(format!("tree parameters for arity {arity}: {err}")))?;
        Ok(params)
    }
}

fn check_labels(labels: &[String], primary: &str) -> Result<()> {
    for (i, label) in labels.iter().enumerate() {
        ColumnMap::new(primary, label)
            .map_err(|err| StoreError::Config(format!("index {label:?}: {err}")))?;
        if labels[..i].contains(label) {
            return Err(StoreError::Config(format!("index {label:?} listed twice")));
        }
    }
    Ok(())
}
