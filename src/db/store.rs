use std::fs;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::config::StoreOptions;
use crate::storage::btree::BPlusTree;
use crate::storage::colmap::ColumnMap;
use crate::storage::node_table::{FileNodeTable, MemNodeTable, NodeTable, NodeTableInline};
use crate::storage::nodeid::NodeId;
use crate::storage::term::Term;
use crate::storage::tuple::Tuple;
use crate::storage::tuple_index::{TupleIndex, TupleIndexRecord, TupleIter, TupleTable};
use crate::types::{Result, StoreError};

/// Dictionary object file inside a store directory.
pub const NODE_TABLE_FILE: &str = "nodes.dat";

/// Outcome of [`Store::bulk_load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkLoadStats {
    /// Distinct triples stored afterwards.
    pub triples: u64,
    /// Distinct quads stored afterwards.
    pub quads: u64,
    /// Wall time spent.
    pub elapsed: Duration,
}

/// Per-index result of [`Store::check_integrity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Index name.
    pub name: String,
    /// Tuples found by the structural walk.
    pub tuples: u64,
}

/// Result of [`Store::check_integrity`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    /// One entry per index that passed its structural check.
    pub indexes: Vec<IndexReport>,
    /// Everything that failed, as readable messages.
    pub problems: Vec<String>,
}

impl IntegrityReport {
    /// True when no problem was found.
    pub fn is_consistent(&self) -> bool {
        self.problems.is_empty()
    }

    fn check_table(&mut self, table: &TupleTable) {
        let mut primary: Option<u64> = None;
        for index in table.indexes() {
            match index.check_integrity() {
                Ok(tuples) => {
                    match primary {
                        None => primary = Some(tuples),
                        Some(expected) if expected != tuples => self.problems.push(format!(
                            "index {} holds {tuples} tuples, primary holds {expected}",
                            index.name()
                        )),
                        Some(_) => {}
                    }
                    self.indexes.push(IndexReport {
                        name: index.name().to_string(),
                        tuples,
                    });
                }
                Err(err) => self.problems.push(format!("index {}: {err}", index.name())),
            }
        }
    }
}

/// A set of triple and quad indexes with a term dictionary in front.
///
/// A file-backed store keeps its dictionary in [`NODE_TABLE_FILE`] next to
/// the trees, so node ids in stored tuples resolve to the same terms after a
/// reopen.
///
/// Built only by [`Store::open`]; a returned store has every configured index
/// open and, with `verify_on_open`, checked.
pub struct Store {
    options: StoreOptions,
    nodes: NodeTableInline<Box<dyn NodeTable>>,
    triples: TupleTable,
    quads: Option<TupleTable>,
}

impl Store {
    /// Opens or creates the store described by `options`.
    pub fn open(options: StoreOptions) -> Result<Self> {
        options.validate()?;
        let dictionary: Box<dyn NodeTable> = match &options.location {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                Box::new(FileNodeTable::open(dir.join(NODE_TABLE_FILE))?)
            }
            None => Box::new(MemNodeTable::new()),
        };
        let triples = open_table(&options, 3, &options.triple_indexes)?;
        let quads = if options.quad_indexes.is_empty() {
            None
        } else {
            Some(open_table(&options, 4, &options.quad_indexes)?)
        };
        let store = Self {
            nodes: NodeTableInline::new(dictionary),
            triples,
            quads,
            options,
        };

        if store.options.verify_on_open {
            let report = store.check_integrity()?;
            if let Some(problem) = report.problems.first() {
                tracing::warn!(target: "tuplestore::store", %problem, "integrity check failed");
                return Err(StoreError::Corruption("index integrity check failed on open"));
            }
        }
        tracing::debug!(
            target: "tuplestore::store",
            location = ?store.options.location,
            triple_indexes = store.options.triple_indexes.len(),
            quad_indexes = store.options.quad_indexes.len(),
            "opened store"
        );
        Ok(store)
    }

    /// Options the store was opened with.
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Triple indexes.
    pub fn triples(&self) -> &TupleTable {
        &self.triples
    }

    /// Quad indexes, when configured.
    pub fn quads(&self) -> Option<&TupleTable> {
        self.quads.as_ref()
    }

    /// Term dictionary.
    pub fn node_table(&self) -> &dyn NodeTable {
        &self.nodes
    }

    fn table(&self, arity: usize) -> Result<&TupleTable> {
        match arity {
            3 => Ok(&self.triples),
            4 => self
                .quads
                .as_ref()
                .ok_or(StoreError::Invalid("store has no quad indexes")),
            _ => Err(StoreError::Invalid("tuples have three or four slots")),
        }
    }

    fn table_mut(&mut self, arity: usize) -> Result<&mut TupleTable> {
        match arity {
            3 => Ok(&mut self.triples),
            4 => self
                .quads
                .as_mut()
                .ok_or(StoreError::Invalid("store has no quad indexes")),
            _ => Err(StoreError::Invalid("tuples have three or four slots")),
        }
    }

    /// Stores `tuple` in every index of its arity. False if already present.
    pub fn add(&mut self, tuple: &Tuple<NodeId>) -> Result<bool> {
        self.table_mut(tuple.len())?.add(tuple)
    }

    /// Removes `tuple`. False if it was absent.
    pub fn delete(&mut self, tuple: &Tuple<NodeId>) -> Result<bool> {
        self.table_mut(tuple.len())?.delete(tuple)
    }

    /// True if `tuple` is stored.
    pub fn contains(&self, tuple: &Tuple<NodeId>) -> Result<bool> {
        if !tuple.is_concrete() {
            return Err(StoreError::Invalid("contains needs a concrete tuple"));
        }
        match self.find(tuple)?.next() {
            Some(found) => found.map(|_| true),
            None => Ok(false),
        }
    }

    /// Tuples matching `pattern`, in natural order.
    pub fn find(&self, pattern: &Tuple<NodeId>) -> Result<TupleIter<'_>> {
        self.table(pattern.len())?.find(pattern)
    }

    /// Number of stored triples.
    pub fn triple_count(&self) -> Result<u64> {
        self.triples.size()
    }

    /// Number of stored quads; zero without quad indexes.
    pub fn quad_count(&self) -> Result<u64> {
        self.quads.as_ref().map_or(Ok(0), TupleTable::size)
    }

    /// Ids for `terms`, allocating dictionary entries as needed.
    pub fn intern(&self, terms: &[Term]) -> Result<Tuple<NodeId>> {
        let ids = terms
            .iter()
            .map(|term| self.nodes.get_or_allocate(term))
            .collect::<Result<Vec<_>>>()?;
        Tuple::from_slice(&ids)
    }

    /// Pattern for `terms`, `None` slots being wildcards. Returns `None` when
    /// a bound term has never been seen, since nothing can match it.
    pub fn pattern(&self, terms: &[Option<Term>]) -> Result<Option<Tuple<NodeId>>> {
        let mut ids = Vec::with_capacity(terms.len());
        for term in terms {
            match term {
                None => ids.push(NodeId::ANY),
                Some(term) => match self.nodes.node_id_for(term)? {
                    Some(id) => ids.push(id),
                    None => return Ok(None),
                },
            }
        }
        Tuple::from_slice(&ids).map(Some)
    }

    /// Terms for the ids of `tuple`.
    pub fn terms(&self, tuple: &Tuple<NodeId>) -> Result<Vec<Term>> {
        tuple
            .iter()
            .map(|id| self.nodes.term_for(*id)?.ok_or(StoreError::NotFound))
            .collect()
    }

    /// Adds the triple or quad made of `terms`.
    pub fn add_terms(&mut self, terms: &[Term]) -> Result<bool> {
        let tuple = self.intern(terms)?;
        self.add(&tuple)
    }

    /// Loads `tuples` alongside what is already stored, rebuilding every
    /// index bottom-up instead of inserting one tuple at a time.
    pub fn bulk_load<I>(&mut self, tuples: I) -> Result<BulkLoadStats>
    where
        I: IntoIterator<Item = Tuple<NodeId>>,
    {
        let started = Instant::now();
        let mut triples = Vec::new();
        let mut quads = Vec::new();
        for tuple in tuples {
            match tuple.len() {
                3 => triples.push(tuple),
                _ => quads.push(tuple),
            }
        }
        if !quads.is_empty() && self.quads.is_none() {
            return Err(StoreError::Invalid("store has no quad indexes"));
        }
        let triples = load_table(&mut self.triples, triples)?;
        let quads = match &mut self.quads {
            Some(table) => load_table(table, quads)?,
            None => 0,
        };
        let stats = BulkLoadStats {
            triples,
            quads,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            target: "tuplestore::store",
            triples,
            quads,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "bulk load finished"
        );
        Ok(stats)
    }

    /// Walks every index and compares each ordering with its primary.
    pub fn check_integrity(&self) -> Result<IntegrityReport> {
        let mut report = IntegrityReport::default();
        report.check_table(&self.triples);
        if let Some(quads) = &self.quads {
            report.check_table(quads);
        }
        Ok(report)
    }

    /// Removes every tuple. The dictionary is kept.
    pub fn clear(&mut self) -> Result<()> {
        self.triples.clear()?;
        if let Some(quads) = &mut self.quads {
            quads.clear()?;
        }
        Ok(())
    }

    /// Flushes every index.
    pub fn sync(&self) -> Result<()> {
        self.nodes.sync()?;
        self.triples.sync()?;
        if let Some(quads) = &self.quads {
            quads.sync()?;
        }
        tracing::debug!(target: "tuplestore::store", "synced store");
        Ok(())
    }

    /// Flushes and releases every index.
    pub fn close(self) -> Result<()> {
        self.nodes.sync()?;
        self.triples.close()?;
        if let Some(quads) = &self.quads {
            quads.close()?;
        }
        tracing::debug!(target: "tuplestore::store", location = ?self.options.location, "closed store");
        Ok(())
    }
}

fn open_table(options: &StoreOptions, arity: usize, labels: &[String]) -> Result<TupleTable> {
    let params = options.tree_params(arity)?;
    let mut indexes: Vec<Box<dyn TupleIndex>> = Vec::with_capacity(labels.len());
    for label in labels {
        let map = ColumnMap::from_name(label)?;
        let tree = match &options.location {
            Some(dir) => BPlusTree::open_file(dir, label, params, options.block_cache_blocks)?,
            None => BPlusTree::in_memory(params)?,
        };
        indexes.push(Box::new(TupleIndexRecord::new(map, tree)?));
    }
    TupleTable::new(arity, indexes)
}

fn load_table(table: &mut TupleTable, fresh: Vec<Tuple<NodeId>>) -> Result<u64> {
    if fresh.is_empty() {
        return table.size();
    }
    let existing = table.all()?.collect::<Result<Vec<_>>>()?;
    let mut input = existing.into_iter().chain(fresh).map(Ok::<_, StoreError>);
    table.bulk_load(&mut input)
}
