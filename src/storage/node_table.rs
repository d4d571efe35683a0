#![forbid(unsafe_code)]

//! Term dictionaries: the mapping between [`Term`]s and [`NodeId`]s.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::primitives::bytes::ord::{get_u32_be, put_u32_be};
use crate::primitives::io::{FileIo, StdFileIo};
use crate::storage::nodeid::NodeId;
use crate::storage::term::Term;
use crate::types::{Result, StoreError};

/// Two-way term dictionary.
pub trait NodeTable: Send + Sync {
    /// Id for `term`, allocating one if the term is new.
    fn get_or_allocate(&self, term: &Term) -> Result<NodeId>;

    /// Id for `term` if it is known. Never allocates.
    fn node_id_for(&self, term: &Term) -> Result<Option<NodeId>>;

    /// Term for `id`, if `id` was handed out by this table.
    fn term_for(&self, id: NodeId) -> Result<Option<Term>>;

    /// Flushes allocations to stable storage.
    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

impl<T: NodeTable + ?Sized> NodeTable for Box<T> {
    fn get_or_allocate(&self, term: &Term) -> Result<NodeId> {
        (**self).get_or_allocate(term)
    }

    fn node_id_for(&self, term: &Term) -> Result<Option<NodeId>> {
        (**self).node_id_for(term)
    }

    fn term_for(&self, id: NodeId) -> Result<Option<Term>> {
        (**self).term_for(id)
    }

    fn sync(&self) -> Result<()> {
        (**self).sync()
    }
}

/// Lookup counters.
#[derive(Default)]
pub struct NodeTableMetrics {
    allocate_calls: AtomicU64,
    allocate_hits: AtomicU64,
    inlined: AtomicU64,
    resolve_calls: AtomicU64,
    resolve_misses: AtomicU64,
}

/// Point-in-time copy of [`NodeTableMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeTableMetricsSnapshot {
    /// `get_or_allocate` calls that reached the dictionary.
    pub allocate_calls: u64,
    /// Of those, how many found an existing id.
    pub allocate_hits: u64,
    /// Terms answered by inline encoding without a lookup.
    pub inlined: u64,
    /// `term_for` calls that reached the dictionary.
    pub resolve_calls: u64,
    /// Of those, how many found nothing.
    pub resolve_misses: u64,
}

impl NodeTableMetrics {
    /// Copies the counters.
    pub fn snapshot(&self) -> NodeTableMetricsSnapshot {
        NodeTableMetricsSnapshot {
            allocate_calls: self.allocate_calls.load(Ordering::Relaxed),
            allocate_hits: self.allocate_hits.load(Ordering::Relaxed),
            inlined: self.inlined.load(Ordering::Relaxed),
            resolve_calls: self.resolve_calls.load(Ordering::Relaxed),
            resolve_misses: self.resolve_misses.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct MemInner {
    ids: FxHashMap<Term, NodeId>,
    terms: Vec<Term>,
}

/// In-memory dictionary handing out offsets from 0.
#[derive(Default)]
pub struct MemNodeTable {
    inner: RwLock<MemInner>,
    metrics: Arc<NodeTableMetrics>,
}

impl MemNodeTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of allocated terms.
    pub fn len(&self) -> usize {
        self.inner.read().terms.len()
    }

    /// True when nothing has been allocated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shared lookup counters.
    pub fn metrics(&self) -> Arc<NodeTableMetrics> {
        Arc::clone(&self.metrics)
    }
}

impl NodeTable for MemNodeTable {
    fn get_or_allocate(&self, term: &Term) -> Result<NodeId> {
        NodeTableMetrics::bump(&self.metrics.allocate_calls);
        if let Some(id) = self.inner.read().ids.get(term) {
            NodeTableMetrics::bump(&self.metrics.allocate_hits);
            return Ok(*id);
        }
        let mut inner = self.inner.write();
        // Another writer may have won the race between the two locks.
        if let Some(id) = inner.ids.get(term) {
            NodeTableMetrics::bump(&self.metrics.allocate_hits);
            return Ok(*id);
        }
        let id = NodeId::from_offset(inner.terms.len() as u64)?;
        inner.terms.push(term.clone());
        inner.ids.insert(term.clone(), id);
        tracing::trace!(target: "tuplestore::nodes", %id, %term, "allocated node id");
        Ok(id)
    }

    fn node_id_for(&self, term: &Term) -> Result<Option<NodeId>> {
        Ok(self.inner.read().ids.get(term).copied())
    }

    fn term_for(&self, id: NodeId) -> Result<Option<Term>> {
        NodeTableMetrics::bump(&self.metrics.resolve_calls);
        let found = id
            .offset()
            .and_then(|offset| usize::try_from(offset).ok())
            .and_then(|offset| self.inner.read().terms.get(offset).cloned());
        if found.is_none() {
            NodeTableMetrics::bump(&self.metrics.resolve_misses);
        }
        Ok(found)
    }
}

const TERM_IRI: u8 = 0;
const TERM_BLANK: u8 = 1;
const TERM_LITERAL: u8 = 2;
const TERM_LANG_LITERAL: u8 = 3;

/// Object layout: `[len u32][tag u8]` then `len - 1` bytes of
/// `[field len u32][utf8]` fields.
fn encode_term(term: &Term) -> Vec<u8> {
    let (tag, fields): (u8, Vec<&str>) = match term {
        Term::Iri(iri) => (TERM_IRI, vec![iri.as_str()]),
        Term::Blank(label) => (TERM_BLANK, vec![label.as_str()]),
        Term::Literal {
            lexical,
            datatype,
            lang: None,
        } => (TERM_LITERAL, vec![lexical.as_str(), datatype.as_str()]),
        Term::Literal {
            lexical,
            datatype,
            lang: Some(lang),
        } => (TERM_LANG_LITERAL, vec![lexical.as_str(), datatype.as_str(), lang.as_str()]),
    };
    let body = 1 + fields.iter().map(|f| 4 + f.len()).sum::<usize>();
    let mut buf = vec![0u8; 4 + body];
    put_u32_be(&mut buf, 0, body as u32);
    buf[4] = tag;
    let mut off = 5;
    for field in fields {
        put_u32_be(&mut buf, off, field.len() as u32);
        buf[off + 4..off + 4 + field.len()].copy_from_slice(field.as_bytes());
        off += 4 + field.len();
    }
    buf
}

fn decode_term(body: &[u8]) -> Result<Term> {
    let (&tag, mut rest) = body
        .split_first()
        .ok_or(StoreError::Corruption("empty node table object"))?;
    let mut field = || -> Result<String> {
        let cur: &[u8] = rest;
        let len = get_u32_be(cur, 0)? as usize;
        let bytes = cur
            .get(4..4 + len)
            .ok_or(StoreError::Corruption("node table field truncated"))?;
        rest = &cur[4 + len..];
        String::from_utf8(bytes.to_vec())
            .map_err(|_| StoreError::Corruption("node table field is not utf-8"))
    };
    let term = match tag {
        TERM_IRI => Term::Iri(field()?),
        TERM_BLANK => Term::Blank(field()?),
        TERM_LITERAL => Term::Literal {
            lexical: field()?,
            datatype: field()?,
            lang: None,
        },
        TERM_LANG_LITERAL => Term::Literal {
            lexical: field()?,
            datatype: field()?,
            lang: Some(field()?),
        },
        _ => return Err(StoreError::Corruption("unknown node table object tag")),
    };
    if !rest.is_empty() {
        return Err(StoreError::Corruption("trailing bytes in node table object"));
    }
    Ok(term)
}

struct FileInner {
    ids: FxHashMap<Term, NodeId>,
    terms: FxHashMap<u64, Term>,
    end: u64,
}

/// Dictionary kept in an append-only object file.
///
/// A term's id is the byte offset of its object, so ids stay valid across
/// reopens. The lookup maps are rebuilt from the file on open.
pub struct FileNodeTable {
    io: StdFileIo,
    inner: RwLock<FileInner>,
    metrics: Arc<NodeTableMetrics>,
}

impl FileNodeTable {
    /// Opens or creates the object file at `path` and loads every term.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let io = StdFileIo::open(path.as_ref())?;
        let end = io.len()?;
        let mut bytes = vec![0u8; usize::try_from(end).map_err(|_| StoreError::Corruption("node table too large"))?];
        io.read_at(0, &mut bytes)?;

        let mut ids = FxHashMap::default();
        let mut terms = FxHashMap::default();
        let mut off = 0usize;
        while off < bytes.len() {
            let len = get_u32_be(&bytes, off).map_err(|_| StoreError::Corruption("node table truncated"))? as usize;
            let body = bytes
                .get(off + 4..off + 4 + len)
                .ok_or(StoreError::Corruption("node table truncated"))?;
            let term = decode_term(body)?;
            let id = NodeId::from_offset(off as u64)?;
            ids.insert(term.clone(), id);
            terms.insert(off as u64, term);
            off += 4 + len;
        }
        tracing::debug!(
            target: "tuplestore::nodes",
            path = %path.as_ref().display(),
            terms = terms.len(),
            bytes = end,
            "opened node table"
        );
        Ok(Self {
            io,
            inner: RwLock::new(FileInner { ids, terms, end }),
            metrics: Arc::new(NodeTableMetrics::default()),
        })
    }

    /// Number of stored terms.
    pub fn len(&self) -> usize {
        self.inner.read().terms.len()
    }

    /// True when nothing has been allocated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shared lookup counters.
    pub fn metrics(&self) -> Arc<NodeTableMetrics> {
        Arc::clone(&self.metrics)
    }
}

impl NodeTable for FileNodeTable {
    fn get_or_allocate(&self, term: &Term) -> Result<NodeId> {
        NodeTableMetrics::bump(&self.metrics.allocate_calls);
        if let Some(id) = self.inner.read().ids.get(term) {
            NodeTableMetrics::bump(&self.metrics.allocate_hits);
            return Ok(*id);
        }
        let mut inner = self.inner.write();
        if let Some(id) = inner.ids.get(term) {
            NodeTableMetrics::bump(&self.metrics.allocate_hits);
            return Ok(*id);
        }
        let object = encode_term(term);
        let id = NodeId::from_offset(inner.end)?;
        self.io.write_at(inner.end, &object)?;
        let offset = inner.end;
        inner.end += object.len() as u64;
        inner.terms.insert(offset, term.clone());
        inner.ids.insert(term.clone(), id);
        tracing::trace!(target: "tuplestore::nodes", %id, %term, "allocated node id");
        Ok(id)
    }

    fn node_id_for(&self, term: &Term) -> Result<Option<NodeId>> {
        Ok(self.inner.read().ids.get(term).copied())
    }

    fn term_for(&self, id: NodeId) -> Result<Option<Term>> {
        NodeTableMetrics::bump(&self.metrics.resolve_calls);
        let found = id
            .offset()
            .and_then(|offset| self.inner.read().terms.get(&offset).cloned());
        if found.is_none() {
            NodeTableMetrics::bump(&self.metrics.resolve_misses);
        }
        Ok(found)
    }

    fn sync(&self) -> Result<()> {
        self.io.sync_all()
    }
}

/// Tries inline encoding before falling back to `T`.
///
/// Inlinable terms never reach the wrapped table, so it only ever stores
/// terms whose values do not fit in an id.
pub struct NodeTableInline<T> {
    table: T,
    metrics: Arc<NodeTableMetrics>,
}

impl<T: NodeTable> NodeTableInline<T> {
    /// Wraps `table`.
    pub fn new(table: T) -> Self {
        Self {
            table,
            metrics: Arc::new(NodeTableMetrics::default()),
        }
    }

    /// The wrapped dictionary.
    pub fn inner(&self) -> &T {
        &self.table
    }

    /// Counters for lookups answered inline.
    pub fn metrics(&self) -> Arc<NodeTableMetrics> {
        Arc::clone(&self.metrics)
    }
}

impl<T: NodeTable> NodeTable for NodeTableInline<T> {
    fn get_or_allocate(&self, term: &Term) -> Result<NodeId> {
        if let Some(id) = NodeId::inline(term) {
            NodeTableMetrics::bump(&self.metrics.inlined);
            return Ok(id);
        }
        self.table.get_or_allocate(term)
    }

    fn node_id_for(&self, term: &Term) -> Result<Option<NodeId>> {
        if let Some(id) = NodeId::inline(term) {
            NodeTableMetrics::bump(&self.metrics.inlined);
            return Ok(Some(id));
        }
        self.table.node_id_for(term)
    }

    fn term_for(&self, id: NodeId) -> Result<Option<Term>> {
        if id.is_inline() {
            return Ok(id.extract());
        }
        if id.is_special() {
            return Ok(None);
        }
        self.table.term_for(id)
    }

    fn sync(&self) -> Result<()> {
        self.table.sync()
    }
}
