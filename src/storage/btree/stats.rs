use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Snapshot of B+ tree statistics at a point in time.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BTreeStatsSnapshot {
    /// Root-to-page descents performed
    pub searches: u64,
    /// Record page splits
    pub page_splits: u64,
    /// Node splits below the root
    pub node_splits: u64,
    /// Root splits (height grew by one)
    pub root_splits: u64,
    /// Records moved between sibling pages
    pub page_borrows: u64,
    /// Keys rotated between sibling nodes
    pub node_borrows: u64,
    /// Record page merges
    pub page_merges: u64,
    /// Node merges
    pub node_merges: u64,
    /// Root collapses (height shrank by one)
    pub root_collapses: u64,
}

/// Thread-safe statistics tracking for B+ tree operations.
#[derive(Default, Debug)]
pub struct BTreeStats {
    searches: AtomicU64,
    page_splits: AtomicU64,
    node_splits: AtomicU64,
    root_splits: AtomicU64,
    page_borrows: AtomicU64,
    node_borrows: AtomicU64,
    page_merges: AtomicU64,
    node_merges: AtomicU64,
    root_collapses: AtomicU64,
}

impl BTreeStats {
    /// Returns the number of root-to-page descents.
    pub fn searches(&self) -> u64 {
        self.searches.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of record page splits.
    pub fn page_splits(&self) -> u64 {
        self.page_splits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of node splits.
    pub fn node_splits(&self) -> u64 {
        self.node_splits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of root splits.
    pub fn root_splits(&self) -> u64 {
        self.root_splits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of page borrows.
    pub fn page_borrows(&self) -> u64 {
        self.page_borrows.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of node borrows.
    pub fn node_borrows(&self) -> u64 {
        self.node_borrows.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of page merges.
    pub fn page_merges(&self) -> u64 {
        self.page_merges.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of node merges.
    pub fn node_merges(&self) -> u64 {
        self.node_merges.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of root collapses.
    pub fn root_collapses(&self) -> u64 {
        self.root_collapses.load(AtomicOrdering::Relaxed)
    }

    pub(crate) fn inc_searches(&self) {
        self.searches.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_page_splits(&self) {
        self.page_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_node_splits(&self) {
        self.node_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_root_splits(&self) {
        self.root_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_page_borrows(&self) {
        self.page_borrows.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_node_borrows(&self) {
        self.node_borrows.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_page_merges(&self) {
        self.page_merges.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_node_merges(&self) {
        self.node_merges.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_root_collapses(&self) {
        self.root_collapses
            .fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Creates a snapshot of all current statistics.
    pub fn snapshot(&self) -> BTreeStatsSnapshot {
        BTreeStatsSnapshot {
            searches: self.searches(),
            page_splits: self.page_splits(),
            node_splits: self.node_splits(),
            root_splits: self.root_splits(),
            page_borrows: self.page_borrows(),
            node_borrows: self.node_borrows(),
            page_merges: self.page_merges(),
            node_merges: self.node_merges(),
            root_collapses: self.root_collapses(),
        }
    }

    /// Emits current statistics to the tracing infrastructure.
    pub fn emit_tracing(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            target: "tuplestore::btree::stats",
            searches = snapshot.searches,
            page_splits = snapshot.page_splits,
            node_splits = snapshot.node_splits,
            root_splits = snapshot.root_splits,
            page_borrows = snapshot.page_borrows,
            node_borrows = snapshot.node_borrows,
            page_merges = snapshot.page_merges,
            node_merges = snapshot.node_merges,
            root_collapses = snapshot.root_collapses,
            "btree stats snapshot"
        );
    }
}
