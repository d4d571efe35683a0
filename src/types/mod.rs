#![forbid(unsafe_code)]
//! Shared identifiers and the crate-wide error type.

use std::fmt;

pub mod checksum;

pub use checksum::state_crc32;

/// Identifier of a fixed-size block inside one block file.
///
/// Tree nodes and record pages live in different files, so a `BlockId` is only
/// meaningful together with the manager it came from.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct BlockId(pub u32);

impl BlockId {
    /// Returns the id as a `usize` index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for BlockId {
    fn from(value: u32) -> Self {
        BlockId(value)
    }
}

/// Errors raised by the storage layer.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Underlying file I/O failed.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// Bytes read back from storage do not describe a valid structure.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// A caller passed an argument outside the accepted domain.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// A key did not have the length the record factory was configured for.
    #[error("key length mismatch: expected {expected} bytes, got {actual}")]
    KeyLength {
        /// Configured key length.
        expected: usize,
        /// Length that was supplied.
        actual: usize,
    },
    /// A record value did not have the length the record factory was configured for.
    #[error("value length mismatch: expected {expected} bytes, got {actual}")]
    ValueLength {
        /// Configured value length.
        expected: usize,
        /// Length that was supplied.
        actual: usize,
    },
    /// A structural invariant of an index was violated; the write must be abandoned.
    #[error("invariant violated: {0}")]
    Invariant(String),
    /// A block file was reopened with a different block size than it was created with.
    #[error("block size mismatch: file was created with {found} bytes, opened with {expected}")]
    BlockSizeMismatch {
        /// Block size requested by the caller.
        expected: usize,
        /// Block size recorded in the file.
        found: usize,
    },
    /// Store configuration could not be parsed or is inconsistent.
    #[error("config: {0}")]
    Config(String),
    /// The requested object does not exist.
    #[error("not found")]
    NotFound,
}

impl StoreError {
    /// Builds an [`StoreError::Invariant`] from anything printable.
    pub fn invariant(msg: impl Into<String>) -> Self {
        StoreError::Invariant(msg.into())
    }

    /// True for errors that signal a broken structure rather than an environmental fault.
    pub fn is_invariant(&self) -> bool {
        matches!(self, StoreError::Invariant(_) | StoreError::Corruption(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
