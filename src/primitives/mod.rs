//! Low-level primitives for building the storage engine.
//!
//! Includes byte utilities, positioned file I/O and fixed-size block managers.

/// Big-endian field helpers and capacity-checked buffers.
pub mod bytes;

/// Fixed-size block managers, in memory and file backed.
///
/// Tree nodes and record pages are stored through these.
pub mod block;

/// I/O abstractions and utilities.
///
/// Interfaces for reading/writing data and file operations.
pub mod io;
