#![forbid(unsafe_code)]
//! CRC32 helpers for persisted metadata.

/// Checksum of a tree state record, salted with the format version.
pub fn state_crc32(format_version: u16, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&format_version.to_be_bytes());
    hasher.update(payload);
    hasher.finalize()
}
