//! Per-tree state file `<name>.bpt`.
//!
//! ```text
//! 0   magic "TSBPTREE"
//! 8   version u16, reserved u16
//! 12  node block size, record block size, order, key len, value len (u32 each)
//! 32  root id, node high-water mark, page high-water mark (u32 each)
//! 44  crc32 of bytes 0..44, salted with the version
//! ```

use std::path::{Path, PathBuf};

use super::params::BPlusTreeParams;
use crate::primitives::bytes::ord;
use crate::primitives::io::{FileIo, StdFileIo};
use crate::types::{state_crc32, BlockId, Result, StoreError};

const MAGIC: &[u8; 8] = b"TSBPTREE";
const FORMAT_VERSION: u16 = 1;
const CRC_OFFSET: usize = 44;
const STATE_LEN: usize = 48;

/// File names of one on-disk tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeFiles {
    /// Tree state, `<name>.bpt`.
    pub state: PathBuf,
    /// Node blocks, `<name>.idn`.
    pub nodes: PathBuf,
    /// Record pages, `<name>.dat`.
    pub pages: PathBuf,
}

impl TreeFiles {
    /// Paths for tree `name` inside `dir`.
    pub fn new(dir: impl AsRef<Path>, name: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            state: dir.join(format!("{name}.bpt")),
            nodes: dir.join(format!("{name}.idn")),
            pages: dir.join(format!("{name}.dat")),
        }
    }
}

/// Mutable part of the persisted state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TreeState {
    pub(crate) root: BlockId,
    pub(crate) node_limit: u32,
    pub(crate) page_limit: u32,
}

pub(crate) struct StateFile {
    io: StdFileIo,
    path: PathBuf,
}

fn width(value: usize, what: &'static str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Invalid(what))
}

impl StateFile {
    pub(crate) fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        Ok(Self {
            io: StdFileIo::open(&path)?,
            path,
        })
    }

    /// Stored state, or `None` for a fresh (empty) file. Checks that the
    /// stored shape matches `params`.
    pub(crate) fn read(&self, params: &BPlusTreeParams) -> Result<Option<TreeState>> {
        let len = self.io.len()?;
        if len == 0 {
            return Ok(None);
        }
        if len < STATE_LEN as u64 {
            return Err(StoreError::Corruption("tree state file truncated"));
        }
        let mut buf = [0u8; STATE_LEN];
        self.io.read_at(0, &mut buf)?;
        if &buf[..8] != MAGIC {
            return Err(StoreError::Corruption("tree state magic mismatch"));
        }
        let version = ord::get_u16_be(&buf, 8)?;
        if version != FORMAT_VERSION {
            return Err(StoreError::Corruption("unsupported tree state version"));
        }
        let stored_crc = ord::get_u32_be(&buf, CRC_OFFSET)?;
        if stored_crc != state_crc32(version, &buf[..CRC_OFFSET]) {
            return Err(StoreError::Corruption("tree state checksum mismatch"));
        }

        let node_block_size = ord::get_u32_be(&buf, 12)? as usize;
        if node_block_size != params.node_block_size() {
            return Err(StoreError::BlockSizeMismatch {
                expected: params.node_block_size(),
                found: node_block_size,
            });
        }
        let record_block_size = ord::get_u32_be(&buf, 16)? as usize;
        if record_block_size != params.record_block_size() {
            return Err(StoreError::BlockSizeMismatch {
                expected: params.record_block_size(),
                found: record_block_size,
            });
        }
        let order = ord::get_u32_be(&buf, 20)? as usize;
        let key_len = ord::get_u32_be(&buf, 24)? as usize;
        let value_len = ord::get_u32_be(&buf, 28)? as usize;
        if (order, key_len, value_len) != (params.order(), params.key_len(), params.value_len()) {
            return Err(StoreError::Config(format!(
                "{}: stored tree has order {order}, key {key_len}, value {value_len}; \
                 opened with order {}, key {}, value {}",
                self.path.display(),
                params.order(),
                params.key_len(),
                params.value_len()
            )));
        }
        Ok(Some(TreeState {
            root: BlockId(ord::get_u32_be(&buf, 32)?),
            node_limit: ord::get_u32_be(&buf, 36)?,
            page_limit: ord::get_u32_be(&buf, 40)?,
        }))
    }

    pub(crate) fn write(&self, params: &BPlusTreeParams, state: &TreeState) -> Result<()> {
        let mut buf = [0u8; STATE_LEN];
        buf[..8].copy_from_slice(MAGIC);
        ord::put_u16_be(&mut buf, 8, FORMAT_VERSION);
        ord::put_u32_be(&mut buf, 12, width(params.node_block_size(), "node block size")?);
        ord::put_u32_be(&mut buf, 16, width(params.record_block_size(), "record block size")?);
        ord::put_u32_be(&mut buf, 20, width(params.order(), "order")?);
        ord::put_u32_be(&mut buf, 24, width(params.key_len(), "key length")?);
        ord::put_u32_be(&mut buf, 28, width(params.value_len(), "value length")?);
        ord::put_u32_be(&mut buf, 32, state.root.0);
        ord::put_u32_be(&mut buf, 36, state.node_limit);
        ord::put_u32_be(&mut buf, 40, state.page_limit);
        let crc = state_crc32(FORMAT_VERSION, &buf[..CRC_OFFSET]);
        ord::put_u32_be(&mut buf, CRC_OFFSET, crc);
        self.io.write_at(0, &buf)?;
        self.io.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::record::RecordFactory;
    use tempfile::tempdir;

    fn params() -> BPlusTreeParams {
        BPlusTreeParams::new(3, RecordFactory::for_tuples(3)).with_record_capacity(8)
    }

    #[test]
    fn state_round_trips() -> Result<()> {
        let dir = tempdir()?;
        let file = StateFile::open(dir.path().join("spo.bpt"))?;
        assert_eq!(file.read(&params())?, None);
        let state = TreeState {
            root: BlockId(4),
            node_limit: 9,
            page_limit: 17,
        };
        file.write(&params(), &state)?;
        assert_eq!(file.read(&params())?, Some(state));
        Ok(())
    }

    #[test]
    fn other_block_size_is_reported() -> Result<()> {
        let dir = tempdir()?;
        let file = StateFile::open(dir.path().join("spo.bpt"))?;
        let state = TreeState {
            root: BlockId(0),
            node_limit: 1,
            page_limit: 1,
        };
        file.write(&params(), &state)?;
        let err = file.read(&params().with_record_capacity(16)).unwrap_err();
        assert!(matches!(err, StoreError::BlockSizeMismatch { .. }), "{err:?}");
        let other_order = BPlusTreeParams::new(4, RecordFactory::for_tuples(3))
            .with_record_capacity(8);
        assert!(file.read(&other_order).is_err());
        Ok(())
    }

    #[test]
    fn flipped_byte_fails_checksum() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("spo.bpt");
        let file = StateFile::open(&path)?;
        let state = TreeState {
            root: BlockId(2),
            node_limit: 3,
            page_limit: 3,
        };
        file.write(&params(), &state)?;
        let io = StdFileIo::open(&path)?;
        io.write_at(33, &[0xFF])?;
        assert!(matches!(
            file.read(&params()),
            Err(StoreError::Corruption("tree state checksum mismatch"))
        ));
        Ok(())
    }

    #[test]
    fn tree_files_use_fixed_extensions() {
        let files = TreeFiles::new("/data", "POS");
        assert!(files.state.ends_with("POS.bpt"));
        assert!(files.nodes.ends_with("POS.idn"));
        assert!(files.pages.ends_with("POS.dat"));
    }
}
