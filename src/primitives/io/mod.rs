#![forbid(unsafe_code)]
//! Positioned file I/O used by the file-backed block manager and the tree state file.

use std::{fs::File, io, path::Path, sync::Arc};

use crate::types::{Result, StoreError};

/// Positioned reads and writes against a single file.
pub trait FileIo: Send + Sync + 'static {
    /// Reads exactly `dst.len()` bytes starting at `off`.
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()>;
    /// Writes all of `src` starting at `off`, extending the file if needed.
    fn write_at(&self, off: u64, src: &[u8]) -> Result<()>;
    /// Flushes data and metadata to stable storage.
    fn sync_all(&self) -> Result<()>;
    /// Current file length in bytes.
    fn len(&self) -> Result<u64>;
    /// True if the file has no bytes.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
    /// Truncates or extends the file.
    fn truncate(&self, len: u64) -> Result<()>;
}

#[cfg(unix)]
mod platform {
    use std::{fs::File, io, os::unix::fs::FileExt};

    pub fn read_exact(file: &File, off: u64, dst: &mut [u8]) -> io::Result<()> {
        file.read_exact_at(dst, off)
    }

    pub fn write_all(file: &File, off: u64, src: &[u8]) -> io::Result<()> {
        file.write_all_at(src, off)
    }
}

#[cfg(windows)]
mod platform {
    use std::{
        fs::File,
        io::{self, ErrorKind},
        os::windows::fs::FileExt,
    };

    pub fn read_exact(file: &File, off: u64, dst: &mut [u8]) -> io::Result<()> {
        let mut done = 0;
        while done < dst.len() {
            match file.seek_read(&mut dst[done..], off + done as u64)? {
                0 => return Err(ErrorKind::UnexpectedEof.into()),
                n => done += n,
            }
        }
        Ok(())
    }

    pub fn write_all(file: &File, off: u64, src: &[u8]) -> io::Result<()> {
        let mut done = 0;
        while done < src.len() {
            match file.seek_write(&src[done..], off + done as u64)? {
                0 => return Err(ErrorKind::WriteZero.into()),
                n => done += n,
            }
        }
        Ok(())
    }
}

/// [`FileIo`] over a shared `std::fs::File`.
#[derive(Clone)]
pub struct StdFileIo {
    inner: Arc<File>,
}

impl StdFileIo {
    /// Wraps an already opened file.
    pub fn new(file: File) -> Self {
        Self {
            inner: Arc::new(file),
        }
    }

    /// Opens `path` read-write, creating it when missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self::new(file))
    }

    fn file(&self) -> &File {
        &self.inner
    }
}

impl FileIo for StdFileIo {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        platform::read_exact(self.file(), off, dst).map_err(StoreError::from)
    }

    fn write_at(&self, off: u64, src: &[u8]) -> Result<()> {
        platform::write_all(self.file(), off, src).map_err(StoreError::from)
    }

    fn sync_all(&self) -> Result<()> {
        self.file().sync_all().map_err(StoreError::from)
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file().metadata()?.len())
    }

    fn truncate(&self, len: u64) -> Result<()> {
        self.file().set_len(len).map_err(StoreError::from)
    }
}

/// Maps an `UnexpectedEof` into [`StoreError::Corruption`] for readers of fixed layouts.
pub fn short_read_is_corruption(err: StoreError, what: &'static str) -> StoreError {
    match err {
        StoreError::Io(inner) if inner.kind() == io::ErrorKind::UnexpectedEof => {
            StoreError::Corruption(what)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;
    use tempfile::tempdir;

    #[test]
    fn write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let io = StdFileIo::open(dir.path().join("io.bin")).unwrap();

        let payload = b"spo pos osp";
        io.write_at(0, payload).unwrap();
        io.sync_all().unwrap();

        let mut buf = vec![0u8; payload.len()];
        io.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, payload);
        assert_eq!(io.len().unwrap(), payload.len() as u64);
    }

    #[test]
    fn read_past_eof_returns_error() {
        let dir = tempdir().unwrap();
        let io = StdFileIo::open(dir.path().join("io.bin")).unwrap();
        let mut buf = [0u8; 8];
        let err = io.read_at(0, &mut buf).unwrap_err();
        match err {
            StoreError::Io(inner) => assert_eq!(inner.kind(), ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn short_read_maps_to_corruption() {
        let dir = tempdir().unwrap();
        let io = StdFileIo::open(dir.path().join("io.bin")).unwrap();
        io.write_at(0, &[1, 2, 3]).unwrap();
        let mut buf = [0u8; 8];
        let err = io.read_at(0, &mut buf).unwrap_err();
        let mapped = short_read_is_corruption(err, "state file truncated");
        assert!(matches!(mapped, StoreError::Corruption("state file truncated")));
    }

    #[test]
    fn write_past_end_extends_file() {
        let dir = tempdir().unwrap();
        let io = StdFileIo::open(dir.path().join("blocks.bin")).unwrap();
        io.write_at(4096, &[7u8; 16]).unwrap();
        assert_eq!(io.len().unwrap(), 4096 + 16);
        let mut head = [1u8; 4];
        io.read_at(0, &mut head).unwrap();
        assert_eq!(head, [0u8; 4]);
        io.truncate(0).unwrap();
        assert!(io.is_empty().unwrap());
    }
}
