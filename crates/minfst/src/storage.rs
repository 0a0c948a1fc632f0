// Addressable byte resources backing encoded transducers.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

/// Appends are buffered up to this many bytes before hitting the file.
const FILE_APPEND_THRESHOLD: usize = 64 * 1024;

/// An addressable, growable byte sequence.
///
/// Memory and file backed implementations are interchangeable wherever the
/// engine reads or writes encoded transducers. Reads take `&mut self` because
/// file-backed storage seeks; callers that share a storage across lookups
/// wrap it (see [`PersistentFst`](crate::persistent::PersistentFst)).
pub trait Storage {
    /// Current length in bytes, including appended data not yet flushed.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `buf` with the bytes starting at `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Overwrite bytes at `offset`, growing the storage if needed.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;

    /// Append `data` at the end and return the offset it was written at.
    fn append(&mut self, data: &[u8]) -> io::Result<u64>;

    /// Durability barrier: everything written so far is persisted.
    fn flush(&mut self) -> io::Result<()>;

    /// Flush and release the resource, surfacing the final flush error.
    fn close(mut self) -> io::Result<()>
    where
        Self: Sized,
    {
        self.flush()
    }
}

impl<S: Storage + ?Sized> Storage for &mut S {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        (**self).write_at(offset, data)
    }

    fn append(&mut self, data: &[u8]) -> io::Result<u64> {
        (**self).append(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Ephemeral storage over a `Vec<u8>`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    data: Vec<u8>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

fn out_of_range(offset: u64, len: usize, size: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("read of {len} bytes at offset {offset} past end of storage ({size} bytes)"),
    )
}

impl Storage for MemoryStorage {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let size = self.len();
        let end = offset
            .checked_add(buf.len() as u64)
            .filter(|&end| end <= size)
            .ok_or_else(|| out_of_range(offset, buf.len(), size))?;
        buf.copy_from_slice(&self.data[offset as usize..end as usize]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset overflows usize"))?;
        let end = start + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> io::Result<u64> {
        let offset = self.len();
        self.data.extend_from_slice(data);
        Ok(offset)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Durable storage over a file.
///
/// The handle is exclusive to this value. Appends are buffered and drained
/// before any read or overwrite, so reads always observe every prior write;
/// [`flush`](Storage::flush) additionally forces the data to disk.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    file: File,
    /// Bytes already handed to the OS.
    written: u64,
    pending: Vec<u8>,
    writable: bool,
}

impl FileStorage {
    /// Create (or truncate) a file for writing and reading.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        debug!("event=storage_create path={}", path.display());
        Ok(Self {
            path,
            file,
            written: 0,
            pending: Vec::with_capacity(FILE_APPEND_THRESHOLD),
            writable: true,
        })
    }

    /// Open an existing file read-only.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().read(true).open(&path)?;
        let written = file.metadata()?.len();
        debug!(
            "event=storage_open path={} bytes={}",
            path.display(),
            written
        );
        Ok(Self {
            path,
            file,
            written,
            pending: Vec::new(),
            writable: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn drain(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.file.seek(SeekFrom::Start(self.written))?;
        self.file.write_all(&self.pending)?;
        self.written += self.pending.len() as u64;
        self.pending.clear();
        Ok(())
    }
}

impl Storage for FileStorage {
    fn len(&self) -> u64 {
        self.written + self.pending.len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.drain()?;
        let size = self.written;
        if offset.saturating_add(buf.len() as u64) > size {
            return Err(out_of_range(offset, buf.len(), size));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.drain()?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.written = self.written.max(offset + data.len() as u64);
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> io::Result<u64> {
        let offset = self.len();
        self.pending.extend_from_slice(data);
        if self.pending.len() >= FILE_APPEND_THRESHOLD {
            self.drain()?;
        }
        Ok(offset)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain()?;
        if self.writable {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

impl Drop for FileStorage {
    fn drop(&mut self) {
        if let Err(e) = self.drain() {
            warn!(
                "event=storage_drop_failed path={} error={}",
                self.path.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn exercise(storage: &mut impl Storage) {
        assert!(storage.is_empty());
        assert_eq!(storage.append(b"hello").unwrap(), 0);
        assert_eq!(storage.append(b" world").unwrap(), 5);
        assert_eq!(storage.len(), 11);

        let mut buf = [0u8; 5];
        storage.read_at(6, &mut buf).unwrap();
        assert_eq!(&buf, b"world");

        storage.write_at(0, b"J").unwrap();
        storage.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"Jello");

        let err = storage.read_at(8, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        storage.flush().unwrap();
    }

    #[test]
    fn memory_storage_contract() {
        let mut storage = MemoryStorage::new();
        exercise(&mut storage);
        assert_eq!(storage.into_inner(), b"Jello world");
    }

    #[test]
    fn memory_storage_write_past_end_grows() {
        let mut storage = MemoryStorage::from_bytes(vec![1u8, 2]);
        storage.write_at(4, &[9]).unwrap();
        assert_eq!(storage.as_bytes(), &[1, 2, 0, 0, 9]);
    }

    #[test]
    fn file_storage_contract() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let mut storage = FileStorage::create(&path).unwrap();
        exercise(&mut storage);
        storage.close().unwrap();

        assert!(path.is_file());
        let mut reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.len(), 11);
        let mut buf = [0u8; 11];
        reopened.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"Jello world");
    }

    #[test]
    fn file_storage_drains_large_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let mut storage = FileStorage::create(&path).unwrap();
        let chunk = vec![0xABu8; FILE_APPEND_THRESHOLD + 10];
        storage.append(&chunk).unwrap();
        assert!(storage.pending.is_empty());
        assert_eq!(storage.len(), chunk.len() as u64);
    }

    #[test]
    fn file_storage_drop_persists_pending_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dropped.bin");
        {
            let mut storage = FileStorage::create(&path).unwrap();
            storage.append(b"abc").unwrap();
        }
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempdir().unwrap();
        let err = FileStorage::open(dir.path().join("missing.fst")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
