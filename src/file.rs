//! File abstractions for the filter cache.
//!
//! Filter units are fetched with positional reads: several loads on the same
//! reader may be in flight from different threads, so the file abstraction
//! must serve disjoint ranges concurrently without a shared cursor.

use std::fs::File;
use std::path::Path;
#[cfg(not(unix))]
use std::sync::Mutex;

use crate::error::Result;
use crate::{errcorrupt, errinput};

/// A file readable at arbitrary offsets from multiple threads.
pub trait RandomAccessFile: Send + Sync {
    /// Reads exactly `buf.len()` bytes starting at `offset`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;
}

/// A filesystem-backed random access file.
pub struct FsFile {
    #[cfg(unix)]
    file: File,
    #[cfg(not(unix))]
    file: Mutex<File>,
}

impl FsFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        #[cfg(not(unix))]
        let file = Mutex::new(file);
        Ok(Self { file })
    }
}

#[cfg(unix)]
impl RandomAccessFile for FsFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }
}

#[cfg(not(unix))]
impl RandomAccessFile for FsFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }
}

/// An in-memory write sink tracking its running offset, for tests and for
/// building filter sections before they are appended to a table file.
#[derive(Default)]
pub struct StringSink {
    contents: Vec<u8>,
}

impl StringSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, data: &[u8]) {
        self.contents.extend_from_slice(data);
    }

    /// The offset the next append will land at.
    pub fn offset(&self) -> u64 {
        self.contents.len() as u64
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    pub fn into_contents(self) -> Vec<u8> {
        self.contents
    }
}

/// An in-memory random access file over a byte string.
pub struct StringSource {
    contents: Vec<u8>,
}

impl StringSource {
    pub fn new(contents: &[u8]) -> Self {
        Self {
            contents: contents.to_vec(),
        }
    }

    pub fn size(&self) -> u64 {
        self.contents.len() as u64
    }
}

impl RandomAccessFile for StringSource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let len = self.contents.len() as u64;
        if offset > len {
            return errinput!("read offset {offset} past end of file ({len})");
        }
        if offset + buf.len() as u64 > len {
            return errcorrupt!(
                "short read: {} bytes at offset {offset}, file holds {len}",
                buf.len()
            );
        }
        let start = offset as usize;
        buf.copy_from_slice(&self.contents[start..start + buf.len()]);
        Ok(())
    }
}
