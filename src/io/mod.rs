// I/O Traits
//   ReadRange is stateless, offset addressed I/O over any backing store
//   Key difference from Read + Seek is that self is immutable, so one reader
//   can serve the metadata parse and every segment read of a work item
//   Required methods
//     fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize>
//     fn total_length(&self) -> Result<u64>
//   Provided methods
//     fn read_range_exact(&self, start: u64, buf: &mut [u8]) -> Result<()>
//     fn read_range_to_vec(&self, start: u64, end: u64) -> Result<Vec<u8>>

use std::io::{Error, ErrorKind, Read, Result, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

mod chunked;
mod fs;
#[cfg(feature = "http")]
mod http;
mod store;

pub use chunked::{ChunkedReader, DEFAULT_CHUNK_SIZE};
pub use fs::PathReader;
#[cfg(feature = "http")]
pub use http::{HttpReader, HttpStore};
pub use store::{BackingStore, FileSystemStore, MemoryStore, RasterLocator, StoreFactory};

pub trait ReadRange: Send + Sync {
    /// Read bytes from a specific offset
    ///
    /// Returns the number of bytes read, which may be short of `buf.len()`.
    /// Transport failures surface as `io::Error`, retries belong to the store.
    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize>;

    /// Total size of the underlying object in bytes
    fn total_length(&self) -> Result<u64>;

    fn read_range_exact(&self, start: u64, buf: &mut [u8]) -> Result<()> {
        let n = buf.len();
        let mut filled = 0;
        while filled < n {
            let bytes_read = self.read_range(start + filled as u64, &mut buf[filled..])?;
            if bytes_read == 0 {
                return Err(Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("Failed to completely fill buffer: {filled} < {n}"),
                ));
            }
            filled += bytes_read;
        }
        Ok(())
    }

    fn read_range_to_vec(&self, start: u64, end: u64) -> Result<Vec<u8>> {
        if end < start {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Invalid byte range {start}..{end}"),
            ));
        }
        let mut buf = vec![0; (end - start) as usize];
        self.read_range_exact(start, &mut buf)?;
        Ok(buf)
    }
}

impl<R: ReadRange + ?Sized> ReadRange for Box<R> {
    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize> {
        (**self).read_range(start, buf)
    }

    fn total_length(&self) -> Result<u64> {
        (**self).total_length()
    }
}

impl<R: ReadRange + ?Sized> ReadRange for Arc<R> {
    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize> {
        (**self).read_range(start, buf)
    }

    fn total_length(&self) -> Result<u64> {
        (**self).total_length()
    }
}

impl<R: ReadRange + ?Sized> ReadRange for &R {
    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize> {
        (**self).read_range(start, buf)
    }

    fn total_length(&self) -> Result<u64> {
        (**self).total_length()
    }
}

impl ReadRange for [u8] {
    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize> {
        let start = usize::try_from(start).unwrap_or(usize::MAX).min(self.len());
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }

    fn total_length(&self) -> Result<u64> {
        Ok(self.len() as u64)
    }
}

impl ReadRange for Vec<u8> {
    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize> {
        self.as_slice().read_range(start, buf)
    }

    fn total_length(&self) -> Result<u64> {
        Ok(self.len() as u64)
    }
}

impl<R: Read + Seek + Send> ReadRange for Mutex<R> {
    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize> {
        let mut locked_self = self
            .lock()
            .map_err(|e| Error::other(format!("{e:?}")))?;
        locked_self.seek(SeekFrom::Start(start))?;
        locked_self.read(buf)
    }

    fn total_length(&self) -> Result<u64> {
        let mut locked_self = self
            .lock()
            .map_err(|e| Error::other(format!("{e:?}")))?;
        locked_self.seek(SeekFrom::End(0))
    }
}
