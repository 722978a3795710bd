use super::ReadRange;
use std::collections::VecDeque;
use std::io::{Error, Result};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::*;

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
const DEFAULT_CACHED_CHUNKS: usize = 4;

/// Rounds reads out to fixed size chunks and keeps the most recently used
/// chunks, so the small sequential reads of header and directory parsing do
/// not each become a round trip.
#[derive(Debug)]
pub struct ChunkedReader<R> {
    inner: R,
    chunk_size: u64,
    capacity: usize,
    cache: Mutex<VecDeque<(u64, Arc<Vec<u8>>)>>,
    length: OnceLock<u64>,
}

impl<R: ReadRange> ChunkedReader<R> {
    pub fn new(inner: R, chunk_size: usize) -> Self {
        Self {
            inner,
            chunk_size: chunk_size.max(1) as u64,
            capacity: DEFAULT_CACHED_CHUNKS,
            cache: Mutex::new(VecDeque::with_capacity(DEFAULT_CACHED_CHUNKS)),
            length: OnceLock::new(),
        }
    }

    pub fn with_capacity(mut self, chunks: usize) -> Self {
        self.capacity = chunks.max(1);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size as usize
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn chunk(&self, index: u64, total: u64) -> Result<Arc<Vec<u8>>> {
        {
            let mut cache = self.cache.lock().map_err(|e| Error::other(format!("{e:?}")))?;
            if let Some(pos) = cache.iter().position(|(i, _)| *i == index) {
                trace!("chunk {index} hit");
                let entry = cache.remove(pos).ok_or_else(|| Error::other("chunk cache"))?;
                let bytes = entry.1.clone();
                cache.push_front(entry);
                return Ok(bytes);
            }
        }

        trace!("chunk {index} miss");
        let start = index * self.chunk_size;
        let end = (start + self.chunk_size).min(total);
        let bytes = Arc::new(self.inner.read_range_to_vec(start, end)?);

        let mut cache = self.cache.lock().map_err(|e| Error::other(format!("{e:?}")))?;
        cache.retain(|(i, _)| *i != index);
        cache.push_front((index, bytes.clone()));
        cache.truncate(self.capacity);
        Ok(bytes)
    }
}

impl<R: ReadRange> ReadRange for ChunkedReader<R> {
    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize> {
        let total = self.total_length()?;
        if start >= total || buf.is_empty() {
            return Ok(0);
        }
        let end = (start + buf.len() as u64).min(total);

        let first = start / self.chunk_size;
        let last = (end - 1) / self.chunk_size;
        for index in first..=last {
            let chunk = self.chunk(index, total)?;
            let chunk_start = index * self.chunk_size;
            let from = start.max(chunk_start);
            let to = end.min(chunk_start + chunk.len() as u64);
            if to <= from {
                break;
            }
            let src = &chunk[(from - chunk_start) as usize..(to - chunk_start) as usize];
            let dst = (from - start) as usize;
            buf[dst..dst + src.len()].copy_from_slice(src);
        }

        Ok((end - start) as usize)
    }

    fn total_length(&self) -> Result<u64> {
        if let Some(length) = self.length.get() {
            return Ok(*length);
        }
        let length = self.inner.total_length()?;
        Ok(*self.length.get_or_init(|| length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        data: Vec<u8>,
        reads: AtomicUsize,
    }

    impl ReadRange for Counting {
        fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.data.read_range(start, buf)
        }

        fn total_length(&self) -> Result<u64> {
            Ok(self.data.len() as u64)
        }
    }

    fn counting(n: usize) -> Counting {
        Counting {
            data: (0..n).map(|i| (i % 251) as u8).collect(),
            reads: AtomicUsize::new(0),
        }
    }

    #[test]
    fn overlapping_reads_hit_the_cache() {
        let reader = ChunkedReader::new(counting(1000), 100);
        assert_eq!(reader.read_range_to_vec(10, 20).unwrap(), (10..20).collect::<Vec<u8>>());
        assert_eq!(reader.read_range_to_vec(20, 40).unwrap(), (20..40).collect::<Vec<u8>>());
        assert_eq!(reader.inner.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reads_spanning_chunks() {
        let reader = ChunkedReader::new(counting(1000), 100);
        let bytes = reader.read_range_to_vec(95, 305).unwrap();
        let expected: Vec<u8> = (95..305).map(|i| (i % 251) as u8).collect();
        assert_eq!(bytes, expected);
        assert_eq!(reader.inner.reads.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn last_chunk_is_short() {
        let reader = ChunkedReader::new(counting(250), 100);
        assert_eq!(reader.read_range_to_vec(240, 250).unwrap().len(), 10);
        assert!(reader.read_range_to_vec(240, 260).is_err());
    }

    #[test]
    fn least_recently_used_chunk_is_evicted() {
        let reader = ChunkedReader::new(counting(1000), 100).with_capacity(2);
        reader.read_range_to_vec(0, 1).unwrap(); // chunk 0
        reader.read_range_to_vec(100, 101).unwrap(); // chunk 1
        reader.read_range_to_vec(0, 1).unwrap(); // chunk 0 hit
        reader.read_range_to_vec(200, 201).unwrap(); // chunk 2 evicts chunk 1
        assert_eq!(reader.inner.reads.load(Ordering::SeqCst), 3);
        reader.read_range_to_vec(0, 1).unwrap();
        assert_eq!(reader.inner.reads.load(Ordering::SeqCst), 3);
        reader.read_range_to_vec(100, 101).unwrap();
        assert_eq!(reader.inner.reads.load(Ordering::SeqCst), 4);
    }
}
