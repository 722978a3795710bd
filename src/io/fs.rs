use super::ReadRange;
use std::fs::File;
use std::io::Result;
use std::path::{Path, PathBuf};

#[cfg(unix)]
impl ReadRange for File {
    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize> {
        use std::os::unix::fs::FileExt;
        self.read_at(buf, start)
    }

    fn total_length(&self) -> Result<u64> {
        Ok(self.metadata()?.len())
    }
}

#[cfg(not(unix))]
impl ReadRange for File {
    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize> {
        use std::io::{Read, Seek, SeekFrom};
        let mut file_clone = self.try_clone()?;
        file_clone.seek(SeekFrom::Start(start))?;
        file_clone.read(buf)
    }

    fn total_length(&self) -> Result<u64> {
        Ok(self.metadata()?.len())
    }
}

/// Opens the file on every read, so it can be shipped to a worker as a path.
#[derive(Clone, Debug)]
pub struct PathReader(PathBuf);

impl PathReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self(path.as_ref().to_path_buf())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl ReadRange for PathReader {
    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize> {
        File::open(&self.0)?.read_range(start, buf)
    }

    fn total_length(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.0)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn path_reader_reads_ranges() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        let reader = PathReader::new(file.path());
        assert_eq!(reader.total_length().unwrap(), 10);
        assert_eq!(reader.read_range_to_vec(3, 6).unwrap(), b"345");
    }

    #[test]
    fn missing_file_is_io_error() {
        let reader = PathReader::new("/definitely/not/here.tif");
        assert!(reader.read_range_to_vec(0, 4).is_err());
    }
}
