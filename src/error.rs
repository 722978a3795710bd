use crate::compression::{Compression, DecompressError};
use crate::tiff::TiffError;
use std::fmt;
use std::io;

pub type WindowResult<T> = Result<T, WindowError>;

#[derive(Debug)]
pub enum WindowError {
    Io(io::Error),
    MalformedMetadata(String),
    CorruptSegment { index: usize, reason: String },
    UnsupportedLayout(String),
    UnsupportedCompression(Compression),
    MissingTimestamp { tag: String },
    TimestampParse {
        tag: String,
        value: String,
        format: String,
    },
    InvalidOptions(String),
    WindowOutOfBounds {
        window: (u32, u32, u32, u32),
        raster: (u32, u32),
    },
}

impl WindowError {
    pub(crate) fn corrupt_segment(index: usize, e: DecompressError) -> Self {
        match e {
            DecompressError::CompressionNotSupported(c) => WindowError::UnsupportedCompression(c),
            DecompressError::IoError(e) => WindowError::CorruptSegment {
                index,
                reason: e.to_string(),
            },
            e => WindowError::CorruptSegment {
                index,
                reason: format!("{e:?}"),
            },
        }
    }
}

impl fmt::Display for WindowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for WindowError {}

impl From<TiffError> for WindowError {
    fn from(e: TiffError) -> Self {
        match e {
            TiffError::ReadError(io_error) => WindowError::Io(io_error),
            tiff_error => WindowError::MalformedMetadata(format!("{tiff_error:?}")),
        }
    }
}

impl From<io::Error> for WindowError {
    fn from(e: io::Error) -> Self {
        WindowError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_errors_stay_io() {
        let e: WindowError = TiffError::ReadError(io::Error::other("reset")).into();
        assert!(matches!(e, WindowError::Io(_)));
        let e: WindowError = TiffError::BadMagicBytes.into();
        assert!(matches!(e, WindowError::MalformedMetadata(_)));
    }

    #[test]
    fn codec_errors_split_by_kind() {
        let e = WindowError::corrupt_segment(3, DecompressError::CompressionNotSupported(Compression::Jpeg));
        assert!(matches!(e, WindowError::UnsupportedCompression(Compression::Jpeg)));
        let e = WindowError::corrupt_segment(
            3,
            DecompressError::LengthMismatch {
                expected: 4,
                actual: 2,
            },
        );
        assert!(matches!(e, WindowError::CorruptSegment { index: 3, .. }));
    }
}
