use super::TagId;
use std::io;

#[derive(Debug)]
pub enum TiffError {
    BadMagicBytes,
    Truncated {
        offset: u64,
        len: u64,
        total: u64,
    },
    NoIfd,
    MissingTag(TagId),
    BadTag(TagId),
    ReadError(io::Error),
}

impl From<io::Error> for TiffError {
    fn from(e: io::Error) -> Self {
        TiffError::ReadError(e)
    }
}
