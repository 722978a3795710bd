use crate::io::ReadRange;
use std::collections::HashSet;
use std::fmt::Display;
use tracing::*;

mod endian;
mod error;
mod ifd;
mod tag;

pub use endian::Endian;
pub use error::TiffError;
pub use ifd::Ifd;
pub use tag::{Tag, TagData, TagId, TagType, TagValue};

const MAX_IFDS: usize = 4096;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum TiffVariant {
    Normal,
    Big,
}

impl TiffVariant {
    pub const fn offset_bytesize(&self) -> usize {
        match self {
            TiffVariant::Normal => 4,
            TiffVariant::Big => 8,
        }
    }

    pub const fn count_bytesize(&self) -> usize {
        match self {
            TiffVariant::Normal => 2,
            TiffVariant::Big => 8,
        }
    }

    pub const fn entry_bytesize(&self) -> usize {
        match self {
            TiffVariant::Normal => 12,
            TiffVariant::Big => 20,
        }
    }

    pub const fn header_bytesize(&self) -> usize {
        match self {
            TiffVariant::Normal => 8,
            TiffVariant::Big => 16,
        }
    }

    pub fn decode_offset(&self, endian: Endian, bytes: &[u8]) -> Option<u64> {
        match self {
            TiffVariant::Normal => endian.decode_slice::<4, u32>(bytes).map(|v| v as u64),
            TiffVariant::Big => endian.decode_slice::<8, u64>(bytes),
        }
    }

    pub fn decode_count(&self, endian: Endian, bytes: &[u8]) -> Option<u64> {
        match self {
            TiffVariant::Normal => endian.decode_slice::<2, u16>(bytes).map(|v| v as u64),
            TiffVariant::Big => endian.decode_slice::<8, u64>(bytes),
        }
    }

    pub fn encode_offset(&self, endian: Endian, offset: u64) -> Vec<u8> {
        match self {
            TiffVariant::Normal => endian.encode(offset as u32).to_vec(),
            TiffVariant::Big => endian.encode(offset).to_vec(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Tiff {
    pub endian: Endian,
    pub variant: TiffVariant,
    pub ifds: Vec<Ifd>,
}

impl Tiff {
    /// Index a TIFF through range reads of the header and directories only.
    ///
    /// A broken directory after the first ends the chain.
    pub fn open<R: ReadRange + ?Sized>(reader: &R) -> Result<Self, TiffError> {
        Self::open_with_limit(reader, MAX_IFDS)
    }

    /// Like `open`, reading IFD0 only.
    pub fn open_primary<R: ReadRange + ?Sized>(reader: &R) -> Result<Self, TiffError> {
        Self::open_with_limit(reader, 1)
    }

    fn open_with_limit<R: ReadRange + ?Sized>(
        reader: &R,
        max_ifds: usize,
    ) -> Result<Self, TiffError> {
        let total = reader.total_length()?;
        if total < TiffVariant::Normal.header_bytesize() as u64 {
            return Err(TiffError::Truncated {
                offset: 0,
                len: TiffVariant::Normal.header_bytesize() as u64,
                total,
            });
        }

        // TIFF Header
        let header_len = total.min(TiffVariant::Big.header_bytesize() as u64);
        let header = reader.read_range_to_vec(0, header_len)?;

        let endian = match &header[..2] {
            b"II" => Endian::Little,
            b"MM" => Endian::Big,
            _ => return Err(TiffError::BadMagicBytes),
        };

        let version: u16 = endian.decode([header[2], header[3]])?;
        let variant = match version {
            42 => TiffVariant::Normal,
            43 => TiffVariant::Big,
            _ => return Err(TiffError::BadMagicBytes),
        };

        if TiffVariant::Big == variant {
            // BigTIFFs have 8 extra bytes in the header
            if header.len() < variant.header_bytesize() {
                return Err(TiffError::Truncated {
                    offset: 0,
                    len: variant.header_bytesize() as u64,
                    total,
                });
            }
            let offset_bytesize: u16 = endian.decode([header[4], header[5]])?;
            if offset_bytesize != 8 {
                return Err(TiffError::BadMagicBytes);
            }
        }

        let first_offset_at = match variant {
            TiffVariant::Normal => 4,
            TiffVariant::Big => 8,
        };
        let mut ifd_offset = variant
            .decode_offset(endian, &header[first_offset_at..])
            .ok_or(TiffError::NoIfd)?;

        // IFDs
        let mut ifds = vec![];
        let mut visited = HashSet::new();
        while ifd_offset != 0 && ifds.len() < max_ifds {
            if !visited.insert(ifd_offset) {
                warn!("IFD chain loops back to offset {ifd_offset}, ignoring the rest");
                break;
            }
            let (ifd, next_offset) = match Ifd::parse(reader, ifd_offset, total, endian, variant) {
                Ok(parsed) => parsed,
                Err(TiffError::ReadError(e)) => return Err(TiffError::ReadError(e)),
                Err(e) if !ifds.is_empty() => {
                    warn!(
                        "IFD {} at offset {ifd_offset} is unreadable ({e:?}), ignoring the rest",
                        ifds.len()
                    );
                    break;
                }
                Err(e) => return Err(e),
            };
            ifd_offset = next_offset;
            ifds.push(ifd);
        }

        if ifds.is_empty() {
            return Err(TiffError::NoIfd);
        }
        debug!("Indexed {variant:?} TIFF with {} IFDs", ifds.len());

        Ok(Self {
            endian,
            variant,
            ifds,
        })
    }

    pub fn new(endian: Endian, variant: TiffVariant) -> Self {
        Self {
            endian,
            variant,
            ifds: vec![Ifd::default()],
        }
    }

    pub fn ifd0(&self) -> Result<&Ifd, TiffError> {
        self.ifds.first().ok_or(TiffError::NoIfd)
    }

    pub fn ifd0_mut(&mut self) -> Result<&mut Ifd, TiffError> {
        self.ifds.first_mut().ok_or(TiffError::NoIfd)
    }

    pub fn encode_header(&self, first_ifd_offset: u64) -> Vec<u8> {
        let endian = self.endian;
        let mut header = endian.magic().to_vec();
        match self.variant {
            TiffVariant::Normal => header.extend(endian.encode(42u16)),
            TiffVariant::Big => {
                header.extend(endian.encode(43u16));
                header.extend(endian.encode(8u16));
                header.extend(endian.encode(0u16));
            }
        }
        header.extend(self.variant.encode_offset(endian, first_ifd_offset));
        header
    }
}

impl Display for Tiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, ifd) in self.ifds.iter().enumerate() {
            writeln!(f, "IFD {i}:")?;
            for tag in ifd.0.iter() {
                writeln!(f, "\t{}", tag)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_ifd(endian: Endian, variant: TiffVariant) -> Vec<u8> {
        let mut tiff = Tiff::new(endian, variant);
        let ifd = tiff.ifd0_mut().unwrap();
        ifd.set_tag(TagId::ImageWidth, TagData::from_long(7), endian);
        ifd.set_tag(TagId::ImageHeight, TagData::from_short(3), endian);
        ifd.set_tag(
            TagId::Software,
            TagData::from_string("a description long enough to be out of line"),
            endian,
        );
        let offset = variant.header_bytesize() as u64;
        let mut bytes = tiff.encode_header(offset);
        bytes.extend(tiff.ifds[0].encode(offset, endian, variant));
        bytes
    }

    #[test]
    fn parses_classic_and_big_in_both_byte_orders() {
        for endian in [Endian::Little, Endian::Big] {
            for variant in [TiffVariant::Normal, TiffVariant::Big] {
                let bytes = single_ifd(endian, variant);
                let tiff = Tiff::open(&bytes).unwrap();
                assert_eq!(tiff.endian, endian);
                assert_eq!(tiff.variant, variant);
                let ifd = tiff.ifd0().unwrap();
                assert_eq!(ifd.get_tag_value::<u32>(TagId::ImageWidth).unwrap(), 7);
                assert_eq!(ifd.get_tag_value::<u32>(TagId::ImageHeight).unwrap(), 3);
                assert_eq!(
                    ifd.get_tag(TagId::Software).unwrap().as_string().unwrap(),
                    "a description long enough to be out of line"
                );
            }
        }
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = single_ifd(Endian::Little, TiffVariant::Normal);
        bytes[0] = b'X';
        assert!(matches!(Tiff::open(&bytes), Err(TiffError::BadMagicBytes)));

        let mut bytes = single_ifd(Endian::Little, TiffVariant::Normal);
        bytes[2] = 41;
        assert!(matches!(Tiff::open(&bytes), Err(TiffError::BadMagicBytes)));
    }

    #[test]
    fn truncated_directory_is_detected() {
        let bytes = single_ifd(Endian::Big, TiffVariant::Normal);
        let cut = bytes[..20].to_vec();
        assert!(matches!(Tiff::open(&cut), Err(TiffError::Truncated { .. })));
        assert!(matches!(
            Tiff::open(&bytes[..5].to_vec()),
            Err(TiffError::Truncated { .. })
        ));
    }

    #[test]
    fn looping_ifd_chain_terminates() {
        let mut bytes = single_ifd(Endian::Little, TiffVariant::Normal);
        // point the next-IFD field of IFD0 back at itself
        let tag_count = 3;
        let next_at = 8 + 2 + tag_count * 12;
        bytes[next_at..next_at + 4].copy_from_slice(&8u32.to_le_bytes());
        let tiff = Tiff::open(&bytes).unwrap();
        assert_eq!(tiff.ifds.len(), 1);
    }

    #[test]
    fn dangling_next_ifd_keeps_the_first() {
        let mut bytes = single_ifd(Endian::Little, TiffVariant::Normal);
        let next_at = 8 + 2 + 3 * 12;
        bytes[next_at..next_at + 4].copy_from_slice(&0x00FF_FFF0u32.to_le_bytes());

        let tiff = Tiff::open(&bytes).unwrap();
        assert_eq!(tiff.ifds.len(), 1);
        assert_eq!(
            tiff.ifd0().unwrap().get_tag_value::<u32>(TagId::ImageWidth).unwrap(),
            7
        );
        assert_eq!(Tiff::open_primary(&bytes).unwrap().ifds.len(), 1);

        // a dangling first pointer is still an error
        bytes[4..8].copy_from_slice(&0x00FF_FFF0u32.to_le_bytes());
        assert!(matches!(Tiff::open(&bytes), Err(TiffError::Truncated { .. })));
    }
}
