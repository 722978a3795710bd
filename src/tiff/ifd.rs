use super::{Endian, Tag, TagData, TagId, TagType, TiffError, TiffVariant};
use crate::io::ReadRange;
use num_traits::NumCast;

#[derive(Clone, Debug, Default)]
pub struct Ifd(pub Vec<Tag>);

impl Ifd {
    /// Parse the directory at `offset`, returning it with the next directory offset.
    ///
    /// The entry table is fetched in one range read. Values wider than the
    /// entry's value field live elsewhere in the file and cost one extra read each.
    pub fn parse<R: ReadRange + ?Sized>(
        reader: &R,
        offset: u64,
        total: u64,
        endian: Endian,
        variant: TiffVariant,
    ) -> Result<(Ifd, u64), TiffError> {
        let count_size = variant.count_bytesize() as u64;
        let count_bytes = read_checked(reader, offset, count_size, total)?;
        let tag_count = variant
            .decode_count(endian, &count_bytes)
            .ok_or(TiffError::Truncated {
                offset,
                len: count_size,
                total,
            })?;

        let entry_size = variant.entry_bytesize() as u64;
        let offset_size = variant.offset_bytesize();
        let table_len = tag_count
            .checked_mul(entry_size)
            .and_then(|n| n.checked_add(offset_size as u64))
            .ok_or(TiffError::Truncated {
                offset,
                len: u64::MAX,
                total,
            })?;
        let table_start = offset + count_size;
        let table = read_checked(reader, table_start, table_len, total)?;

        let mut tags = Vec::with_capacity(tag_count as usize);
        for entry in table.chunks_exact(entry_size as usize) {
            let code: u16 = endian.decode([entry[0], entry[1]])?;
            let type_code: u16 = endian.decode([entry[2], entry[3]])?;
            let datatype = TagType::from(type_code);
            let count = variant
                .decode_offset(endian, &entry[4..4 + offset_size])
                .ok_or(TiffError::Truncated {
                    offset: table_start,
                    len: entry_size,
                    total,
                })?;
            let field = &entry[4 + offset_size..];

            let data_size = count
                .checked_mul(datatype.size_in_bytes() as u64)
                .ok_or(TiffError::Truncated {
                    offset: table_start,
                    len: u64::MAX,
                    total,
                })?;
            let data = if data_size > offset_size as u64 {
                let data_offset = variant.decode_offset(endian, field).ok_or(
                    TiffError::Truncated {
                        offset: table_start,
                        len: entry_size,
                        total,
                    },
                )?;
                read_checked(reader, data_offset, data_size, total)?
            } else {
                field[..data_size as usize].to_vec()
            };

            tags.push(Tag {
                code,
                datatype,
                endian,
                count: count as usize,
                data,
            });
        }

        let next_field = &table[table.len() - offset_size..];
        let next_ifd_offset = variant
            .decode_offset(endian, next_field)
            .ok_or(TiffError::NoIfd)?;

        Ok((Ifd(tags), next_ifd_offset))
    }

    pub fn get_tag(&self, id: TagId) -> Result<&Tag, TiffError> {
        let code: u16 = id.into();
        let Self(tags) = &self;
        tags.iter()
            .find(|tag| tag.code == code)
            .ok_or(TiffError::MissingTag(id))
    }

    pub fn get_tag_values<T: NumCast>(&self, id: TagId) -> Result<Vec<T>, TiffError> {
        self.get_tag(id)?.values().ok_or(TiffError::BadTag(id))
    }

    pub fn get_tag_value<T: NumCast + Copy>(&self, id: TagId) -> Result<T, TiffError> {
        self.get_tag(id)?.value_as().ok_or(TiffError::BadTag(id))
    }

    pub fn get_optional_value<T: NumCast + Copy>(&self, id: TagId) -> Result<Option<T>, TiffError> {
        match self.get_tag(id) {
            Ok(tag) => tag.value_as().map(Some).ok_or(TiffError::BadTag(id)),
            Err(TiffError::MissingTag(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn set_tag(&mut self, id: TagId, data: TagData, endian: Endian) {
        let tag = Tag::new(id, data, endian);
        let Self(tags) = self;
        match tags.iter().position(|t| t.code == tag.code) {
            Some(index) => tags[index] = tag,
            None => tags.push(tag),
        }
    }

    /// Serialize as the last directory of a file, starting at `offset`.
    ///
    /// Out of line values are packed directly after the entry table.
    pub fn encode(&self, offset: u64, endian: Endian, variant: TiffVariant) -> Vec<u8> {
        let mut tags: Vec<&Tag> = self.0.iter().collect();
        tags.sort_by_key(|tag| tag.code);

        let offset_size = variant.offset_bytesize();
        let table_len = variant.count_bytesize()
            + tags.len() * variant.entry_bytesize()
            + offset_size;

        let mut table = Vec::with_capacity(table_len);
        let mut extra: Vec<u8> = vec![];
        match variant {
            TiffVariant::Normal => table.extend(endian.encode(tags.len() as u16)),
            TiffVariant::Big => table.extend(endian.encode(tags.len() as u64)),
        }
        for tag in tags {
            table.extend(endian.encode(tag.code));
            let datatype: u16 = tag.datatype.into();
            table.extend(endian.encode(datatype));
            table.extend(variant.encode_offset(endian, tag.count as u64));
            if tag.data.len() > offset_size {
                let data_offset = offset + (table_len + extra.len()) as u64;
                table.extend(variant.encode_offset(endian, data_offset));
                extra.extend_from_slice(&tag.data);
                if extra.len() % 2 == 1 {
                    extra.push(0); // word alignment
                }
            } else {
                let mut field = tag.data.clone();
                field.resize(offset_size, 0);
                table.extend(field);
            }
        }
        table.extend(variant.encode_offset(endian, 0));
        table.extend(extra);
        table
    }
}

fn read_checked<R: ReadRange + ?Sized>(
    reader: &R,
    offset: u64,
    len: u64,
    total: u64,
) -> Result<Vec<u8>, TiffError> {
    match offset.checked_add(len) {
        Some(end) if end <= total => Ok(reader.read_range_to_vec(offset, end)?),
        _ => Err(TiffError::Truncated { offset, len, total }),
    }
}
