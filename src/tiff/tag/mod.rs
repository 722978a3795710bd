// refs
// https://web.archive.org/web/20220119170528/http://www.exif.org/Exif2-2.PDF
// https://www.awaresystems.be/imaging/tiff/tifftags.html

use super::Endian;
use num_enum::{FromPrimitive, IntoPrimitive};
use num_traits::NumCast;
use std::fmt::Display;

mod data;
mod id;
mod value;

pub use data::TagData;
pub use id::TagId;
pub use value::TagValue;

#[derive(Clone, Debug)]
pub struct Tag {
    pub code: u16,
    pub datatype: TagType,
    pub count: usize,
    pub data: Vec<u8>,
    pub endian: Endian,
}

impl Tag {
    pub fn new(id: TagId, data: TagData, endian: Endian) -> Self {
        Self {
            code: id.into(),
            datatype: data.tag_type(),
            count: data.len(),
            data: data.bytes(endian),
            endian,
        }
    }

    pub fn id(&self) -> Option<TagId> {
        TagId::try_from(self.code).ok()
    }

    pub fn value(&self) -> TagValue {
        TagValue::from(self)
    }

    /// All values coerced to `T`, `None` for non-numeric tags or lossy casts.
    pub fn values<T: NumCast>(&self) -> Option<Vec<T>> {
        let e = self.endian;
        let bytes = self.data.as_slice();
        match self.datatype {
            TagType::Byte | TagType::Undefined => bytes.iter().map(|v| T::from(*v)).collect(),
            TagType::SByte => bytes.iter().map(|v| T::from(*v as i8)).collect(),
            TagType::Short => e.decode_all_to_primative::<2, u16, T>(bytes),
            TagType::SShort => e.decode_all_to_primative::<2, i16, T>(bytes),
            TagType::Long | TagType::Ifd => e.decode_all_to_primative::<4, u32, T>(bytes),
            TagType::SLong => e.decode_all_to_primative::<4, i32, T>(bytes),
            TagType::Long8 | TagType::Ifd8 => e.decode_all_to_primative::<8, u64, T>(bytes),
            TagType::SLong8 => e.decode_all_to_primative::<8, i64, T>(bytes),
            TagType::Float => e.decode_all_to_primative::<4, f32, T>(bytes),
            TagType::Double => e.decode_all_to_primative::<8, f64, T>(bytes),
            TagType::Rational => bytes
                .chunks_exact(8)
                .map(|c| {
                    let n: u32 = e.decode_slice::<4, u32>(&c[..4])?;
                    let d: u32 = e.decode_slice::<4, u32>(&c[4..])?;
                    T::from(n as f64 / d as f64)
                })
                .collect(),
            TagType::SRational => bytes
                .chunks_exact(8)
                .map(|c| {
                    let n: i32 = e.decode_slice::<4, i32>(&c[..4])?;
                    let d: i32 = e.decode_slice::<4, i32>(&c[4..])?;
                    T::from(n as f64 / d as f64)
                })
                .collect(),
            TagType::Ascii | TagType::Unknown => None,
        }
    }

    pub fn value_as<T: NumCast + Copy>(&self) -> Option<T> {
        self.values::<T>()?.first().copied()
    }

    /// ASCII payload with the trailing NUL terminator(s) stripped.
    pub fn as_string(&self) -> Option<String> {
        if self.datatype != TagType::Ascii {
            return None;
        }
        let text = String::from_utf8_lossy(&self.data);
        Some(text.trim_end_matches('\0').to_string())
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut value_string = format!("{}", self.value());
        if value_string.len() > 100 {
            let cut = (0..=98)
                .rev()
                .find(|i| value_string.is_char_boundary(*i))
                .unwrap_or(0);
            value_string = format!("{}...", &value_string[..cut])
        }
        let id_string = match self.id() {
            Some(id) => format!("{id:?}"),
            None => format!("Unknown({})", self.code),
        };
        write!(
            f,
            "{} {:?}[{}]: {}",
            id_string, self.datatype, self.count, value_string
        )
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum TagType {
    Byte = 1,
    Ascii = 2,
    Short = 3,
    Long = 4,
    Rational = 5,
    SByte = 6,
    Undefined = 7,
    SShort = 8,
    SLong = 9,
    SRational = 10,
    Float = 11,
    Double = 12,
    Ifd = 13,
    Long8 = 16,
    SLong8 = 17,
    Ifd8 = 18,

    #[num_enum(default)]
    Unknown = 0xFFFF,
}

impl TagType {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            TagType::Byte => 1,
            TagType::Ascii => 1,
            TagType::Short => 2,
            TagType::Long => 4,
            TagType::Rational => 8,
            TagType::SByte => 1,
            TagType::Undefined => 1,
            TagType::SShort => 2,
            TagType::SLong => 4,
            TagType::SRational => 8,
            TagType::Float => 4,
            TagType::Double => 8,
            TagType::Ifd => 4,
            TagType::Long8 => 8,
            TagType::SLong8 => 8,
            TagType::Ifd8 => 8,

            TagType::Unknown => 1,
        }
    }
}
