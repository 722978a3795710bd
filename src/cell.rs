use crate::tiff::Endian;
use num_traits::{AsPrimitive, NumCast};
use std::fmt::{self, Debug, Display};
use tracing::*;

/// Integer no-data marker used by `set_int`/`get_int`, independent of cell kind.
pub const NODATA_INT: i32 = i32::MIN;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CellKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl CellKind {
    /// From the TIFF SampleFormat code (1 unsigned, 2 signed, 3 float) and bit depth.
    pub fn from_sample_format(sample_format: u16, bits: u16) -> Option<Self> {
        Some(match (sample_format, bits) {
            (1, 8) => Self::U8,
            (2, 8) => Self::I8,
            (1, 16) => Self::U16,
            (2, 16) => Self::I16,
            (1, 32) => Self::U32,
            (2, 32) => Self::I32,
            (3, 32) => Self::F32,
            (3, 64) => Self::F64,
            _ => return None,
        })
    }

    pub fn sample_format(&self) -> u16 {
        match self {
            Self::U8 | Self::U16 | Self::U32 => 1,
            Self::I8 | Self::I16 | Self::I32 => 2,
            Self::F32 | Self::F64 => 3,
        }
    }

    pub fn bytes(&self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    pub fn bits(&self) -> u16 {
        self.bytes() as u16 * 8
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Whether `value` survives a round trip through this representation.
    pub fn can_store(&self, value: f64) -> bool {
        let (min, max) = match self {
            Self::U8 => (u8::MIN as f64, u8::MAX as f64),
            Self::I8 => (i8::MIN as f64, i8::MAX as f64),
            Self::U16 => (u16::MIN as f64, u16::MAX as f64),
            Self::I16 => (i16::MIN as f64, i16::MAX as f64),
            Self::U32 => (u32::MIN as f64, u32::MAX as f64),
            Self::I32 => (i32::MIN as f64, i32::MAX as f64),
            Self::F32 => return !value.is_finite() || value.abs() <= f32::MAX as f64,
            Self::F64 => return true,
        };
        value.fract() == 0.0 && value >= min && value <= max
    }

    /// Sentinel of the constant no-data policy: zero for unsigned, the
    /// minimum for signed, NaN for floats.
    pub fn constant_nodata(&self) -> f64 {
        match self {
            Self::U8 | Self::U16 | Self::U32 => 0.0,
            Self::I8 => i8::MIN as f64,
            Self::I16 => i16::MIN as f64,
            Self::I32 => i32::MIN as f64,
            Self::F32 | Self::F64 => f64::NAN,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NoData {
    Raw,
    Constant,
    UserDefined(f64),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellType {
    pub kind: CellKind,
    pub nodata: NoData,
}

impl CellType {
    pub fn raw(kind: CellKind) -> Self {
        Self {
            kind,
            nodata: NoData::Raw,
        }
    }

    pub fn constant(kind: CellKind) -> Self {
        Self {
            kind,
            nodata: NoData::Constant,
        }
    }

    pub fn user_defined(kind: CellKind, value: f64) -> Self {
        Self {
            kind,
            nodata: NoData::UserDefined(value),
        }
    }

    /// Policy for a file declaring `declared` (the GDAL no-data tag) or nothing.
    ///
    /// A declared value equal to the kind's constant sentinel collapses to
    /// `Constant`. Floats without a declaration still treat NaN as no-data.
    /// A value the kind cannot store is ignored, as if nothing were declared.
    pub fn from_declared(kind: CellKind, declared: Option<f64>) -> Self {
        match declared {
            Some(v) if !kind.can_store(v) => {
                warn!("Ignoring no-data value {v} that {kind:?} cells cannot hold");
                Self::from_declared(kind, None)
            }
            None if kind.is_float() => Self::constant(kind),
            None => Self::raw(kind),
            Some(v) if v.is_nan() && kind.is_float() => Self::constant(kind),
            Some(v) if v == kind.constant_nodata() => Self::constant(kind),
            Some(v) => Self::user_defined(kind, v),
        }
    }

    /// The sentinel, `None` for raw cell types.
    pub fn nodata_value(&self) -> Option<f64> {
        match self.nodata {
            NoData::Raw => None,
            NoData::Constant => Some(self.kind.constant_nodata()),
            NoData::UserDefined(v) => Some(v),
        }
    }

    pub fn bytes(&self) -> usize {
        self.kind.bytes()
    }
}

impl Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("{:?}", self.kind).to_lowercase();
        match self.nodata {
            NoData::Raw => write!(f, "{name}raw"),
            NoData::Constant => write!(f, "{name}"),
            NoData::UserDefined(v) => write!(f, "{name}ud{v}"),
        }
    }
}

/// One of the eight numeric cell representations.
pub trait CellValue:
    Copy + PartialEq + Debug + Default + Send + Sync + 'static + AsPrimitive<f64> + NumCast
{
    const KIND: CellKind;

    /// Read one value from the front of `bytes`.
    fn decode(endian: Endian, bytes: &[u8]) -> Self;

    fn encode(self, endian: Endian, out: &mut Vec<u8>);

    /// Truncates toward zero and saturates at the type bounds, NaN becomes zero.
    fn from_f64(value: f64) -> Self;

    /// Two's complement narrowing for integer kinds.
    fn from_i32(value: i32) -> Self;

    /// Sentinel as stored in this representation.
    fn sentinel(value: f64) -> Self {
        Self::from_f64(value)
    }

    /// Equality that treats any NaN as equal to a NaN sentinel.
    fn is_sentinel(self, sentinel: Self) -> bool {
        let v: f64 = self.as_();
        let s: f64 = sentinel.as_();
        v == s || (v.is_nan() && s.is_nan())
    }
}

macro_rules! cell_value {
    ($t:ty, $kind:ident, $n:literal) => {
        impl CellValue for $t {
            const KIND: CellKind = CellKind::$kind;

            fn decode(endian: Endian, bytes: &[u8]) -> Self {
                endian.decode_slice::<$n, $t>(bytes).unwrap_or_default()
            }

            fn encode(self, endian: Endian, out: &mut Vec<u8>) {
                out.extend_from_slice(&endian.encode::<$n, $t>(self));
            }

            fn from_f64(value: f64) -> Self {
                value as $t
            }

            fn from_i32(value: i32) -> Self {
                value as $t
            }
        }
    };
}

cell_value!(u8, U8, 1);
cell_value!(i8, I8, 1);
cell_value!(u16, U16, 2);
cell_value!(i16, I16, 2);
cell_value!(u32, U32, 4);
cell_value!(i32, I32, 4);
cell_value!(f32, F32, 4);
cell_value!(f64, F64, 8);
