use crate::cell::{CellKind, CellType, CellValue, NODATA_INT};
use crate::tiff::Endian;
use crate::window::PixelWindow;
use num_traits::AsPrimitive;
use std::fmt::Display;

/// Dense pixel values of one band in a single numeric representation.
#[derive(Clone, Debug, PartialEq)]
pub enum TileBuffer {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// Run `$body` with `$buf` bound to the typed vector inside a `TileBuffer`.
macro_rules! with_buffer {
    ($buffer:expr, $buf:ident => $body:expr) => {
        match $buffer {
            TileBuffer::U8($buf) => $body,
            TileBuffer::I8($buf) => $body,
            TileBuffer::U16($buf) => $body,
            TileBuffer::I16($buf) => $body,
            TileBuffer::U32($buf) => $body,
            TileBuffer::I32($buf) => $body,
            TileBuffer::F32($buf) => $body,
            TileBuffer::F64($buf) => $body,
        }
    };
}
pub(crate) use with_buffer;

impl TileBuffer {
    /// `len` copies of `fill`, converted to `kind`.
    pub fn filled(kind: CellKind, len: usize, fill: f64) -> Self {
        fn fill_with<T: CellValue>(len: usize, fill: f64) -> Vec<T> {
            vec![T::from_f64(fill); len]
        }
        match kind {
            CellKind::U8 => Self::U8(fill_with(len, fill)),
            CellKind::I8 => Self::I8(fill_with(len, fill)),
            CellKind::U16 => Self::U16(fill_with(len, fill)),
            CellKind::I16 => Self::I16(fill_with(len, fill)),
            CellKind::U32 => Self::U32(fill_with(len, fill)),
            CellKind::I32 => Self::I32(fill_with(len, fill)),
            CellKind::F32 => Self::F32(fill_with(len, fill)),
            CellKind::F64 => Self::F64(fill_with(len, fill)),
        }
    }

    pub fn kind(&self) -> CellKind {
        match self {
            Self::U8(_) => CellKind::U8,
            Self::I8(_) => CellKind::I8,
            Self::U16(_) => CellKind::U16,
            Self::I16(_) => CellKind::I16,
            Self::U32(_) => CellKind::U32,
            Self::I32(_) => CellKind::I32,
            Self::F32(_) => CellKind::F32,
            Self::F64(_) => CellKind::F64,
        }
    }

    pub fn len(&self) -> usize {
        with_buffer!(self, buf => buf.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw stored value widened to f64, no no-data interpretation.
    pub fn raw(&self, index: usize) -> Option<f64> {
        with_buffer!(self, buf => buf.get(index).map(|v| AsPrimitive::<f64>::as_(*v)))
    }

    /// Values in the cell type's fixed width layout.
    pub fn to_bytes(&self, endian: Endian) -> Vec<u8> {
        with_buffer!(self, buf => {
            let mut out = Vec::with_capacity(buf.len() * self.kind().bytes());
            for v in buf.iter() {
                CellValue::encode(*v, endian, &mut out);
            }
            out
        })
    }
}

/// A window's worth of pixels, one buffer per band.
#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    pub cols: u32,
    pub rows: u32,
    pub cell_type: CellType,
    bands: Vec<TileBuffer>,
}

impl Tile {
    /// Bands are row-major, `cols * rows` values each. Not checked here, the
    /// encoder rejects mismatched bands.
    pub fn new(cols: u32, rows: u32, cell_type: CellType, bands: Vec<TileBuffer>) -> Self {
        Self {
            cols,
            rows,
            cell_type,
            bands,
        }
    }

    /// Pixel grid of `window` filled with the cell type's no-data (zero when raw).
    pub fn empty(window: &PixelWindow, cell_type: CellType, band_count: usize) -> Self {
        let len = window.pixel_count() as usize;
        let fill = cell_type.nodata_value().unwrap_or(0.0);
        let bands = (0..band_count)
            .map(|_| TileBuffer::filled(cell_type.kind, len, fill))
            .collect();
        Self::new(window.width(), window.height(), cell_type, bands)
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn is_multiband(&self) -> bool {
        self.bands.len() > 1
    }

    pub fn band(&self, band: usize) -> Option<&TileBuffer> {
        self.bands.get(band)
    }

    pub fn bands(&self) -> &[TileBuffer] {
        &self.bands
    }

    pub fn into_bands(self) -> Vec<TileBuffer> {
        self.bands
    }

    fn index(&self, col: u32, row: u32) -> Option<usize> {
        (col < self.cols && row < self.rows)
            .then(|| row as usize * self.cols as usize + col as usize)
    }

    /// Value as f64, NaN where the cell holds the no-data sentinel.
    pub fn get_double(&self, band: usize, col: u32, row: u32) -> Option<f64> {
        let raw = self.band(band)?.raw(self.index(col, row)?)?;
        match self.cell_type.nodata_value() {
            Some(nodata) if is_nodata(raw, nodata, self.cell_type.kind) => Some(f64::NAN),
            _ => Some(raw),
        }
    }

    /// Value as i32, `NODATA_INT` where the cell holds the no-data sentinel.
    ///
    /// Floats truncate toward zero.
    pub fn get_int(&self, band: usize, col: u32, row: u32) -> Option<i32> {
        let raw = self.band(band)?.raw(self.index(col, row)?)?;
        match self.cell_type.nodata_value() {
            Some(nodata) if is_nodata(raw, nodata, self.cell_type.kind) => Some(NODATA_INT),
            _ if raw.is_nan() => Some(NODATA_INT),
            _ => Some(raw as i32),
        }
    }

    pub fn is_nodata(&self, band: usize, col: u32, row: u32) -> Option<bool> {
        self.get_double(band, col, row).map(|v| v.is_nan())
    }
}

/// Compare in the storage representation so f32 sentinels match exactly.
fn is_nodata(raw: f64, nodata: f64, kind: CellKind) -> bool {
    if nodata.is_nan() {
        return raw.is_nan();
    }
    match kind {
        CellKind::F32 => raw as f32 == nodata as f32,
        _ => raw == nodata,
    }
}

impl Display for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tile({}x{}, {} bands, {})",
            self.cols,
            self.rows,
            self.bands.len(),
            self.cell_type
        )
    }
}
