use crate::cell::{CellType, CellValue, NODATA_INT};
use crate::tiff::Endian;
use crate::tile::{with_buffer, TileBuffer};

/// Destination buffer for one band of one window.
///
/// Created filled with the no-data sentinel (zero for raw cell types), so
/// cells no segment covers read back as no-data. Each index is expected to
/// be written by at most one segment.
#[derive(Clone, Debug)]
pub struct SegmentCombiner {
    cell_type: CellType,
    buffer: TileBuffer,
}

impl SegmentCombiner {
    pub fn new(cell_type: CellType, len: usize) -> Self {
        let fill = cell_type.nodata_value().unwrap_or(0.0);
        Self {
            cell_type,
            buffer: TileBuffer::filled(cell_type.kind, len, fill),
        }
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Write an integer, `NODATA_INT` becomes the cell type's sentinel.
    pub fn set_int(&mut self, index: usize, value: i32) {
        let nodata = self.cell_type.nodata_value();
        with_buffer!(&mut self.buffer, buf => {
            if let Some(cell) = buf.get_mut(index) {
                *cell = match nodata {
                    Some(sentinel) if value == NODATA_INT => CellValue::sentinel(sentinel),
                    _ => CellValue::from_i32(value),
                };
            }
        })
    }

    /// Write a double, NaN becomes the cell type's sentinel. Integer kinds
    /// truncate toward zero.
    pub fn set_double(&mut self, index: usize, value: f64) {
        let nodata = self.cell_type.nodata_value();
        with_buffer!(&mut self.buffer, buf => {
            if let Some(cell) = buf.get_mut(index) {
                *cell = match nodata {
                    Some(sentinel) if value.is_nan() => CellValue::sentinel(sentinel),
                    _ => CellValue::from_f64(value),
                };
            }
        })
    }

    /// Copy `count` samples stored in the file's representation, `stride`
    /// bytes apart in `bytes`, to consecutive indices starting at `index`.
    ///
    /// Values are taken as stored: the sentinel in the file is the sentinel
    /// of the cell type.
    pub fn copy_samples(
        &mut self,
        index: usize,
        bytes: &[u8],
        stride: usize,
        count: usize,
        endian: Endian,
    ) {
        with_buffer!(&mut self.buffer, buf => copy_into(buf, index, bytes, stride, count, endian))
    }

    /// Serialize in the cell type's fixed width layout.
    pub fn to_bytes(&self, endian: Endian) -> Vec<u8> {
        self.buffer.to_bytes(endian)
    }

    pub fn finish(self) -> TileBuffer {
        self.buffer
    }
}

fn copy_into<T: CellValue>(
    buf: &mut [T],
    index: usize,
    bytes: &[u8],
    stride: usize,
    count: usize,
    endian: Endian,
) {
    let width = T::KIND.bytes();
    let end = (index + count).min(buf.len());
    for (i, cell) in buf[index.min(end)..end].iter_mut().enumerate() {
        let at = i * stride;
        if let Some(sample) = bytes.get(at..at + width) {
            *cell = T::decode(endian, sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellKind, NoData};

    #[test]
    fn starts_as_nodata() {
        let combiner = SegmentCombiner::new(CellType::constant(CellKind::I32), 3);
        assert_eq!(combiner.finish(), TileBuffer::I32(vec![i32::MIN; 3]));

        let combiner = SegmentCombiner::new(CellType::user_defined(CellKind::U16, 9.0), 2);
        assert_eq!(combiner.finish(), TileBuffer::U16(vec![9, 9]));

        let combiner = SegmentCombiner::new(CellType::raw(CellKind::U8), 2);
        assert_eq!(combiner.finish(), TileBuffer::U8(vec![0, 0]));
    }

    #[test]
    fn set_converts_nodata() {
        let mut combiner = SegmentCombiner::new(CellType::user_defined(CellKind::I16, -9999.0), 4);
        combiner.set_int(0, NODATA_INT);
        combiner.set_double(1, f64::NAN);
        combiner.set_double(2, -7.9);
        combiner.set_int(3, 42);
        assert_eq!(combiner.finish(), TileBuffer::I16(vec![-9999, -9999, -7, 42]));
    }

    #[test]
    fn raw_cells_pass_values_through() {
        let mut combiner = SegmentCombiner::new(CellType::raw(CellKind::I32), 2);
        assert_eq!(combiner.cell_type().nodata, NoData::Raw);
        combiner.set_int(0, NODATA_INT);
        combiner.set_double(1, f64::NAN);
        assert_eq!(combiner.finish(), TileBuffer::I32(vec![i32::MIN, 0]));
    }

    #[test]
    fn copies_strided_samples() {
        let endian = Endian::Big;
        // two bands interleaved, take band 1
        let bytes = endian.encode_all(&[1u16, 10, 2, 20, 3, 30]);
        let mut combiner = SegmentCombiner::new(CellType::raw(CellKind::U16), 5);
        combiner.copy_samples(1, &bytes[2..], 4, 3, endian);
        assert_eq!(combiner.finish(), TileBuffer::U16(vec![0, 10, 20, 30, 0]));
    }

    #[test]
    fn nodata_survives_bytes_round_trip() {
        let cell_type = CellType::constant(CellKind::F32);
        let mut combiner = SegmentCombiner::new(cell_type, 3);
        combiner.set_double(0, 1.25);
        combiner.set_double(2, -4.0);
        let bytes = combiner.to_bytes(Endian::Little);

        let mut decoded = SegmentCombiner::new(cell_type, 3);
        decoded.copy_samples(0, &bytes, 4, 3, Endian::Little);
        match decoded.finish() {
            TileBuffer::F32(values) => {
                assert_eq!(values[0], 1.25);
                assert!(values[1].is_nan());
                assert_eq!(values[2], -4.0);
            }
            other => panic!("unexpected buffer {other:?}"),
        }
    }
}
