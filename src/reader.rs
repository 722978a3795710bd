use crate::combine::SegmentCombiner;
use crate::error::{WindowError, WindowResult};
use crate::io::ReadRange;
use crate::metadata::{RasterMetadata, Segment};
use crate::tile::Tile;
use crate::window::PixelWindow;
use std::sync::Arc;
use std::time::Instant;
use tracing::*;

/// Materializes windows of one raster file.
///
/// Each read allocates its own buffers, so one reader can serve windows in
/// any order from any number of threads.
#[derive(Debug)]
pub struct WindowedTileReader<R> {
    reader: R,
    metadata: Arc<RasterMetadata>,
}

impl<R: ReadRange> WindowedTileReader<R> {
    pub fn open(reader: R) -> WindowResult<Self> {
        let metadata = Arc::new(RasterMetadata::parse(&reader)?);
        Ok(Self { reader, metadata })
    }

    /// Reuse metadata already parsed for this file.
    pub fn with_metadata(reader: R, metadata: Arc<RasterMetadata>) -> Self {
        Self { reader, metadata }
    }

    pub fn metadata(&self) -> &RasterMetadata {
        &self.metadata
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    pub fn read_all(&self) -> WindowResult<Tile> {
        self.read_window(&self.metadata.full_window())
    }

    pub fn read_window(&self, window: &PixelWindow) -> WindowResult<Tile> {
        let metadata = &*self.metadata;
        if window.is_empty() || !metadata.full_window().contains(window) {
            return Err(WindowError::WindowOutOfBounds {
                window: (window.col_min, window.row_min, window.col_max, window.row_max),
                raster: (metadata.cols, metadata.rows),
            });
        }

        let t0 = Instant::now();
        let len = window.pixel_count() as usize;
        let mut bands: Vec<SegmentCombiner> = (0..metadata.band_count)
            .map(|_| SegmentCombiner::new(metadata.cell_type, len))
            .collect();

        let segments = metadata.layout.intersecting(window);
        for segment in segments.iter() {
            self.combine_segment(segment, window, &mut bands)?;
        }

        debug!(
            "Read window {window} from {} segments in {:.3}ms",
            segments.len(),
            t0.elapsed().as_secs_f64() * 1e3
        );
        Ok(Tile::new(
            window.width(),
            window.height(),
            metadata.cell_type,
            bands.into_iter().map(SegmentCombiner::finish).collect(),
        ))
    }

    fn combine_segment(
        &self,
        segment: &Segment,
        window: &PixelWindow,
        bands: &mut [SegmentCombiner],
    ) -> WindowResult<()> {
        let metadata = &*self.metadata;
        let layout = &metadata.layout;
        if segment.byte_count == 0 {
            // sparse file, nothing written for this segment
            trace!("Segment {} is empty", segment.index);
            return Ok(());
        }
        let Some(overlap) = segment.bounds.intersection(window) else {
            return Ok(());
        };

        let end = segment
            .offset
            .checked_add(segment.byte_count)
            .ok_or_else(|| WindowError::CorruptSegment {
                index: segment.index,
                reason: format!("Byte range overflows at offset {}", segment.offset),
            })?;
        let raw = self.reader.read_range_to_vec(segment.offset, end)?;

        let bytes = metadata.cell_type.bytes();
        let samples = layout.samples_per_segment();
        let corrupt = |e| WindowError::corrupt_segment(segment.index, e);
        let mut decoded = metadata
            .compression
            .decode(&raw, layout.decoded_len(segment, bytes))
            .map_err(corrupt)?;
        metadata
            .predictor
            .undo(
                &mut decoded,
                layout.segment_width as usize,
                bytes,
                samples,
                metadata.endian,
            )
            .map_err(corrupt)?;

        let pixel_stride = samples * bytes;
        let count = overlap.width() as usize;
        for row in overlap.row_min..overlap.row_max {
            let segment_row = (row - segment.bounds.row_min) as usize;
            let segment_col = (overlap.col_min - segment.bounds.col_min) as usize;
            let start = (segment_row * layout.segment_width as usize + segment_col) * pixel_stride;
            let target = (row - window.row_min) as usize * window.width() as usize
                + (overlap.col_min - window.col_min) as usize;

            match segment.band {
                Some(band) => {
                    if let (Some(combiner), Some(src)) = (bands.get_mut(band), decoded.get(start..)) {
                        combiner.copy_samples(target, src, pixel_stride, count, metadata.endian);
                    }
                }
                None => {
                    for (band, combiner) in bands.iter_mut().enumerate() {
                        if let Some(src) = decoded.get(start + band * bytes..) {
                            combiner.copy_samples(target, src, pixel_stride, count, metadata.endian);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellKind, CellType, NODATA_INT};
    use crate::compression::Compression;
    use crate::encode::Encoder;
    use crate::metadata::SegmentLayout;
    use crate::tiff::TagId;
    use crate::tile::TileBuffer;

    fn gradient(cols: u32, rows: u32) -> Tile {
        let values = (0..cols * rows).map(|i| i as u16).collect();
        Tile::new(cols, rows, CellType::raw(CellKind::U16), vec![TileBuffer::U16(values)])
    }

    #[test]
    fn window_across_tile_boundaries() {
        let bytes = Encoder::new(gradient(40, 30))
            .with_tile_size(16, 16)
            .with_compression(Compression::Lzw)
            .encode_to_vec()
            .unwrap();
        let reader = WindowedTileReader::open(bytes).unwrap();
        let tile = reader.read_window(&PixelWindow::new(10, 12, 35, 30)).unwrap();
        assert_eq!((tile.cols, tile.rows), (25, 18));
        for row in 0..18 {
            for col in 0..25 {
                let expected = (row + 12) * 40 + col + 10;
                assert_eq!(tile.get_int(0, col, row), Some(expected as i32));
            }
        }
    }

    #[test]
    fn window_outside_raster_is_rejected() {
        let bytes = Encoder::new(gradient(8, 8)).encode_to_vec().unwrap();
        let reader = WindowedTileReader::open(bytes).unwrap();
        assert!(matches!(
            reader.read_window(&PixelWindow::new(4, 4, 9, 8)),
            Err(WindowError::WindowOutOfBounds { .. })
        ));
        assert!(matches!(
            reader.read_window(&PixelWindow::new(4, 4, 4, 8)),
            Err(WindowError::WindowOutOfBounds { .. })
        ));
    }

    #[test]
    fn damaged_segment_is_corrupt() {
        let mut bytes = Encoder::new(gradient(8, 8))
            .with_compression(Compression::Deflate)
            .encode_to_vec()
            .unwrap();
        let reader = WindowedTileReader::open(bytes.clone()).unwrap();
        let segment = reader.metadata().layout.segment(0).unwrap();
        // damage the zlib stream
        let at = segment.offset as usize + 2;
        bytes[at..at + 4].copy_from_slice(&[0xFF; 4]);
        let reader = WindowedTileReader::with_metadata(bytes, reader.metadata.clone());
        assert!(matches!(
            reader.read_all(),
            Err(WindowError::CorruptSegment { index: 0, .. })
        ));
    }

    /// Drop the second of two strips, as a sparse file would.
    fn without_second_strip(bytes: &[u8]) -> Arc<RasterMetadata> {
        let metadata = RasterMetadata::parse(bytes).unwrap();
        let (first, second) = (
            metadata.layout.segment(0).unwrap(),
            metadata.layout.segment(1).unwrap(),
        );
        let layout = SegmentLayout::new(
            metadata.layout.kind,
            metadata.layout.interleave,
            4,
            4,
            1,
            metadata.layout.segment_width,
            metadata.layout.segment_height,
            vec![first.offset, second.offset],
            vec![first.byte_count, 0],
        )
        .unwrap();
        Arc::new(RasterMetadata { layout, ..metadata })
    }

    #[test]
    fn sparse_segments_read_as_nodata() {
        let tile = Tile::new(
            4,
            4,
            CellType::constant(CellKind::I32),
            vec![TileBuffer::I32(vec![7; 16])],
        );
        let bytes = Encoder::new(tile).with_rows_per_strip(2).encode_to_vec().unwrap();
        let metadata = without_second_strip(&bytes);
        let tile = WindowedTileReader::with_metadata(bytes, metadata)
            .read_all()
            .unwrap();
        assert_eq!(tile.get_int(0, 3, 1), Some(7));
        assert_eq!(tile.get_int(0, 0, 2), Some(NODATA_INT));
    }

    #[test]
    fn unstorable_nodata_falls_back_to_raw() {
        let bytes = Encoder::new(gradient(4, 4))
            .with_rows_per_strip(2)
            .with_ascii_tag(TagId::GDALNoData, "-9999")
            .encode_to_vec()
            .unwrap();
        let metadata = without_second_strip(&bytes);
        assert_eq!(metadata.cell_type, CellType::raw(CellKind::U16));

        let tile = WindowedTileReader::with_metadata(bytes, metadata)
            .read_all()
            .unwrap();
        assert_eq!(tile.get_int(0, 1, 1), Some(5));
        // raw cells no segment covers stay zero
        assert_eq!(tile.get_int(0, 0, 3), Some(0));
        assert_eq!(tile.is_nodata(0, 0, 3), Some(false));
    }

    #[test]
    fn sparse_cells_match_a_storable_nodata() {
        let bytes = Encoder::new(gradient(4, 4))
            .with_rows_per_strip(2)
            .with_ascii_tag(TagId::GDALNoData, "65535")
            .encode_to_vec()
            .unwrap();
        let metadata = without_second_strip(&bytes);
        assert_eq!(metadata.cell_type, CellType::user_defined(CellKind::U16, 65535.0));

        let tile = WindowedTileReader::with_metadata(bytes, metadata)
            .read_all()
            .unwrap();
        assert_eq!(tile.get_int(0, 0, 3), Some(NODATA_INT));
        assert_eq!(tile.is_nodata(0, 0, 3), Some(true));
    }
}
