use crate::cell::NoData;
use crate::compression::{Compression, Predictor};
use crate::geo::GeoTransform;
use crate::tiff::{Endian, TagData, TagId, Tiff, TiffVariant};
use crate::tile::Tile;
use std::io::Write;
use tracing::*;

mod error;

pub use error::{EncodeError, EncodeResult};

// libtiff's default strip size
const STRIP_BYTES: usize = 8 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Layout {
    Strips(Option<u32>),
    Tiles(u32, u32),
}

/// Writes a `Tile` as a single image TIFF.
#[derive(Debug)]
pub struct Encoder {
    tile: Tile,
    endian: Endian,
    variant: TiffVariant,
    compression: Compression,
    predictor: Predictor,
    layout: Layout,
    band_interleave: bool,
    geo: Option<(GeoTransform, Option<u16>)>,
    ascii_tags: Vec<(TagId, String)>,
    metadata: Vec<(String, String)>,
}

impl Encoder {
    pub fn new(tile: Tile) -> Self {
        Self {
            tile,
            endian: Endian::Little,
            variant: TiffVariant::Normal,
            compression: Compression::Uncompressed,
            predictor: Predictor::No,
            layout: Layout::Strips(None),
            band_interleave: false,
            geo: None,
            ascii_tags: vec![],
            metadata: vec![],
        }
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_predictor(mut self, predictor: Predictor) -> Self {
        self.predictor = predictor;
        self
    }

    pub fn with_tile_size(mut self, width: u32, height: u32) -> Self {
        self.layout = Layout::Tiles(width, height);
        self
    }

    pub fn with_rows_per_strip(mut self, rows: u32) -> Self {
        self.layout = Layout::Strips(Some(rows));
        self
    }

    pub fn with_big_endian(mut self, big: bool) -> Self {
        self.endian = if big { Endian::Big } else { Endian::Little };
        self
    }

    pub fn with_big_tiff(mut self, big: bool) -> Self {
        self.variant = if big {
            TiffVariant::Big
        } else {
            TiffVariant::Normal
        };
        self
    }

    /// Store each band in its own plane of segments.
    pub fn with_band_interleave(mut self, band: bool) -> Self {
        self.band_interleave = band;
        self
    }

    pub fn with_geo(mut self, transform: GeoTransform, epsg: Option<u16>) -> Self {
        self.geo = Some((transform, epsg));
        self
    }

    /// `TIFFTAG_DATETIME`, read back as the default time tag.
    pub fn with_datetime(self, datetime: &str) -> Self {
        self.with_ascii_tag(TagId::DateTime, datetime)
    }

    pub fn with_ascii_tag(mut self, id: TagId, value: &str) -> Self {
        self.ascii_tags.retain(|(existing, _)| *existing != id);
        self.ascii_tags.push((id, value.to_string()));
        self
    }

    /// Dataset level item of the GDAL metadata tag.
    pub fn with_metadata_item(mut self, name: &str, value: &str) -> Self {
        self.metadata.push((name.to_string(), value.to_string()));
        self
    }

    fn segment_size(&self) -> EncodeResult<(u32, u32)> {
        let (cols, rows) = (self.tile.cols, self.tile.rows);
        match self.layout {
            Layout::Tiles(w, h) if w == 0 || h == 0 => {
                Err(EncodeError::InvalidTile(format!("Tile size {w}x{h}")))
            }
            // TIFF 6.0 requires tile edges in multiples of 16
            Layout::Tiles(w, h) if w % 16 != 0 || h % 16 != 0 => Err(EncodeError::NotSupported(
                format!("Tile size {w}x{h} is not a multiple of 16"),
            )),
            Layout::Tiles(w, h) => Ok((w, h)),
            Layout::Strips(Some(0)) => Err(EncodeError::InvalidTile("Zero rows per strip".into())),
            Layout::Strips(Some(n)) => Ok((cols, n.min(rows))),
            Layout::Strips(None) => {
                let row_bytes = cols as usize * self.pixel_bytes();
                let n = (STRIP_BYTES / row_bytes.max(1)).max(1) as u32;
                Ok((cols, n.min(rows)))
            }
        }
    }

    fn pixel_bytes(&self) -> usize {
        self.tile.band_count() * self.tile.cell_type.bytes()
    }

    pub fn encode_to_vec(&self) -> EncodeResult<Vec<u8>> {
        let mut bytes = vec![];
        self.encode(&mut bytes)?;
        Ok(bytes)
    }

    pub fn encode<W: Write>(&self, writer: &mut W) -> EncodeResult<()> {
        let endian = self.endian;
        let variant = self.variant;
        let tile = &self.tile;
        let (cols, rows) = (tile.cols, tile.rows);
        let band_count = tile.band_count();
        let kind = tile.cell_type.kind;
        let bytes = kind.bytes();

        if cols == 0 || rows == 0 || band_count == 0 {
            return Err(EncodeError::InvalidTile(format!(
                "{cols}x{rows} with {band_count} bands"
            )));
        }
        let len = cols as usize * rows as usize;
        if tile.bands().iter().any(|band| band.len() != len) {
            return Err(EncodeError::InvalidTile(format!(
                "Band lengths do not match {cols}x{rows}"
            )));
        }
        if self.predictor == Predictor::FloatingPoint && !kind.is_float() {
            return Err(EncodeError::NotSupported(format!(
                "Floating point predictor for {kind:?}"
            )));
        }

        let (seg_w, seg_h) = self.segment_size()?;
        let tiled = matches!(self.layout, Layout::Tiles(..));
        let across = cols.div_ceil(seg_w);
        let down = rows.div_ceil(seg_h);
        let band_bytes: Vec<Vec<u8>> = tile.bands().iter().map(|b| b.to_bytes(endian)).collect();
        let planes: Vec<Vec<usize>> = if self.band_interleave {
            (0..band_count).map(|b| vec![b]).collect()
        } else {
            vec![(0..band_count).collect()]
        };

        // Segments
        let mut segments = vec![];
        for plane in planes.iter() {
            let samples = plane.len();
            for row in 0..down {
                for col in 0..across {
                    let (c0, r0) = (col * seg_w, row * seg_h);
                    let stored_rows = if tiled { seg_h } else { seg_h.min(rows - r0) };
                    let mut raw = vec![0u8; seg_w as usize * stored_rows as usize * samples * bytes];
                    for y in 0..stored_rows.min(rows - r0) {
                        for x in 0..seg_w.min(cols - c0) {
                            let src = ((r0 + y) as usize * cols as usize + (c0 + x) as usize) * bytes;
                            let dst = ((y * seg_w + x) as usize * samples) * bytes;
                            for (i, band) in plane.iter().enumerate() {
                                raw[dst + i * bytes..dst + (i + 1) * bytes]
                                    .copy_from_slice(&band_bytes[*band][src..src + bytes]);
                            }
                        }
                    }
                    self.predictor
                        .apply(&mut raw, seg_w as usize, bytes, samples, endian)?;
                    segments.push(self.compression.encode(&raw)?);
                }
            }
        }

        // Layout: header | segments | ifd
        let header_len = variant.header_bytesize() as u64;
        let mut offsets = Vec::with_capacity(segments.len());
        let mut byte_counts = Vec::with_capacity(segments.len());
        let mut position = header_len;
        for segment in segments.iter() {
            offsets.push(position);
            byte_counts.push(segment.len() as u64);
            position += segment.len() as u64;
        }
        let padding = position % 2;
        let ifd_offset = position + padding;
        if variant == TiffVariant::Normal && ifd_offset > u32::MAX as u64 {
            return Err(EncodeError::TooLarge(ifd_offset));
        }
        let as_offsets = |values: Vec<u64>| match variant {
            TiffVariant::Normal => TagData::Long(values.into_iter().map(|v| v as u32).collect()),
            TiffVariant::Big => TagData::Long8(values),
        };

        let mut tiff = Tiff::new(endian, variant);
        let ifd = tiff
            .ifd0_mut()
            .map_err(|e| EncodeError::InvalidTile(format!("{e:?}")))?;
        ifd.set_tag(TagId::ImageWidth, TagData::from_long(cols), endian);
        ifd.set_tag(TagId::ImageHeight, TagData::from_long(rows), endian);
        ifd.set_tag(
            TagId::BitsPerSample,
            TagData::Short(vec![kind.bits(); band_count]),
            endian,
        );
        ifd.set_tag(
            TagId::Compression,
            TagData::from_short(self.compression.into()),
            endian,
        );
        // BlackIsZero
        ifd.set_tag(TagId::PhotometricInterpretation, TagData::from_short(1), endian);
        ifd.set_tag(
            TagId::SamplesPerPixel,
            TagData::from_short(band_count as u16),
            endian,
        );
        if band_count > 1 {
            // Unspecified
            ifd.set_tag(
                TagId::ExtraSamples,
                TagData::Short(vec![0; band_count - 1]),
                endian,
            );
        }
        let planar = if self.band_interleave { 2 } else { 1 };
        ifd.set_tag(TagId::PlanarConfiguration, TagData::from_short(planar), endian);
        ifd.set_tag(
            TagId::SampleFormat,
            TagData::Short(vec![kind.sample_format(); band_count]),
            endian,
        );
        if self.predictor != Predictor::No {
            ifd.set_tag(TagId::Predictor, TagData::from_short(self.predictor.into()), endian);
        }
        if tiled {
            ifd.set_tag(TagId::TileWidth, TagData::from_long(seg_w), endian);
            ifd.set_tag(TagId::TileLength, TagData::from_long(seg_h), endian);
            ifd.set_tag(TagId::TileOffsets, as_offsets(offsets), endian);
            ifd.set_tag(TagId::TileByteCounts, as_offsets(byte_counts), endian);
        } else {
            ifd.set_tag(TagId::RowsPerStrip, TagData::from_long(seg_h), endian);
            ifd.set_tag(TagId::StripOffsets, as_offsets(offsets), endian);
            ifd.set_tag(TagId::StripByteCounts, as_offsets(byte_counts), endian);
        }

        match tile.cell_type.nodata {
            NoData::Raw => {}
            NoData::Constant => {
                let value = kind.constant_nodata();
                let text = if value.is_nan() { "nan".to_string() } else { value.to_string() };
                ifd.set_tag(TagId::GDALNoData, TagData::from_string(&text), endian);
            }
            NoData::UserDefined(value) => {
                ifd.set_tag(TagId::GDALNoData, TagData::from_string(&value.to_string()), endian);
            }
        }

        if let Some((transform, epsg)) = self.geo {
            let [a, b, c, d, e, f] = transform.coefficients;
            if b == 0.0 && d == 0.0 {
                ifd.set_tag(TagId::ModelPixelScale, TagData::Double(vec![a, -e, 0.0]), endian);
                ifd.set_tag(
                    TagId::ModelTiepoint,
                    TagData::Double(vec![0.0, 0.0, 0.0, c, f, 0.0]),
                    endian,
                );
            } else {
                let matrix = vec![
                    a, b, 0.0, c, d, e, 0.0, f, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0,
                ];
                ifd.set_tag(TagId::ModelTransformation, TagData::Double(matrix), endian);
            }
            if let Some(code) = epsg {
                ifd.set_tag(TagId::GeoKeyDirectory, geo_keys(code), endian);
            }
        }

        for (id, value) in self.ascii_tags.iter() {
            ifd.set_tag(*id, TagData::from_string(value), endian);
        }
        if !self.metadata.is_empty() {
            let mut xml = "<GDALMetadata>".to_string();
            for (name, value) in self.metadata.iter() {
                xml += &format!("<Item name=\"{}\">{}</Item>", escape(name), escape(value));
            }
            xml += "</GDALMetadata>";
            ifd.set_tag(TagId::GDALMetadata, TagData::from_string(&xml), endian);
        }

        // Write
        writer.write_all(&tiff.encode_header(ifd_offset))?;
        for segment in segments.iter() {
            writer.write_all(segment)?;
        }
        if padding == 1 {
            writer.write_all(&[0])?;
        }
        writer.write_all(&tiff.ifds[0].encode(ifd_offset, endian, variant))?;
        debug!(
            "Encoded {tile} as {} {:?} segments",
            segments.len(),
            self.compression
        );
        Ok(())
    }
}

// GTModelType then the CRS key, projected unless the code is in the
// geographic 4000 range
fn geo_keys(code: u16) -> TagData {
    let (model, key) = if (4000..5000).contains(&code) {
        (2, 2048)
    } else {
        (1, 3072)
    };
    TagData::Short(vec![1, 1, 0, 2, 1024, 0, 1, model, key, 0, 1, code])
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellKind, CellType};
    use crate::metadata::{Interleave, RasterMetadata, SegmentKind};
    use crate::tile::TileBuffer;

    fn small() -> Tile {
        Tile::new(
            20,
            10,
            CellType::user_defined(CellKind::F32, -1.0),
            vec![
                TileBuffer::F32((0..200).map(|v| v as f32).collect()),
                TileBuffer::F32(vec![-1.0; 200]),
            ],
        )
    }

    #[test]
    fn writes_readable_metadata() {
        let bytes = Encoder::new(small())
            .with_tile_size(16, 16)
            .with_band_interleave(true)
            .with_big_tiff(true)
            .with_big_endian(true)
            .with_datetime("2020:01:02 03:04:05")
            .with_metadata_item("NOTE", "a < b")
            .with_geo(GeoTransform::default(), Some(32633))
            .encode_to_vec()
            .unwrap();
        let metadata = RasterMetadata::parse(&bytes).unwrap();
        assert_eq!((metadata.cols, metadata.rows, metadata.band_count), (20, 10, 2));
        assert_eq!(metadata.endian, Endian::Big);
        assert_eq!(metadata.cell_type, CellType::user_defined(CellKind::F32, -1.0));
        assert_eq!(metadata.layout.kind, SegmentKind::Tiles);
        assert_eq!(metadata.layout.interleave, Interleave::Band);
        assert_eq!(metadata.layout.segment_count(), 4);
        assert_eq!(metadata.tag("TIFFTAG_DATETIME"), Some("2020:01:02 03:04:05"));
        assert_eq!(metadata.tag("NOTE"), Some("a < b"));
        assert_eq!(metadata.crs().as_deref(), Some("EPSG:32633"));
    }

    #[test]
    fn default_strips_are_about_8k() {
        let tile = Tile::new(
            1000,
            50,
            CellType::raw(CellKind::U16),
            vec![TileBuffer::U16(vec![1; 50_000])],
        );
        let bytes = Encoder::new(tile).encode_to_vec().unwrap();
        let layout = RasterMetadata::parse(&bytes).unwrap().layout;
        assert_eq!(layout.segment_height, 4);
        assert_eq!(layout.segment_count(), 13);
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(matches!(
            Encoder::new(small()).with_tile_size(10, 16).encode_to_vec(),
            Err(EncodeError::NotSupported(_))
        ));
        assert!(matches!(
            Encoder::new(small()).with_rows_per_strip(0).encode_to_vec(),
            Err(EncodeError::InvalidTile(_))
        ));
        let short = Tile::new(
            4,
            4,
            CellType::raw(CellKind::U8),
            vec![TileBuffer::U8(vec![0; 15])],
        );
        assert!(matches!(
            Encoder::new(short).encode_to_vec(),
            Err(EncodeError::InvalidTile(_))
        ));
        let ints = Tile::new(1, 1, CellType::raw(CellKind::U8), vec![TileBuffer::U8(vec![0])]);
        assert!(matches!(
            Encoder::new(ints)
                .with_predictor(Predictor::FloatingPoint)
                .encode_to_vec(),
            Err(EncodeError::NotSupported(_))
        ));
    }
}
