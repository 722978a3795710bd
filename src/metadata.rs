use crate::cell::{CellKind, CellType};
use crate::compression::{Compression, Predictor};
use crate::error::{WindowError, WindowResult};
use crate::geo::{epsg_code, Extent, GeoTransform};
use crate::io::ReadRange;
use crate::tiff::{Endian, Ifd, TagId, Tiff, TiffError};
use crate::window::PixelWindow;
use num_traits::NumCast;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fmt::{Debug, Display};
use std::time::Instant;
use tracing::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    Tiles,
    Strips,
}

/// PlanarConfiguration: 1 stores all bands per pixel, 2 stores one plane per band.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interleave {
    Pixel,
    Band,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub index: usize,
    /// The one band this segment holds, `None` when it holds every band.
    pub band: Option<usize>,
    pub offset: u64,
    pub byte_count: u64,
    /// Pixels of the raster covered, clipped to the raster edge.
    pub bounds: PixelWindow,
}

/// Grid of tiles or strips covering the raster, one grid per band plane
/// when band interleaved.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentLayout {
    pub kind: SegmentKind,
    pub interleave: Interleave,
    pub segment_width: u32,
    pub segment_height: u32,
    pub across: u32,
    pub down: u32,
    cols: u32,
    rows: u32,
    bands: usize,
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
}

impl SegmentLayout {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: SegmentKind,
        interleave: Interleave,
        cols: u32,
        rows: u32,
        bands: usize,
        segment_width: u32,
        segment_height: u32,
        offsets: Vec<u64>,
        byte_counts: Vec<u64>,
    ) -> WindowResult<Self> {
        if segment_width == 0 || segment_height == 0 {
            return Err(WindowError::UnsupportedLayout(format!(
                "Zero sized segments {segment_width}x{segment_height}"
            )));
        }
        let across = cols.div_ceil(segment_width);
        let down = rows.div_ceil(segment_height);
        let planes = match interleave {
            Interleave::Pixel => 1,
            Interleave::Band => bands,
        };
        let expected = across as usize * down as usize * planes;
        if offsets.len() != byte_counts.len() || offsets.len() < expected {
            return Err(WindowError::MalformedMetadata(format!(
                "{kind:?} layout needs {expected} segments, found {} offsets and {} byte counts",
                offsets.len(),
                byte_counts.len()
            )));
        }
        Ok(Self {
            kind,
            interleave,
            segment_width,
            segment_height,
            across,
            down,
            cols,
            rows,
            bands,
            offsets,
            byte_counts,
        })
    }

    pub fn segments_per_plane(&self) -> usize {
        self.across as usize * self.down as usize
    }

    pub fn planes(&self) -> usize {
        match self.interleave {
            Interleave::Pixel => 1,
            Interleave::Band => self.bands,
        }
    }

    pub fn segment_count(&self) -> usize {
        self.segments_per_plane() * self.planes()
    }

    /// Samples stored per pixel inside one segment.
    pub fn samples_per_segment(&self) -> usize {
        match self.interleave {
            Interleave::Pixel => self.bands,
            Interleave::Band => 1,
        }
    }

    pub fn segment(&self, index: usize) -> Option<Segment> {
        let per_plane = self.segments_per_plane();
        let plane = index / per_plane;
        if plane >= self.planes() {
            return None;
        }
        let within = index % per_plane;
        let col = (within % self.across as usize) as u64;
        let row = (within / self.across as usize) as u64;
        let (w, h) = (self.segment_width as u64, self.segment_height as u64);
        let bounds = PixelWindow::new(
            (col * w) as u32,
            (row * h) as u32,
            ((col + 1) * w).min(self.cols as u64) as u32,
            ((row + 1) * h).min(self.rows as u64) as u32,
        );
        Some(Segment {
            index,
            band: match self.interleave {
                Interleave::Pixel => None,
                Interleave::Band => Some(plane),
            },
            offset: *self.offsets.get(index)?,
            byte_count: *self.byte_counts.get(index)?,
            bounds,
        })
    }

    /// Every segment holding pixels of `window`, plane by plane in row-major order.
    pub fn intersecting(&self, window: &PixelWindow) -> Vec<Segment> {
        let Some(window) = window.intersection(&PixelWindow::full(self.cols, self.rows)) else {
            return vec![];
        };
        let col_first = window.col_min / self.segment_width;
        let col_last = (window.col_max - 1) / self.segment_width;
        let row_first = window.row_min / self.segment_height;
        let row_last = (window.row_max - 1) / self.segment_height;

        let per_plane = self.segments_per_plane();
        let mut segments = vec![];
        for plane in 0..self.planes() {
            for row in row_first..=row_last {
                for col in col_first..=col_last {
                    let index = plane * per_plane + (row * self.across + col) as usize;
                    segments.extend(self.segment(index));
                }
            }
        }
        segments
    }

    /// Rows stored in the segment. Tiles are padded to full size, the last
    /// strip is not.
    pub fn stored_rows(&self, segment: &Segment) -> u32 {
        match self.kind {
            SegmentKind::Tiles => self.segment_height,
            SegmentKind::Strips => segment.bounds.height(),
        }
    }

    /// Byte length of the segment once decompressed.
    pub fn decoded_len(&self, segment: &Segment, bytes_per_sample: usize) -> usize {
        self.segment_width as usize
            * self.stored_rows(segment) as usize
            * self.samples_per_segment()
            * bytes_per_sample
    }
}

/// What one raster file declares about its primary image.
#[derive(Clone, Debug)]
pub struct RasterMetadata {
    pub cols: u32,
    pub rows: u32,
    pub band_count: usize,
    pub cell_type: CellType,
    pub compression: Compression,
    pub predictor: Predictor,
    pub endian: Endian,
    pub layout: SegmentLayout,
    pub tags: BTreeMap<String, String>,
    pub geo_transform: Option<GeoTransform>,
    pub epsg: Option<u16>,
}

impl RasterMetadata {
    /// Read the header and directories only, never pixel data.
    pub fn parse<R: ReadRange + ?Sized>(reader: &R) -> WindowResult<Self> {
        let t0 = Instant::now();
        let tiff = Tiff::open_primary(reader)?;
        let metadata = Self::from_ifd(tiff.ifd0()?, tiff.endian)?;
        debug!(
            "Parsed {} metadata in {:.3}ms",
            metadata,
            t0.elapsed().as_secs_f64() * 1e3
        );
        Ok(metadata)
    }

    pub fn from_ifd(ifd: &Ifd, endian: Endian) -> WindowResult<Self> {
        // Required tags
        let cols: u32 = ifd.get_tag_value(TagId::ImageWidth)?;
        let rows: u32 = ifd.get_tag_value(TagId::ImageHeight)?;
        if cols == 0 || rows == 0 {
            return Err(WindowError::MalformedMetadata(format!(
                "Empty image {cols}x{rows}"
            )));
        }

        let band_count = ifd
            .get_optional_value::<u16>(TagId::SamplesPerPixel)?
            .unwrap_or(1) as usize;
        if band_count == 0 {
            return Err(WindowError::UnsupportedLayout("No samples per pixel".into()));
        }

        // Cell type
        let bits = uniform(ifd, TagId::BitsPerSample, 1)?;
        let sample_format = uniform(ifd, TagId::SampleFormat, 1)?;
        let kind = CellKind::from_sample_format(sample_format, bits).ok_or_else(|| {
            WindowError::UnsupportedLayout(format!(
                "SampleFormat {sample_format} with {bits} bits per sample"
            ))
        })?;
        let cell_type = CellType::from_declared(kind, declared_nodata(ifd)?);

        // Encoding
        let compression: Compression = ifd
            .get_optional_value::<u16>(TagId::Compression)?
            .unwrap_or(1)
            .into();
        if !compression.is_supported() {
            return Err(WindowError::UnsupportedCompression(compression));
        }
        let predictor: Predictor = ifd
            .get_optional_value::<u16>(TagId::Predictor)?
            .unwrap_or(1)
            .into();
        if let Predictor::Unknown(code) = predictor {
            return Err(WindowError::UnsupportedLayout(format!("Predictor {code}")));
        }
        let interleave = match ifd
            .get_optional_value::<u16>(TagId::PlanarConfiguration)?
            .unwrap_or(1)
        {
            1 => Interleave::Pixel,
            2 => Interleave::Band,
            other => {
                return Err(WindowError::UnsupportedLayout(format!(
                    "PlanarConfiguration {other}"
                )))
            }
        };

        // Segments
        let layout = if ifd.get_tag(TagId::TileWidth).is_ok() {
            SegmentLayout::new(
                SegmentKind::Tiles,
                interleave,
                cols,
                rows,
                band_count,
                ifd.get_tag_value(TagId::TileWidth)?,
                ifd.get_tag_value(TagId::TileLength)?,
                ifd.get_tag_values(TagId::TileOffsets)?,
                ifd.get_tag_values(TagId::TileByteCounts)?,
            )?
        } else {
            // Without RowsPerStrip the whole image is one strip
            let rows_per_strip = ifd
                .get_optional_value::<u32>(TagId::RowsPerStrip)?
                .unwrap_or(rows)
                .clamp(1, rows);
            SegmentLayout::new(
                SegmentKind::Strips,
                interleave,
                cols,
                rows,
                band_count,
                cols,
                rows_per_strip,
                ifd.get_tag_values(TagId::StripOffsets)?,
                ifd.get_tag_values(TagId::StripByteCounts)?,
            )?
        };

        Ok(Self {
            cols,
            rows,
            band_count,
            cell_type,
            compression,
            predictor,
            endian,
            layout,
            tags: collect_tags(ifd)?,
            geo_transform: GeoTransform::parse(ifd),
            epsg: epsg_code(ifd),
        })
    }

    pub fn full_window(&self) -> PixelWindow {
        PixelWindow::full(self.cols, self.rows)
    }

    pub fn bytes_per_pixel(&self) -> u64 {
        (self.band_count * self.cell_type.bytes()) as u64
    }

    pub fn window_bytes(&self, window: &PixelWindow) -> u64 {
        window.pixel_count() * self.bytes_per_pixel()
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    /// `EPSG:<code>` when the GeoKeyDirectory names one.
    pub fn crs(&self) -> Option<String> {
        self.epsg.map(|code| format!("EPSG:{code}"))
    }

    /// Model space bounds of `window`, pixel space when not georeferenced.
    pub fn extent(&self, window: &PixelWindow) -> Extent {
        Extent::of_pixels(
            &self.geo_transform.unwrap_or_default(),
            window.col_min,
            window.row_min,
            window.col_max,
            window.row_max,
        )
    }
}

impl Display for RasterMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}x{} {} {:?} {:?} {}x{}",
            self.cols,
            self.rows,
            self.band_count,
            self.cell_type,
            self.compression,
            self.layout.kind,
            self.layout.segment_width,
            self.layout.segment_height,
        )
    }
}

/// Single value for a per-sample tag, rejecting samples that disagree.
fn uniform<T>(ifd: &Ifd, id: TagId, default: T) -> WindowResult<T>
where
    T: NumCast + Copy + PartialEq + Debug,
{
    let values: Vec<T> = match ifd.get_tag_values(id) {
        Ok(values) => values,
        Err(TiffError::MissingTag(_)) => return Ok(default),
        Err(e) => return Err(e.into()),
    };
    let first = *values.first().ok_or(TiffError::BadTag(id))?;
    if values.iter().any(|v| *v != first) {
        return Err(WindowError::UnsupportedLayout(format!(
            "Mixed {id:?} {values:?}"
        )));
    }
    Ok(first)
}

fn declared_nodata(ifd: &Ifd) -> WindowResult<Option<f64>> {
    let Ok(tag) = ifd.get_tag(TagId::GDALNoData) else {
        return Ok(None);
    };
    let text = tag.as_string().ok_or(TiffError::BadTag(TagId::GDALNoData))?;
    text.trim().parse::<f64>().map(Some).map_err(|_| {
        WindowError::MalformedMetadata(format!("GDAL no-data value {text:?}"))
    })
}

/// Baseline ASCII tags under their GDAL names, then dataset level GDAL metadata items.
fn collect_tags(ifd: &Ifd) -> WindowResult<BTreeMap<String, String>> {
    let mut tags = BTreeMap::new();
    for tag in ifd.0.iter() {
        let name = tag.id().and_then(|id| id.gdal_name());
        if let (Some(name), Some(value)) = (name, tag.as_string()) {
            tags.insert(name.to_string(), value);
        }
    }
    if let Some(xml) = ifd
        .get_tag(TagId::GDALMetadata)
        .ok()
        .and_then(|tag| tag.as_string())
    {
        tags.extend(gdal_metadata_items(&xml)?);
    }
    Ok(tags)
}

// <GDALMetadata><Item name="KEY">value</Item><Item name="K" sample="0">band value</Item></GDALMetadata>
fn gdal_metadata_items(xml: &str) -> WindowResult<Vec<(String, String)>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut items = vec![];
    let mut current: Option<String> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"Item" => {
                current = None;
                let mut name = None;
                let mut per_band = false;
                for attr in e.attributes() {
                    let attr = attr.map_err(xml_error)?;
                    match attr.key.as_ref() {
                        b"name" => name = Some(attr.unescape_value().map_err(xml_error)?.into_owned()),
                        b"sample" => per_band = true,
                        _ => {}
                    }
                }
                if per_band {
                    trace!("Skipping per band GDAL metadata item {name:?}");
                } else {
                    current = name;
                }
            }
            Ok(Event::Text(text)) => {
                if let Some(name) = current.take() {
                    items.push((name, text.unescape().map_err(xml_error)?.into_owned()));
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
    }
    Ok(items)
}

fn xml_error<E: Debug>(e: E) -> WindowError {
    WindowError::MalformedMetadata(format!("GDAL metadata: {e:?}"))
}
