//! Windowed, bounded-memory reads of tiled and striped GeoTIFFs.
//!
//! Metadata comes from range reads of the header and directories only.
//! Rasters are cut into windows no larger than a byte budget, and each
//! window is read independently by decoding just the segments it touches.

pub mod cell;
pub mod combine;
pub mod compression;
pub mod encode;
pub mod engine;
pub mod error;
pub mod geo;
pub mod io;
pub mod metadata;
pub mod options;
pub mod partition;
pub mod reader;
pub mod source;
pub mod tiff;
pub mod tile;
pub mod window;

pub use cell::{CellKind, CellType, CellValue, NoData, NODATA_INT};
pub use combine::SegmentCombiner;
pub use compression::{Compression, Predictor};
pub use encode::{EncodeError, EncodeResult, Encoder};
pub use error::{WindowError, WindowResult};
pub use geo::{Extent, GeoTransform};
pub use io::{BackingStore, ChunkedReader, RasterLocator, ReadRange, StoreFactory};
pub use metadata::{Interleave, RasterMetadata, Segment, SegmentKind, SegmentLayout};
pub use options::RasterOptions;
pub use partition::{Partitioning, Weighted};
pub use reader::WindowedTileReader;
pub use source::{ProjectedExtent, RasterSource, TemporalProjectedExtent, WorkItem};
pub use tile::{Tile, TileBuffer};
pub use window::{PixelWindow, WindowPlanner};
