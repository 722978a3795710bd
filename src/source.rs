use crate::error::{WindowError, WindowResult};
use crate::geo::Extent;
use crate::io::{BackingStore, ChunkedReader, RasterLocator, ReadRange, StoreFactory};
use crate::metadata::RasterMetadata;
use crate::options::RasterOptions;
use crate::partition::Weighted;
use crate::reader::WindowedTileReader;
use crate::tile::Tile;
use crate::window::PixelWindow;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::fmt::Display;
use std::sync::Arc;
use tracing::*;

/// One independent unit of work: a window of a file, with the file's
/// metadata from the planning pass.
#[derive(Clone, Debug)]
pub struct WorkItem {
    pub locator: RasterLocator,
    pub window: PixelWindow,
    pub metadata: Arc<RasterMetadata>,
}

impl Weighted for WorkItem {
    fn weight(&self) -> u64 {
        self.metadata.window_bytes(&self.window)
    }
}

impl Display for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.locator, self.window)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProjectedExtent {
    pub extent: Extent,
    pub crs: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TemporalProjectedExtent {
    pub extent: Extent,
    pub crs: Option<String>,
    pub time: DateTime<Utc>,
}

/// Lists, plans and reads rasters held in a backing store.
///
/// The store client is built from the factory for every call, so a source
/// can be shared with workers that each need their own client.
#[derive(Clone)]
pub struct RasterSource {
    factory: Arc<dyn StoreFactory>,
    options: RasterOptions,
}

impl RasterSource {
    pub fn new(factory: Arc<dyn StoreFactory>, options: RasterOptions) -> Self {
        Self { factory, options }
    }

    pub fn options(&self) -> &RasterOptions {
        &self.options
    }

    /// Rasters under `prefix` passing the extension filter, in store order.
    pub fn list_inputs(&self, prefix: &str) -> WindowResult<Vec<RasterLocator>> {
        let store = self.factory.client()?;
        let listed = store.list(prefix)?;
        let total = listed.len();
        let inputs: Vec<RasterLocator> = listed
            .into_iter()
            .filter(|locator| self.options.accepts(locator))
            .collect();
        info!(
            "Listed {} rasters under {prefix} ({} other objects skipped)",
            inputs.len(),
            total - inputs.len()
        );
        Ok(inputs)
    }

    fn open(
        &self,
        store: &dyn BackingStore,
        locator: &RasterLocator,
    ) -> WindowResult<Box<dyn ReadRange>> {
        let reader = store.open(locator)?;
        let reader: Box<dyn ReadRange> = match self.options.chunk_size() {
            Some(chunk_size) => Box::new(ChunkedReader::new(reader, chunk_size)),
            None => reader,
        };
        Ok(reader)
    }

    pub fn metadata(&self, locator: &RasterLocator) -> WindowResult<RasterMetadata> {
        let store = self.factory.client()?;
        let reader = self.open(store.as_ref(), locator)?;
        RasterMetadata::parse(&reader)
    }

    /// Work items covering one file.
    pub fn plan_windows(&self, locator: &RasterLocator) -> WindowResult<Vec<WorkItem>> {
        let metadata = Arc::new(self.metadata(locator)?);
        self.plan_with(locator, metadata)
    }

    /// List then plan every input, parsing each file's metadata once.
    pub fn plan(&self, prefix: &str) -> WindowResult<Vec<WorkItem>> {
        let store = self.factory.client()?;
        let mut items = vec![];
        for locator in self.list_inputs(prefix)? {
            let reader = self.open(store.as_ref(), &locator)?;
            let metadata = Arc::new(RasterMetadata::parse(&reader)?);
            items.extend(self.plan_with(&locator, metadata)?);
        }
        Ok(items)
    }

    fn plan_with(
        &self,
        locator: &RasterLocator,
        metadata: Arc<RasterMetadata>,
    ) -> WindowResult<Vec<WorkItem>> {
        let planner = self.options.planner();
        let bytes_per_pixel = metadata.bytes_per_pixel();
        if let Some(max) = planner.max_tile_size() {
            if planner.edge(bytes_per_pixel).is_none() {
                return Err(WindowError::InvalidOptions(format!(
                    "max_tile_size {max} is smaller than one {bytes_per_pixel} byte pixel of {locator}"
                )));
            }
        }
        let layout = &metadata.layout;
        let windows = planner.plan_aligned(
            metadata.cols,
            metadata.rows,
            bytes_per_pixel,
            (layout.segment_width, layout.segment_height),
        );
        debug!("Planned {} windows for {locator}", windows.len());
        Ok(windows
            .into_iter()
            .map(|window| WorkItem {
                locator: locator.clone(),
                window,
                metadata: metadata.clone(),
            })
            .collect())
    }

    /// A work item for an arbitrary window, parsing the file's metadata.
    pub fn work_item(&self, locator: &RasterLocator, window: PixelWindow) -> WindowResult<WorkItem> {
        Ok(WorkItem {
            locator: locator.clone(),
            window,
            metadata: Arc::new(self.metadata(locator)?),
        })
    }

    /// Items grouped per the configured partitioning, one group when none is set.
    pub fn partition(&self, items: Vec<WorkItem>) -> Vec<Vec<WorkItem>> {
        match self.options.partitioning() {
            Some(partitioning) => partitioning.apply(items),
            None => vec![items],
        }
    }

    pub fn read_window(&self, item: &WorkItem) -> WindowResult<Tile> {
        let store = self.factory.client()?;
        let reader = self.open(store.as_ref(), &item.locator)?;
        WindowedTileReader::with_metadata(reader, item.metadata.clone()).read_window(&item.window)
    }

    pub fn projected_extent(&self, item: &WorkItem) -> ProjectedExtent {
        ProjectedExtent {
            extent: item.metadata.extent(&item.window),
            crs: self
                .options
                .crs_override()
                .map(str::to_string)
                .or_else(|| item.metadata.crs()),
        }
    }

    pub fn read_spatial(&self, item: &WorkItem) -> WindowResult<(ProjectedExtent, Tile)> {
        let tile = self.read_window(item)?;
        Ok((self.projected_extent(item), tile))
    }

    /// Like `read_spatial`, keyed with the time tag. A missing or unparsable
    /// time fails the item.
    pub fn read_temporal(&self, item: &WorkItem) -> WindowResult<(TemporalProjectedExtent, Tile)> {
        let time = self.timestamp(&item.metadata)?;
        let tile = self.read_window(item)?;
        let ProjectedExtent { extent, crs } = self.projected_extent(item);
        Ok((TemporalProjectedExtent { extent, crs, time }, tile))
    }

    pub fn timestamp(&self, metadata: &RasterMetadata) -> WindowResult<DateTime<Utc>> {
        let tag = self.options.time_tag();
        let format = self.options.time_format();
        let value = metadata
            .tag(tag)
            .ok_or_else(|| WindowError::MissingTimestamp {
                tag: tag.to_string(),
            })?;
        parse_time(value.trim(), format).ok_or_else(|| WindowError::TimestampParse {
            tag: tag.to_string(),
            value: value.to_string(),
            format: format.to_string(),
        })
    }
}

/// Zoned formats keep their offset, naive ones are taken as UTC.
fn parse_time(value: &str, format: &str) -> Option<DateTime<Utc>> {
    if let Ok(zoned) = DateTime::parse_from_str(value, format) {
        return Some(zoned.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, format)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
