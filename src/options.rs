use crate::error::{WindowError, WindowResult};
use crate::io::{RasterLocator, DEFAULT_CHUNK_SIZE};
use crate::partition::Partitioning;
use crate::window::WindowPlanner;
use std::collections::BTreeSet;

pub const DEFAULT_EXTENSIONS: [&str; 2] = ["tif", "tiff"];
pub const DEFAULT_TIME_TAG: &str = "TIFFTAG_DATETIME";
/// chrono syntax for the TIFF DateTime layout `YYYY:MM:DD HH:MM:SS`.
pub const DEFAULT_TIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// How rasters are found, windowed and read. Validated once by `build`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RasterOptions {
    extensions: BTreeSet<String>,
    crs_override: Option<String>,
    time_tag: String,
    time_format: String,
    max_tile_size: Option<u64>,
    partitioning: Option<Partitioning>,
    chunk_size: Option<usize>,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            crs_override: None,
            time_tag: DEFAULT_TIME_TAG.to_string(),
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            max_tile_size: None,
            partitioning: None,
            chunk_size: None,
        }
    }
}

impl RasterOptions {
    pub fn builder() -> RasterOptionsBuilder {
        RasterOptionsBuilder::default()
    }

    /// Lowercase extensions, without the dot.
    pub fn extensions(&self) -> &BTreeSet<String> {
        &self.extensions
    }

    /// Extension match, ignoring case.
    pub fn accepts(&self, locator: &RasterLocator) -> bool {
        locator
            .extension()
            .is_some_and(|ext| self.extensions.contains(&ext.to_lowercase()))
    }

    pub fn crs_override(&self) -> Option<&str> {
        self.crs_override.as_deref()
    }

    pub fn time_tag(&self) -> &str {
        &self.time_tag
    }

    pub fn time_format(&self) -> &str {
        &self.time_format
    }

    pub fn max_tile_size(&self) -> Option<u64> {
        self.max_tile_size
    }

    pub fn partitioning(&self) -> Option<Partitioning> {
        self.partitioning
    }

    pub fn num_partitions(&self) -> Option<usize> {
        match self.partitioning {
            Some(Partitioning::Count(n)) => Some(n),
            _ => None,
        }
    }

    pub fn partition_bytes_target(&self) -> Option<u64> {
        match self.partitioning {
            Some(Partitioning::BytesTarget(n)) => Some(n),
            _ => None,
        }
    }

    /// Range read chunk size, `None` when reads go straight to the store.
    pub fn chunk_size(&self) -> Option<usize> {
        self.chunk_size
    }

    pub fn planner(&self) -> WindowPlanner {
        WindowPlanner::new(self.max_tile_size)
    }
}

#[derive(Clone, Debug, Default)]
pub struct RasterOptionsBuilder {
    extensions: Option<Vec<String>>,
    crs_override: Option<String>,
    time_tag: Option<String>,
    time_format: Option<String>,
    max_tile_size: Option<u64>,
    num_partitions: Option<usize>,
    partition_bytes_target: Option<u64>,
    chunk_size: Option<usize>,
}

impl RasterOptionsBuilder {
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = Some(
            extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
        );
        self
    }

    pub fn with_crs_override(mut self, crs: &str) -> Self {
        self.crs_override = Some(crs.to_string());
        self
    }

    pub fn with_time_tag(mut self, tag: &str) -> Self {
        self.time_tag = Some(tag.to_string());
        self
    }

    pub fn with_time_format(mut self, format: &str) -> Self {
        self.time_format = Some(format.to_string());
        self
    }

    pub fn with_max_tile_size(mut self, bytes: u64) -> Self {
        self.max_tile_size = Some(bytes);
        self
    }

    pub fn with_num_partitions(mut self, partitions: usize) -> Self {
        self.num_partitions = Some(partitions);
        self
    }

    pub fn with_partition_bytes_target(mut self, bytes: u64) -> Self {
        self.partition_bytes_target = Some(bytes);
        self
    }

    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = Some(bytes);
        self
    }

    /// Chunked range reads with the default chunk size.
    pub fn with_chunked_reads(self) -> Self {
        self.with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    pub fn build(self) -> WindowResult<RasterOptions> {
        let invalid = |msg: &str| Err(WindowError::InvalidOptions(msg.to_string()));
        let defaults = RasterOptions::default();

        let extensions = match self.extensions {
            Some(list) if list.iter().any(|e| e.is_empty()) => {
                return invalid("Empty extension in filter")
            }
            Some(list) if list.is_empty() => return invalid("Extension filter is empty"),
            Some(list) => list.into_iter().collect(),
            None => defaults.extensions,
        };

        let partitioning = match (self.num_partitions, self.partition_bytes_target) {
            (Some(_), Some(_)) => {
                return invalid("Set either num_partitions or partition_bytes_target, not both")
            }
            (Some(0), None) => return invalid("num_partitions must be positive"),
            (None, Some(0)) => return invalid("partition_bytes_target must be positive"),
            (Some(n), None) => Some(Partitioning::Count(n)),
            (None, Some(n)) => Some(Partitioning::BytesTarget(n)),
            (None, None) => None,
        };

        if self.max_tile_size == Some(0) {
            return invalid("max_tile_size must be positive");
        }
        if self.chunk_size == Some(0) {
            return invalid("chunk_size must be positive");
        }
        if matches!(&self.time_tag, Some(tag) if tag.is_empty()) {
            return invalid("time_tag is empty");
        }
        if matches!(&self.time_format, Some(format) if format.is_empty()) {
            return invalid("time_format is empty");
        }

        Ok(RasterOptions {
            extensions,
            crs_override: self.crs_override,
            time_tag: self.time_tag.unwrap_or(defaults.time_tag),
            time_format: self.time_format.unwrap_or(defaults.time_format),
            max_tile_size: self.max_tile_size,
            partitioning,
            chunk_size: self.chunk_size,
        })
    }
}
