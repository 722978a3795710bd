use super::{PathReader, ReadRange};
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::io::{Error, ErrorKind, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Where a raster lives. The store that produced it knows how to open it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RasterLocator {
    uri: String,
}

impl RasterLocator {
    pub fn new<S: Into<String>>(uri: S) -> Self {
        Self { uri: uri.into() }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        Self::new(path.as_ref().to_string_lossy())
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn extension(&self) -> Option<&str> {
        let name = self.uri.rsplit('/').next()?;
        let name = name.split(['?', '#']).next()?;
        name.rsplit_once('.').map(|(_, ext)| ext)
    }
}

impl Display for RasterLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri)
    }
}

/// Client for the store holding the rasters. Auth, retries and timeouts are
/// the client's business.
pub trait BackingStore: Send + Sync {
    /// Every object under `prefix`, in a stable order.
    fn list(&self, prefix: &str) -> Result<Vec<RasterLocator>>;

    fn open(&self, locator: &RasterLocator) -> Result<Box<dyn ReadRange>>;
}

/// Builds a store client. Called independently on each worker.
pub trait StoreFactory: Send + Sync {
    fn client(&self) -> Result<Box<dyn BackingStore>>;
}

impl<F> StoreFactory for F
where
    F: Fn() -> Result<Box<dyn BackingStore>> + Send + Sync,
{
    fn client(&self) -> Result<Box<dyn BackingStore>> {
        self()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FileSystemStore;

impl FileSystemStore {
    fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                Self::walk(&path, out)?;
            } else {
                out.push(path);
            }
        }
        Ok(())
    }
}

impl BackingStore for FileSystemStore {
    fn list(&self, prefix: &str) -> Result<Vec<RasterLocator>> {
        let root = Path::new(prefix);
        let mut paths = vec![];
        if root.is_dir() {
            Self::walk(root, &mut paths)?;
        } else if root.is_file() {
            paths.push(root.to_path_buf());
        } else {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!("No such file or directory: {prefix}"),
            ));
        }
        paths.sort();
        Ok(paths.into_iter().map(RasterLocator::from_path).collect())
    }

    fn open(&self, locator: &RasterLocator) -> Result<Box<dyn ReadRange>> {
        Ok(Box::new(PathReader::new(locator.uri())))
    }
}

impl StoreFactory for FileSystemStore {
    fn client(&self) -> Result<Box<dyn BackingStore>> {
        Ok(Box::new(*self))
    }
}

/// Objects held in process, keyed by uri. Clones share the same objects.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<BTreeMap<String, Arc<Vec<u8>>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: Into<String>>(&self, uri: S, bytes: Vec<u8>) -> Result<RasterLocator> {
        let uri = uri.into();
        self.objects
            .write()
            .map_err(|e| Error::other(format!("{e:?}")))?
            .insert(uri.clone(), Arc::new(bytes));
        Ok(RasterLocator::new(uri))
    }
}

impl BackingStore for MemoryStore {
    fn list(&self, prefix: &str) -> Result<Vec<RasterLocator>> {
        let objects = self
            .objects
            .read()
            .map_err(|e| Error::other(format!("{e:?}")))?;
        Ok(objects
            .keys()
            .filter(|uri| uri.starts_with(prefix))
            .map(RasterLocator::new)
            .collect())
    }

    fn open(&self, locator: &RasterLocator) -> Result<Box<dyn ReadRange>> {
        let objects = self
            .objects
            .read()
            .map_err(|e| Error::other(format!("{e:?}")))?;
        let bytes = objects.get(locator.uri()).cloned().ok_or_else(|| {
            Error::new(ErrorKind::NotFound, format!("No such object: {locator}"))
        })?;
        Ok(Box::new(bytes))
    }
}

impl StoreFactory for MemoryStore {
    fn client(&self) -> Result<Box<dyn BackingStore>> {
        Ok(Box::new(self.clone()))
    }
}
