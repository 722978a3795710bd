use super::{BackingStore, RasterLocator, ReadRange, StoreFactory};
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::{IntoUrl, StatusCode, Url};
use std::io::{Error, ErrorKind, Result};
use std::sync::OnceLock;
use tracing::*;

#[derive(Clone, Debug)]
pub struct HttpReader {
    client: Client,
    url: Url,
    length: OnceLock<u64>,
}

impl HttpReader {
    pub fn new<U: IntoUrl>(client: Client, url: U) -> Result<Self> {
        Ok(Self {
            client,
            url: url
                .into_url()
                .map_err(|e| Error::new(ErrorKind::AddrNotAvailable, format!("{e:?}")))?,
            length: OnceLock::new(),
        })
    }
}

impl ReadRange for HttpReader {
    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let end = start + buf.len() as u64 - 1; // GOTCHA byte range includes end
        debug!("GET {} bytes={start}-{end}", self.url);
        let response = self
            .client
            .get(self.url.clone())
            .header(RANGE, format!("bytes={start}-{end}"))
            .send()
            .map_err(|e| Error::new(ErrorKind::NotConnected, format!("{e:?}")))?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {}
            StatusCode::RANGE_NOT_SATISFIABLE => return Ok(0),
            status => {
                return Err(Error::other(format!(
                    "Range request to {} failed: {status}",
                    self.url
                )))
            }
        }

        let bytes = response
            .bytes()
            .map_err(|e| Error::new(ErrorKind::InvalidData, format!("{e:?}")))?;
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(n)
    }

    fn total_length(&self) -> Result<u64> {
        if let Some(length) = self.length.get() {
            return Ok(*length);
        }
        let response = self
            .client
            .head(self.url.clone())
            .send()
            .map_err(|e| Error::new(ErrorKind::NotConnected, format!("{e:?}")))?;
        let length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidData,
                    format!("No content length for {}", self.url),
                )
            })?;
        Ok(*self.length.get_or_init(|| length))
    }
}

/// Reads rasters addressed by http(s) urls. Listing is not supported, a
/// prefix is treated as a single object.
#[derive(Clone, Debug, Default)]
pub struct HttpStore {
    client: Client,
}

impl HttpStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl BackingStore for HttpStore {
    fn list(&self, prefix: &str) -> Result<Vec<RasterLocator>> {
        Ok(vec![RasterLocator::new(prefix)])
    }

    fn open(&self, locator: &RasterLocator) -> Result<Box<dyn ReadRange>> {
        Ok(Box::new(HttpReader::new(
            self.client.clone(),
            locator.uri(),
        )?))
    }
}

impl StoreFactory for HttpStore {
    fn client(&self) -> Result<Box<dyn BackingStore>> {
        Ok(Box::new(self.clone()))
    }
}
