use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures::TryStreamExt;
use log::{debug, info, warn};
use reqwest::{Client, Response, StatusCode};
use tokio_util::io::{StreamReader, SyncIoBridge};

use crate::error::{Error, Result};
use crate::models::{DownloadRecord, Report, TransferTarget};
use crate::platform::Artifact;
use crate::progress::{DEFAULT_INTERVAL, Policy, RenderStyle, Reporter};
use crate::scraper;
use crate::verify;

pub const DEFAULT_LISTING_URL: &str = "https://go.dev/dl/";

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub timeout: Duration,
    pub proxy: Option<String>,
    pub policy: Policy,
    pub interval: Duration,
    pub style: RenderStyle,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            proxy: None,
            policy: Policy::default(),
            interval: DEFAULT_INTERVAL,
            style: RenderStyle::default(),
        }
    }
}

/// The release listing page and how many highlighted rows it must yield.
#[derive(Debug, Clone)]
pub struct Listing {
    pub url: String,
    pub origin: String,
    pub count: usize,
}

impl Listing {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self::from_origin(url, scraper::origin_of(url)?))
    }

    /// Uses `origin` as given; `url` is not parsed.
    pub fn from_origin(url: &str, origin: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            origin: origin.into(),
            count: Artifact::COUNT,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }
}

pub struct Downloader {
    client: Client,
    reporter: Reporter,
    style: RenderStyle,
}

impl Downloader {
    pub fn new(options: &DownloadOptions) -> Result<Self> {
        let mut client_builder = Client::builder()
            .timeout(options.timeout)
            .user_agent(USER_AGENT);

        if let Some(proxy_url) = &options.proxy {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| Error::network(proxy_url, e))?;
            client_builder = client_builder.proxy(proxy);
        }

        let client = client_builder.build().map_err(Error::Client)?;

        Ok(Self {
            client,
            reporter: Reporter::new(options.policy, options.interval),
            style: options.style,
        })
    }

    async fn get(&self, url: &str) -> Result<Response> {
        debug!("GET {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::network(url, e))?;

        if response.status() != StatusCode::OK {
            return Err(Error::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }
        Ok(response)
    }

    /// Fetches the listing page and extracts exactly `listing.count` records.
    ///
    /// The body is fed to the tokenizer as it arrives; once enough rows are
    /// found the rest of the page is never read.
    pub async fn fetch_listing(&self, listing: &Listing) -> Result<Vec<DownloadRecord>> {
        let response = self.get(&listing.url).await?;
        let stream = Box::pin(response.bytes_stream().map_err(io::Error::other));
        let bridge = SyncIoBridge::new(StreamReader::new(stream));

        let origin = listing.origin.clone();
        let count = listing.count;
        let records = tokio::task::spawn_blocking(move || {
            scraper::extract_records(bridge, count, &origin)
        })
        .await
        .map_err(|e| Error::Listing {
            source: io::Error::other(e),
        })?
        .map_err(|source| Error::Listing { source })?;

        info!("extracted {} of {} records from {}", records.len(), count, listing.url);
        scraper::require_complete(records, count)
    }

    /// Streams `target.source` into `<destination>.tmp` and renames it to
    /// `destination` once every byte has arrived. Returns the byte count.
    ///
    /// The destination is only ever created by the final rename, so a failed
    /// transfer never leaves a partial file under the final name.
    pub async fn download(&self, target: &TransferTarget) -> Result<u64> {
        let (partial, file) = PartialFile::create(&target.destination)?;

        let mut response = self.get(&target.source).await?;
        let total = response.content_length().unwrap_or(0);
        debug!("content length of {}: {total}", target.source);

        let mut writer = self
            .reporter
            .wrap(file, total, self.style.renderer(total))
            .map_err(|e| Error::io(partial.path(), e))?;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::network(&target.source, e))?
        {
            writer
                .write_all(&chunk)
                .map_err(|e| Error::io(partial.path(), e))?;
        }

        let received = writer.written();
        let file = writer.finish();
        check_length(total, received)?;

        partial.commit(file, &target.destination)?;
        info!("saved {received} bytes to {}", target.destination.display());
        Ok(received)
    }

    /// Listing → selection → download → verification in one call.
    pub async fn fetch_artifact(
        &self,
        listing: &Listing,
        index: usize,
        output_dir: &Path,
    ) -> Result<Report> {
        let records = self.fetch_listing(listing).await?;
        let (record, target) = select_target(records, index, output_dir)?;
        info!("to download: {}", record.location);

        let start = Instant::now();
        let bytes = self.download(&target).await?;
        let elapsed = start.elapsed();
        let verification = verify::verify(&target.destination, &target.expected_digest)?;

        Ok(Report {
            record,
            path: target.destination,
            bytes,
            elapsed,
            verification,
        })
    }
}

/// With a declared length (`total > 0`), the body must match it exactly.
fn check_length(total: u64, received: u64) -> Result<()> {
    if total > 0 && received != total {
        return Err(Error::Truncated {
            expected: total,
            received,
        });
    }
    Ok(())
}

/// Picks record `index` and resolves its destination inside `output_dir`,
/// creating the directory if needed.
pub fn select_target(
    mut records: Vec<DownloadRecord>,
    index: usize,
    output_dir: &Path,
) -> Result<(DownloadRecord, TransferTarget)> {
    if index >= records.len() {
        return Err(Error::NoSuchEntry {
            index,
            available: records.len(),
        });
    }
    let record = records.swap_remove(index);

    fs::create_dir_all(output_dir).map_err(|e| Error::fs(output_dir, e))?;
    let target = TransferTarget::from_record(record.clone(), output_dir)?;
    Ok((record, target))
}

pub fn temp_path(destination: &Path) -> PathBuf {
    let mut path = destination.as_os_str().to_owned();
    path.push(".tmp");
    PathBuf::from(path)
}

/// The `.tmp` file of an in-flight download. Removed on drop unless it was
/// committed, or kept after a failed rename.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn create(destination: &Path) -> Result<(Self, File)> {
        let path = temp_path(destination);
        let file = File::create(&path).map_err(|e| Error::fs(&path, e))?;
        debug!("writing to {}", path.display());
        Ok((Self { path, armed: true }, file))
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn commit(mut self, file: File, destination: &Path) -> Result<()> {
        file.sync_all().map_err(|e| Error::io(&self.path, e))?;
        drop(file);

        if let Err(e) = fs::rename(&self.path, destination) {
            self.armed = false;
            return Err(Error::fs(destination, e));
        }
        self.armed = false;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("failed to remove {}: {e}", self.path.display());
        }
    }
}
