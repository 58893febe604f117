//! Fetch a release artifact listed on an HTML download page, stream it to
//! disk with non-blocking progress reporting, commit it atomically and check
//! its SHA-256.

pub mod downloader;
pub mod error;
pub mod models;
pub mod platform;
pub mod progress;
pub mod scraper;
pub mod verify;

pub use downloader::{DEFAULT_LISTING_URL, DownloadOptions, Downloader, Listing};
pub use error::{Error, Result};
pub use models::{DownloadRecord, Report, TransferTarget};
pub use verify::Verification;
