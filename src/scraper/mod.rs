//! Extraction of download records from the release listing page.
//!
//! A record is read from a row shaped like
//!
//! ```text
//! <tr class="highlight">
//!   <td><a href="/dl/go1.22.0.linux-amd64.tar.gz">go1.22.0.linux-amd64.tar.gz</a></td>
//!   ...
//!   <td><tt>5a8e4ba1...</tt></td>
//! </tr>
//! ```
//!
//! The page is scanned once, front to back, and scanning stops as soon as the
//! requested number of records is collected.

pub mod tokenizer;

use std::io::{self, Read};

use log::debug;
use reqwest::Url;

use crate::error::{Error, Result};
use crate::models::DownloadRecord;
use tokenizer::{Tag, Token, Tokenizer};

pub const HIGHLIGHT_CLASS: &str = "highlight";

const ROW_TAG: &str = "tr";
const ANCHOR_TAG: &str = "a";
const CHECKSUM_TAG: &str = "tt";

/// Returns up to `n` records in document order.
///
/// Reaching the end of the document mid-row is not an error; whatever was
/// collected so far is returned and the caller decides whether it is enough
/// (see [`require_complete`]).
pub fn extract_records<R: Read>(
    reader: R,
    n: usize,
    origin: &str,
) -> io::Result<Vec<DownloadRecord>> {
    let mut records = Vec::with_capacity(n);
    if n == 0 {
        return Ok(records);
    }

    let mut tokens = Tokenizer::new(reader);
    while let Some(token) = tokens.next() {
        let Token::StartTag(tag) = token? else {
            continue;
        };
        if !is_highlight_row(&tag) {
            continue;
        }

        let Some(anchor) = next_start_tag(&mut tokens, ANCHOR_TAG)? else {
            break;
        };
        let Some(href) = anchor.attr("href").filter(|href| is_qualifying_href(href)) else {
            debug!("skipping highlighted row without a downloadable href");
            continue;
        };
        let location = normalize_href(href, origin);

        let Some(name) = next_text(&mut tokens)? else {
            break;
        };
        if next_start_tag(&mut tokens, CHECKSUM_TAG)?.is_none() {
            break;
        }
        let Some(expected_digest) = next_text(&mut tokens)? else {
            break;
        };

        debug!("found {name} at {location}");
        records.push(DownloadRecord {
            name,
            location,
            expected_digest,
        });
        if records.len() == n {
            break;
        }
    }

    Ok(records)
}

/// Turns an under-count into [`Error::IncompleteListing`].
pub fn require_complete(records: Vec<DownloadRecord>, expected: usize) -> Result<Vec<DownloadRecord>> {
    if records.len() < expected {
        return Err(Error::IncompleteListing {
            found: records.len(),
            expected,
        });
    }
    Ok(records)
}

/// Scheme, host and port of `url`, e.g. `https://go.dev`.
pub fn origin_of(url: &str) -> Result<String> {
    let invalid = || Error::InvalidUrl {
        url: url.to_string(),
    };
    let parsed = Url::parse(url).map_err(|_| invalid())?;
    let origin = parsed.origin();
    if !origin.is_tuple() {
        return Err(invalid());
    }
    Ok(origin.ascii_serialization())
}

pub fn has_http_scheme(href: &str) -> bool {
    let starts_with = |prefix: &str| {
        href.get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    };
    starts_with("http://") || starts_with("https://")
}

/// Absolute http(s) links and site-relative paths qualify.
pub fn is_qualifying_href(href: &str) -> bool {
    has_http_scheme(href) || href.starts_with('/')
}

/// Prefixes `href` with `origin` unless it already carries a scheme.
pub fn normalize_href(href: &str, origin: &str) -> String {
    if has_http_scheme(href) {
        return href.to_string();
    }

    let origin = origin.trim_end_matches('/');
    if let Some(rest) = href.strip_prefix("//") {
        let scheme = origin.split_once("://").map_or("https", |(scheme, _)| scheme);
        return format!("{scheme}://{rest}");
    }
    if href.starts_with('/') {
        format!("{origin}{href}")
    } else {
        format!("{origin}/{href}")
    }
}

fn is_highlight_row(tag: &Tag) -> bool {
    tag.name == ROW_TAG && tag.attr("class") == Some(HIGHLIGHT_CLASS)
}

fn next_start_tag<R: Read>(tokens: &mut Tokenizer<R>, name: &str) -> io::Result<Option<Tag>> {
    for token in tokens {
        if let Token::StartTag(tag) = token? {
            if tag.name == name {
                return Ok(Some(tag));
            }
        }
    }
    Ok(None)
}

fn next_text<R: Read>(tokens: &mut Tokenizer<R>) -> io::Result<Option<String>> {
    for token in tokens {
        if let Token::Text(text) = token? {
            let text = text.trim();
            if !text.is_empty() {
                return Ok(Some(text.to_string()));
            }
        }
    }
    Ok(None)
}
