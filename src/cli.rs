use std::path::PathBuf;

use clap::Parser;
use go_dl::progress::{Policy, RenderStyle};
use go_dl::{DEFAULT_LISTING_URL, Listing};

#[derive(Parser, Debug)]
#[command(name = "go-dl")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Release listing page
    #[arg(long, env = "GO_DL_URL", default_value = DEFAULT_LISTING_URL)]
    pub url: String,

    /// Origin prepended to site-relative links (default: origin of --url)
    #[arg(long)]
    pub origin: Option<String>,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Number of highlighted rows the listing must provide
    #[arg(short = 'n', long, default_value = "5")]
    pub count: usize,

    /// Row to download (default: the one matching this platform)
    #[arg(short, long)]
    pub index: Option<usize>,

    /// How progress updates are handed to the renderer
    #[arg(long, value_enum, default_value = "lossy")]
    pub policy: Policy,

    /// Renderer wake-up interval in milliseconds
    #[arg(long, default_value = "1000")]
    pub interval_ms: u64,

    /// Progress display
    #[arg(long, value_enum, default_value = "line")]
    pub style: RenderStyle,

    /// Request timeout in seconds
    #[arg(long, default_value = "300")]
    pub timeout: u64,

    /// HTTP proxy (e.g., http://127.0.0.1:7890)
    #[arg(long, env = "GO_DL_PROXY")]
    pub proxy: Option<String>,

    /// Print the extracted rows and exit
    #[arg(long)]
    pub list: bool,

    /// With --list, print the rows as JSON
    #[arg(long, requires = "list")]
    pub json: bool,

    /// Delete the download if its checksum does not match
    #[arg(long)]
    pub remove_on_mismatch: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// An explicit `--origin` wins; otherwise it comes from `--url`.
    pub fn listing(&self) -> go_dl::Result<Listing> {
        let listing = match &self.origin {
            Some(origin) => Listing::from_origin(&self.url, origin.as_str()),
            None => Listing::new(&self.url)?,
        };
        Ok(listing.with_count(self.count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::parse_from(["go-dl"]);
        assert_eq!(args.count, 5);
        assert_eq!(args.policy, Policy::Lossy);
        assert_eq!(args.style, RenderStyle::Line);
        assert_eq!(args.interval_ms, 1000);
        assert!(args.index.is_none());
        assert!(!args.list);
    }

    #[test]
    fn json_requires_list() {
        assert!(Args::try_parse_from(["go-dl", "--json"]).is_err());
        let args = Args::try_parse_from(["go-dl", "--list", "--json", "--policy", "blocking"]).unwrap();
        assert!(args.json);
        assert_eq!(args.policy, Policy::Blocking);
    }

    #[test]
    fn listing_prefers_explicit_origin() {
        let args = Args::parse_from([
            "go-dl",
            "--url",
            "mirror/dl.html",
            "--origin",
            "https://go.dev",
            "-n",
            "3",
        ]);
        let listing = args.listing().unwrap();
        assert_eq!(listing.origin, "https://go.dev");
        assert_eq!(listing.count, 3);

        let args = Args::parse_from(["go-dl", "--url", "mirror/dl.html"]);
        assert!(args.listing().is_err());

        let args = Args::parse_from(["go-dl", "--url", "http://127.0.0.1:8080/dl/"]);
        assert_eq!(args.listing().unwrap().origin, "http://127.0.0.1:8080");
    }
}
