mod cli;

use std::fs;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::LevelFilter;

use cli::Args;
use go_dl::platform::{self, Artifact};
use go_dl::{DownloadOptions, DownloadRecord, Downloader, Verification};

fn init_logging(verbose: bool) {
    let default = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };
    env_logger::Builder::new()
        .filter_level(default)
        .parse_default_env()
        .init();
}

fn print_records(records: &[DownloadRecord], json: bool) -> Result<()> {
    if json {
        let content =
            serde_json::to_string_pretty(records).context("Failed to serialize records")?;
        println!("{content}");
        return Ok(());
    }

    for (idx, record) in records.iter().enumerate() {
        println!("[{idx}] {}", record.name);
        println!("    {}", record.location);
        println!("    sha256 {}", record.expected_digest);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    println!("Current go version: {}", platform::installed_go_version());

    let options = DownloadOptions {
        timeout: Duration::from_secs(args.timeout),
        proxy: args.proxy.clone(),
        policy: args.policy,
        interval: Duration::from_millis(args.interval_ms),
        style: args.style,
    };
    let downloader = Downloader::new(&options)?;

    let listing = args.listing()?;

    if args.list {
        let records = downloader
            .fetch_listing(&listing)
            .await
            .with_context(|| format!("Failed to read download listing from {}", args.url))?;
        return print_records(&records, args.json);
    }

    let index = args.index.unwrap_or_else(|| Artifact::detect().index());
    let report = downloader
        .fetch_artifact(&listing, index, &args.output)
        .await
        .with_context(|| format!("Failed to fetch entry {index} of {}", args.url))?;

    println!("Downloaded {}\n  from {}", report.path.display(), report.record.location);
    println!("Done in {:?}...", report.elapsed);

    match report.verification {
        Verification::Matched => {
            println!("{}", Verification::Matched);
            Ok(())
        }
        mismatch => {
            if args.remove_on_mismatch {
                fs::remove_file(&report.path)
                    .with_context(|| format!("Failed to remove {}", report.path.display()))?;
                println!("Removed {}", report.path.display());
            }
            Err(anyhow!("{mismatch}"))
        }
    }
}
