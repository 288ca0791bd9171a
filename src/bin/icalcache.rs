use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use clap::Parser;

use icalcache::{Cache, FeedConfig};

/// Fetch an iCal feed through the cache and print its events
#[derive(Debug, Parser)]
#[command()]
struct Arguments {
    /// the JSON config of the feed (`url`, `username`, `password`, `skip-tls-verify`)
    config: PathBuf,
    /// the zone used for floating times and unknown TZIDs
    #[arg(long, default_value = "UTC")]
    timezone: String,
    /// the minimum delay between two refreshes, in seconds
    #[arg(long)]
    interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Arguments::parse();

    let timezone: Tz = match args.timezone.parse() {
        Ok(tz) => tz,
        Err(err) => {
            log::error!("Invalid timezone {:?}: {}", args.timezone, err);
            std::process::exit(1);
        },
    };

    let config = match FeedConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(err) => {
            log::error!("{}", err);
            std::process::exit(1);
        },
    };
    let mut cache = match Cache::from_config(&config) {
        Ok(cache) => cache,
        Err(err) => {
            log::error!("{}", err);
            std::process::exit(1);
        },
    };
    if let Some(secs) = args.interval_secs {
        cache = cache.with_interval(Duration::from_secs(secs));
    }
    if cache.is_enabled() == false {
        log::warn!("No URL in {:?}, nothing to fetch", args.config);
    }

    match cache.get(timezone).await {
        Ok(snapshot) => icalcache::utils::print_event_list(&snapshot),
        Err(err) => {
            log::error!("{}", err);
            icalcache::utils::print_event_list(&err.cached);
            std::process::exit(2);
        },
    }
}
