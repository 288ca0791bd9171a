//! This crate provides a caching client for remote iCal feeds (e.g. `webcal://` subscriptions).
//!
//! Calendar apps usually ask for "the current events" way more often than the feed actually changes.
//! The [`Cache`] in the [`cache`] module keeps the last known events, and only contacts the server once they are older than a given interval. \
//! Even then, it starts with a `HEAD` request, and only downloads the feed if its `Last-Modified` header is newer than the known one.
//!
//! The HTTP side lives in the [`client`] module. Decoding the iCal format is delegated to a [`Decoder`](ical::Decoder), see the [`ical`] module.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use icalcache::{Cache, FeedConfig};
//!
//! let config = FeedConfig::from_file(std::path::Path::new("feed.json"))?;
//! let cache = Cache::from_config(&config)?;
//! let snapshot = cache.get(chrono_tz::Europe::Berlin).await?;
//! for event in snapshot.events() {
//!     println!("{} {}", event.start(), event.summary());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub use cache::{Cache, Snapshot};
pub mod client;
pub mod config;
pub use config::FeedConfig;
pub mod error;
pub use error::{FeedError, FetchError};
mod event;
pub use event::Event;
pub mod extract;
pub mod fingerprint;
pub mod ical;
mod resource;
pub use resource::Resource;

pub mod mock_behaviour;
pub mod utils;
