//! Errors reported by this crate

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::cache::Snapshot;

/// An error cause, shared between every caller that observes the same refresh
pub type Cause = Arc<dyn Error + Send + Sync>;

/// What went wrong while loading the configuration or refreshing a feed.
///
/// This is `Clone` because the outcome of a single refresh is handed to every caller that was waiting for it.
#[derive(Clone, Debug, Error)]
pub enum FeedError {
    /// The probe or the download failed (network error, timeout, unexpected HTTP status...)
    #[error("{operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: Cause,
    },

    /// The downloaded body is not a valid iCal file
    #[error("decoding feed: {source}")]
    Decode {
        #[source]
        source: Cause,
    },

    /// A decoded entry lacks a required property, or has an invalid one
    #[error("getting {property}: {reason}")]
    Extraction {
        property: &'static str,
        reason: String,
    },

    #[error("loading config {path:?}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: Cause,
    },

    #[error("invalid feed URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("building HTTP client: {source}")]
    Client {
        #[source]
        source: Cause,
    },
}

impl FeedError {
    pub(crate) fn transport<E: Into<Box<dyn Error + Send + Sync>>>(operation: &'static str, err: E) -> Self {
        Self::Transport { operation, source: Arc::from(err.into()) }
    }

    pub(crate) fn decode<E: Into<Box<dyn Error + Send + Sync>>>(err: E) -> Self {
        Self::Decode { source: Arc::from(err.into()) }
    }

    pub(crate) fn extraction<S: ToString>(property: &'static str, reason: S) -> Self {
        Self::Extraction { property, reason: reason.to_string() }
    }
}

/// A refresh failed. The last known good events are still available in `cached`.
#[derive(Clone, Debug, Error)]
#[error("refreshing feed failed: {source}")]
pub struct FetchError {
    /// The events that were cached before the failed refresh
    pub cached: Snapshot,
    #[source]
    pub source: FeedError,
}

impl FetchError {
    /// Ignore the error and keep the cached events
    pub fn into_cached(self) -> Snapshot {
        self.cached
    }
}
