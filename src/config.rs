//! Feed configuration, as read from a JSON document
//!
//! ```json
//! { "url": "https://cal.example.com/feed.ics", "username": "john", "password": "secret", "skip-tls-verify": false }
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::FeedError;
use crate::resource::Resource;

/// The settings of a single feed. Every key is optional; an empty `url` disables the cache.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(rename = "skip-tls-verify")]
    pub skip_tls_verify: bool,
}

impl FeedConfig {
    /// Read a config from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, FeedError> {
        let config_error = |err: Box<dyn std::error::Error + Send + Sync>| FeedError::Config {
            path: path.to_path_buf(),
            source: Arc::from(err),
        };
        let file = std::fs::File::open(path).map_err(|err| config_error(err.into()))?;
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(|err| config_error(err.into()))
    }

    pub fn from_json(content: &str) -> Result<Self, FeedError> {
        serde_json::from_str(content).map_err(|err| FeedError::Config {
            path: "<inline>".into(),
            source: Arc::new(err),
        })
    }

    /// Build the feed reference described by this config, or `None` in case no URL is set
    pub fn resource(&self) -> Result<Option<Resource>, FeedError> {
        if self.url.is_empty() {
            return Ok(None);
        }
        let url = Url::parse(&self.url).map_err(|source| FeedError::InvalidUrl {
            url: self.url.clone(),
            source,
        })?;
        Ok(Some(Resource::new(url)
            .with_credentials(&self.username, &self.password)
            .with_skip_tls_verify(self.skip_tls_verify)))
    }
}
