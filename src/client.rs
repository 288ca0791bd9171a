//! This module provides the HTTP side of a feed: a cheap `HEAD` probe, and a full download

use std::error::Error;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use reqwest::header::LAST_MODIFIED;
use reqwest::Method;

use crate::error::FeedError;
use crate::resource::Resource;

/// Every request (probe or download) is aborted after this delay
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Downloads larger than this are rejected
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// The only `Last-Modified` layout this crate understands, e.g. `Sun, 14 May 2023 09:30:00 GMT`
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// What a probe tells about the remote feed
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Probe {
    /// The raw `Last-Modified` header, if the server sent one
    pub last_modified: Option<String>,
}

impl Probe {
    /// The `Last-Modified` header, in case it is present and valid
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        let raw = self.last_modified.as_deref()?;
        let parsed = parse_http_date(raw);
        if parsed.is_none() {
            log::debug!("Ignoring malformed Last-Modified header {:?}", raw);
        }
        parsed
    }
}

/// Where feeds are fetched from.
///
/// This is usually a [`Client`], but it can be mocked in tests.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Ask for the feed metadata, without downloading it
    async fn probe(&self) -> Result<Probe, Box<dyn Error + Send + Sync>>;

    /// Download the whole feed
    async fn download(&self) -> Result<Vec<u8>, Box<dyn Error + Send + Sync>>;
}


/// An HTTP(S) client dedicated to a single feed.
///
/// Its TLS policy is set once and for all when it is created, so that clients for different feeds never share mutable transport settings.
#[derive(Clone, Debug)]
pub struct Client {
    resource: Resource,
    http: reqwest::Client,
    max_body_size: usize,
}

impl Client {
    /// Create a client. This does not start a connection
    pub fn new(resource: Resource) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(resource.skip_tls_verify())
            .build()
            .map_err(|err| FeedError::Client { source: std::sync::Arc::new(err) })?;

        Ok(Self { resource, http, max_body_size: MAX_BODY_SIZE })
    }

    /// Change the maximum size of a downloaded feed (default is [`MAX_BODY_SIZE`])
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    async fn send(&self, method: Method) -> Result<reqwest::Response, Box<dyn Error + Send + Sync>> {
        let mut request = self.http.request(method.clone(), self.resource.url().clone());
        if let Some(username) = self.resource.username() {
            request = request.basic_auth(username, self.resource.password());
        }

        let response = request.send().await?;
        if response.status().is_success() == false {
            return Err(format!("Unexpected HTTP status code {:?} for {} {}", response.status(), method, self.resource.url()).into());
        }
        Ok(response)
    }
}

#[async_trait]
impl Upstream for Client {
    async fn probe(&self) -> Result<Probe, Box<dyn Error + Send + Sync>> {
        let response = self.send(Method::HEAD).await?;
        let last_modified = match response.headers().get(LAST_MODIFIED) {
            None => None,
            Some(value) => match value.to_str() {
                Ok(s) => Some(s.to_string()),
                Err(_) => {
                    log::debug!("Ignoring non-ASCII Last-Modified header");
                    None
                },
            },
        };
        Ok(Probe { last_modified })
    }

    async fn download(&self) -> Result<Vec<u8>, Box<dyn Error + Send + Sync>> {
        let mut response = self.send(Method::GET).await?;
        if let Some(length) = response.content_length() {
            if length > self.max_body_size as u64 {
                return Err(format!("Feed is too large ({} bytes, at most {} are allowed)", length, self.max_body_size).into());
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_body_size {
                return Err(format!("Feed is too large (more than {} bytes)", self.max_body_size).into());
            }
            body.extend_from_slice(&chunk);
        }
        log::debug!("Downloaded {} bytes from {}", body.len(), self.resource.url());
        Ok(body)
    }
}


/// Parse an HTTP date, in the fixed `Wdy, DD Mon YYYY HH:MM:SS GMT` layout only
pub fn parse_http_date(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), HTTP_DATE_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
