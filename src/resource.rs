use url::Url;

/// The address of a feed, with its credentials and TLS policy
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    url: Url,
    credentials: Option<(String, String)>,
    skip_tls_verify: bool,
}

impl Resource {
    pub fn new(url: Url) -> Self {
        Self { url, credentials: None, skip_tls_verify: false }
    }

    /// Use HTTP Basic authentication. An empty `username` means no authentication at all.
    pub fn with_credentials<T: ToString, U: ToString>(mut self, username: T, password: U) -> Self {
        let username = username.to_string();
        self.credentials = if username.is_empty() {
            None
        } else {
            Some((username, password.to_string()))
        };
        self
    }

    /// Accept invalid TLS certificates for this feed
    pub fn with_skip_tls_verify(mut self, skip: bool) -> Self {
        self.skip_tls_verify = skip;
        self
    }

    pub fn url(&self) -> &Url { &self.url }
    pub fn username(&self) -> Option<&str> { self.credentials.as_ref().map(|(u, _)| u.as_str()) }
    pub fn password(&self) -> Option<&str> { self.credentials.as_ref().map(|(_, p)| p.as_str()) }
    pub fn skip_tls_verify(&self) -> bool { self.skip_tls_verify }
}
