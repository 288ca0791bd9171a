//! This module provides an in-memory cache for a remote iCal feed
//!
//! A [`Cache`] only contacts the server when its content is older than a given interval.
//! Even then, it first sends a cheap `HEAD` request, and only downloads the whole feed if it has changed.
//!
//! At most one refresh is running for a given `Cache` at any time: callers that arrive while a refresh is in progress wait for it, and get its outcome.

use std::sync::{Arc, RwLock};

use chrono_tz::Tz;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::client::{Client, Upstream};
use crate::config::FeedConfig;
use crate::error::{FeedError, FetchError};
use crate::ical::{Decoder, IcalDecoder};

mod refresh;
mod store;
pub use store::Snapshot;
use store::Store;

/// Intervals shorter than this are not allowed, since they are close to the request timeout
pub const MIN_INTERVAL: Duration = Duration::from_secs(30);
/// The interval used when none (or an invalid one) has been set
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2 * 60);


/// The outcome of the last refresh, readable without waiting for a running refresh
#[derive(Debug, Default)]
struct Published {
    /// Incremented by every refresh attempt
    generation: u64,
    checked_at: Option<Instant>,
    snapshot: Snapshot,
    error: Option<FeedError>,
}

impl Published {
    fn is_fresh(&self, now: Instant, interval: Duration) -> bool {
        self.checked_at
            .map(|checked| now.saturating_duration_since(checked) < interval)
            .unwrap_or(false)
    }

    fn outcome(&self) -> Result<Snapshot, FetchError> {
        match &self.error {
            None => Ok(self.snapshot.clone()),
            Some(err) => Err(FetchError { cached: self.snapshot.clone(), source: err.clone() }),
        }
    }
}


/// A cached iCal feed
///
/// `U` is where the feed comes from (usually a [`Client`]), `D` decodes it (usually an [`IcalDecoder`]).
/// Share it between tasks with an `Arc<Cache>`.
pub struct Cache<U = Client, D = IcalDecoder> {
    /// `None` when no feed is configured
    upstream: Option<U>,
    decoder: D,
    interval: Duration,

    /// Held for the whole duration of a refresh
    store: Mutex<Store>,
    published: RwLock<Arc<Published>>,
}

impl Cache<Client, IcalDecoder> {
    /// Create a cache for the feed described in `config`. This does not start a connection.
    ///
    /// An empty URL in `config` gives a disabled cache, that always returns an empty list of events.
    pub fn from_config(config: &FeedConfig) -> Result<Self, FeedError> {
        let upstream = match config.resource()? {
            None => None,
            Some(resource) => Some(Client::new(resource)?),
        };
        Ok(Self::new(upstream, IcalDecoder))
    }
}

impl<U, D> Cache<U, D>
where
    U: Upstream,
    D: Decoder,
{
    pub fn new(upstream: Option<U>, decoder: D) -> Self {
        Self {
            upstream,
            decoder,
            interval: DEFAULT_INTERVAL,
            store: Mutex::new(Store::default()),
            published: RwLock::new(Arc::new(Published::default())),
        }
    }

    /// Set the minimum delay between two refresh attempts.
    ///
    /// Values under [`MIN_INTERVAL`] are replaced by [`DEFAULT_INTERVAL`].
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if interval < MIN_INTERVAL {
            log::warn!("Refresh interval {:?} is too short, using {:?} instead", interval, DEFAULT_INTERVAL);
            self.interval = DEFAULT_INTERVAL;
        } else {
            self.interval = interval;
        }
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a feed is configured
    pub fn is_enabled(&self) -> bool {
        self.upstream.is_some()
    }

    pub fn upstream(&self) -> Option<&U> {
        self.upstream.as_ref()
    }

    /// Returns the events of the feed, refreshing them first if they are older than the interval.
    ///
    /// `default_tz` is used for floating times, and for `TZID`s that are not in the timezone database.
    ///
    /// In case the refresh fails, the error contains the last known good events.
    pub async fn get(&self, default_tz: Tz) -> Result<Snapshot, FetchError> {
        let upstream = match &self.upstream {
            None => return Ok(Snapshot::default()),
            Some(upstream) => upstream,
        };

        let seen = self.published();
        if seen.is_fresh(Instant::now(), self.interval) {
            return Ok(seen.snapshot.clone());
        }

        let mut store = self.store.lock().await;

        let current = self.published();
        if current.generation != seen.generation {
            log::debug!("Feed has been refreshed while we were waiting, using this result");
            return current.outcome();
        }
        let now = Instant::now();
        if store.is_fresh(now, self.interval) {
            return Ok(store.snapshot());
        }

        store.mark_checked(now);
        let result = refresh::run(upstream, &self.decoder, &mut store, default_tz).await;
        if let Err(err) = &result {
            log::warn!("Unable to refresh feed, serving cached events: {}", err);
        }

        let published = Arc::new(Published {
            generation: current.generation + 1,
            checked_at: store.last_checked(),
            snapshot: store.snapshot(),
            error: result.err(),
        });
        *self.published.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::clone(&published);
        published.outcome()
    }

    fn published(&self) -> Arc<Published> {
        let published = self.published.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&published)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use chrono_tz::Europe::Berlin;

    use crate::mock_behaviour::{MockBehaviour, MockUpstream};

    const LAST_MODIFIED: &str = "Sun, 14 May 2023 09:30:00 GMT";
    const LATER_MODIFIED: &str = "Mon, 15 May 2023 09:30:00 GMT";

    fn feed(uids: &[&str]) -> String {
        let mut ics = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Example Corp//Feed//EN\r\n");
        for uid in uids {
            ics.push_str(&format!("BEGIN:VEVENT\r\nUID:{}\r\nSUMMARY:Event {}\r\nDTSTART:20230514T093000Z\r\nEND:VEVENT\r\n", uid, uid));
        }
        ics.push_str("END:VCALENDAR\r\n");
        ics
    }

    fn uids(snapshot: &Snapshot) -> Vec<&str> {
        snapshot.events().iter().map(|e| e.uid()).collect()
    }

    fn cache_for(mock: MockUpstream) -> Cache<MockUpstream, IcalDecoder> {
        Cache::new(Some(mock), IcalDecoder)
    }

    fn mock(cache: &Cache<MockUpstream, IcalDecoder>) -> &MockUpstream {
        cache.upstream().unwrap()
    }

    async fn wait_for_next_refresh(cache: &Cache<MockUpstream, IcalDecoder>) {
        tokio::time::advance(cache.interval() + Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_disabled_cache() {
        let _ = env_logger::builder().is_test(true).try_init();

        let cache: Cache<MockUpstream, IcalDecoder> = Cache::new(None, IcalDecoder);
        assert!(cache.is_enabled() == false);
        let snapshot = cache.get(Berlin).await.unwrap();
        assert!(snapshot.events().is_empty());
        assert_eq!(snapshot.last_modified(), None);
    }

    #[test]
    fn test_interval_is_clamped() {
        let cache = cache_for(MockUpstream::default());
        assert_eq!(cache.interval(), DEFAULT_INTERVAL);

        let cache = cache.with_interval(Duration::from_secs(5));
        assert_eq!(cache.interval(), DEFAULT_INTERVAL);

        let cache = cache.with_interval(Duration::from_secs(30));
        assert_eq!(cache.interval(), Duration::from_secs(30));

        let cache = cache.with_interval(Duration::from_secs(3600));
        assert_eq!(cache.interval(), Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_no_network_within_interval() {
        let _ = env_logger::builder().is_test(true).try_init();
        tokio::time::pause();

        let cache = cache_for(MockUpstream::new(feed(&["a", "b"])));
        let first = cache.get(Berlin).await.unwrap();
        assert_eq!(uids(&first), vec!["a", "b"]);

        tokio::time::advance(Duration::from_secs(60)).await;
        mock(&cache).set_body(feed(&["c"]));
        let second = cache.get(Berlin).await.unwrap();
        assert_eq!(second, first);
        assert!(second.shares_events_with(&first));
        assert_eq!(mock(&cache).probe_count(), 1);
        assert_eq!(mock(&cache).download_count(), 1);

        wait_for_next_refresh(&cache).await;
        let third = cache.get(Berlin).await.unwrap();
        assert_eq!(uids(&third), vec!["c"]);
        assert_eq!(mock(&cache).probe_count(), 2);
    }

    #[tokio::test]
    async fn test_unchanged_last_modified_skips_download() {
        let _ = env_logger::builder().is_test(true).try_init();
        tokio::time::pause();

        let upstream = MockUpstream::new(feed(&["a"]));
        upstream.set_last_modified(Some(LAST_MODIFIED));
        let cache = cache_for(upstream);

        let first = cache.get(Berlin).await.unwrap();
        assert_eq!(first.last_modified_timestamp(), 1684056600);
        assert_eq!(mock(&cache).download_count(), 1);

        // The server content changes, but not its Last-Modified header
        mock(&cache).set_body(feed(&["b"]));
        wait_for_next_refresh(&cache).await;
        let second = cache.get(Berlin).await.unwrap();
        assert_eq!(mock(&cache).probe_count(), 2);
        assert_eq!(mock(&cache).download_count(), 1);
        assert_eq!(uids(&second), vec!["a"]);
        assert!(second.shares_events_with(&first));

        mock(&cache).set_last_modified(Some(LATER_MODIFIED));
        wait_for_next_refresh(&cache).await;
        let third = cache.get(Berlin).await.unwrap();
        assert_eq!(mock(&cache).download_count(), 2);
        assert_eq!(uids(&third), vec!["b"]);
        assert!(third.last_modified() > first.last_modified());
    }

    #[tokio::test]
    async fn test_same_body_keeps_stamp_without_header() {
        let _ = env_logger::builder().is_test(true).try_init();
        tokio::time::pause();

        let cache = cache_for(MockUpstream::new(feed(&["a"])));
        let first = cache.get(Berlin).await.unwrap();
        assert!(first.last_modified().is_some());

        wait_for_next_refresh(&cache).await;
        let second = cache.get(Berlin).await.unwrap();
        // The feed was downloaded and parsed again, but nothing changed
        assert_eq!(mock(&cache).download_count(), 2);
        assert!(second.shares_events_with(&first) == false);
        assert_eq!(second.events(), first.events());
        assert_eq!(second.last_modified(), first.last_modified());
    }

    #[tokio::test]
    async fn test_malformed_last_modified_means_full_fetch() {
        let _ = env_logger::builder().is_test(true).try_init();
        tokio::time::pause();

        let upstream = MockUpstream::new(feed(&["a"]));
        upstream.set_last_modified(Some("14/05/2023"));
        let cache = cache_for(upstream);

        cache.get(Berlin).await.unwrap();
        wait_for_next_refresh(&cache).await;
        cache.get(Berlin).await.unwrap();
        assert_eq!(mock(&cache).download_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_feed() {
        let _ = env_logger::builder().is_test(true).try_init();
        tokio::time::pause();

        let cache = cache_for(MockUpstream::new(feed(&["a"])));
        assert_eq!(cache.get(Berlin).await.unwrap().events().len(), 1);

        mock(&cache).set_body("");
        wait_for_next_refresh(&cache).await;
        let snapshot = cache.get(Berlin).await.unwrap();
        assert!(snapshot.events().is_empty());
    }

    #[tokio::test]
    async fn test_transport_errors_keep_previous_events() {
        let _ = env_logger::builder().is_test(true).try_init();
        tokio::time::pause();

        let cache = cache_for(MockUpstream::new(feed(&["a"])));
        let first = cache.get(Berlin).await.unwrap();

        // Failed download
        mock(&cache).set_body(feed(&["b"]));
        mock(&cache).set_behaviour(MockBehaviour { download_behaviour: (0, 1), ..MockBehaviour::default() });
        wait_for_next_refresh(&cache).await;
        let err = cache.get(Berlin).await.unwrap_err();
        assert!(matches!(err.source, FeedError::Transport { operation: "downloading feed", .. }));
        assert_eq!(err.cached, first);
        assert!(err.to_string().contains("downloading feed"));

        // A failed attempt also resets the staleness window
        let again = cache.get(Berlin).await.unwrap();
        assert_eq!(again, first);
        assert_eq!(mock(&cache).probe_count(), 2);

        // Failed probe
        mock(&cache).set_behaviour(MockBehaviour { probe_behaviour: (0, 1), ..MockBehaviour::default() });
        wait_for_next_refresh(&cache).await;
        let err = cache.get(Berlin).await.unwrap_err();
        assert!(matches!(err.source, FeedError::Transport { operation: "probing feed", .. }));
        assert_eq!(err.into_cached(), first);

        wait_for_next_refresh(&cache).await;
        assert_eq!(uids(&cache.get(Berlin).await.unwrap()), vec!["b"]);
    }

    #[tokio::test]
    async fn test_failed_download_does_not_hide_next_change() {
        let _ = env_logger::builder().is_test(true).try_init();
        tokio::time::pause();

        let upstream = MockUpstream::new(feed(&["a"]));
        upstream.set_last_modified(Some(LAST_MODIFIED));
        let cache = cache_for(upstream);
        cache.get(Berlin).await.unwrap();

        mock(&cache).set_body(feed(&["b"]));
        mock(&cache).set_last_modified(Some(LATER_MODIFIED));
        mock(&cache).set_behaviour(MockBehaviour { download_behaviour: (0, 1), ..MockBehaviour::default() });
        wait_for_next_refresh(&cache).await;
        let err = cache.get(Berlin).await.unwrap_err();
        assert_eq!(err.cached.last_modified_timestamp(), 1684056600);

        // Same Last-Modified as the failed attempt: it must be downloaded anyway
        wait_for_next_refresh(&cache).await;
        let snapshot = cache.get(Berlin).await.unwrap();
        assert_eq!(uids(&snapshot), vec!["b"]);
        assert_eq!(mock(&cache).download_count(), 3);
    }

    #[tokio::test]
    async fn test_extraction_error_keeps_previous_state() {
        let _ = env_logger::builder().is_test(true).try_init();
        tokio::time::pause();

        let cache = cache_for(MockUpstream::new(feed(&["a", "b"])));
        let first = cache.get(Berlin).await.unwrap();

        let broken = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//x//y//EN\r\n\
            BEGIN:VEVENT\r\nUID:c\r\nSUMMARY:Fine\r\nDTSTART:20230514T093000Z\r\nEND:VEVENT\r\n\
            BEGIN:VEVENT\r\nUID:d\r\nDTSTART:20230514T093000Z\r\nEND:VEVENT\r\n\
            END:VCALENDAR\r\n";
        mock(&cache).set_body(broken);
        wait_for_next_refresh(&cache).await;
        let err = cache.get(Berlin).await.unwrap_err();
        assert!(matches!(err.source, FeedError::Extraction { property: "summary", .. }));
        assert_eq!(err.cached, first);
        assert!(err.cached.shares_events_with(&first));

        // The fingerprint was not updated either: going back to the first content does not bump the stamp
        mock(&cache).set_body(feed(&["a", "b"]));
        wait_for_next_refresh(&cache).await;
        let snapshot = cache.get(Berlin).await.unwrap();
        assert_eq!(snapshot.last_modified(), first.last_modified());
    }

    #[tokio::test]
    async fn test_decode_error_keeps_previous_events() {
        let _ = env_logger::builder().is_test(true).try_init();
        tokio::time::pause();

        let cache = cache_for(MockUpstream::new(feed(&["a"])));
        let first = cache.get(Berlin).await.unwrap();

        mock(&cache).set_body("<html><body>Not Found</body></html>\r\n");
        wait_for_next_refresh(&cache).await;
        let err = cache.get(Berlin).await.unwrap_err();
        assert!(matches!(err.source, FeedError::Decode { .. }));
        assert_eq!(err.cached, first);
    }

    #[tokio::test]
    async fn test_non_utf8_feed_keeps_previous_events() {
        let _ = env_logger::builder().is_test(true).try_init();
        tokio::time::pause();

        let cache = cache_for(MockUpstream::new(feed(&["a"])));
        let first = cache.get(Berlin).await.unwrap();

        // A Latin-1 encoded feed
        let latin1: Vec<u8> = feed(&["b"]).replace("Event b", "Caf\u{e9}").chars().map(|c| c as u8).collect();
        assert!(std::str::from_utf8(&latin1).is_err());
        mock(&cache).set_body(latin1);
        wait_for_next_refresh(&cache).await;
        let err = cache.get(Berlin).await.unwrap_err();
        assert!(matches!(err.source, FeedError::Decode { .. }));
        assert_eq!(err.cached, first);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let _ = env_logger::builder().is_test(true).try_init();
        tokio::time::pause();

        let upstream = MockUpstream::new(feed(&["a", "b", "c"]));
        upstream.set_latency(Duration::from_secs(2));
        let cache = Arc::new(cache_for(upstream));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get(Berlin).await })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(mock(&cache).probe_count(), 1);
        assert_eq!(mock(&cache).download_count(), 1);
        for result in &results {
            assert_eq!(uids(result), vec!["a", "b", "c"]);
            assert!(result.shares_events_with(&results[0]));
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_failure() {
        let _ = env_logger::builder().is_test(true).try_init();
        tokio::time::pause();

        let upstream = MockUpstream::new(feed(&["a"]));
        upstream.set_latency(Duration::from_secs(2));
        upstream.set_behaviour(MockBehaviour { download_behaviour: (0, 1), ..MockBehaviour::default() });
        let cache = Arc::new(cache_for(upstream));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get(Berlin).await })
            })
            .collect();

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err.source, FeedError::Transport { .. }));
            assert!(err.cached.events().is_empty());
        }
        assert_eq!(mock(&cache).probe_count(), 1);
        assert_eq!(mock(&cache).download_count(), 1);

        // Later callers do not see the error anymore
        let snapshot = cache.get(Berlin).await.unwrap();
        assert!(snapshot.events().is_empty());
    }
}
