//! The mutable state of a [`Cache`](super::Cache)

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::{Duration, Instant};

use crate::fingerprint::Fingerprint;
use crate::Event;

/// The events of a feed, as known at some point
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    events: Arc<Vec<Event>>,
    last_modified: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// The events, in the order of the feed
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// The last time the feed is known to have changed.
    ///
    /// This is the `Last-Modified` header sent by the server, or, for servers that do not send it, the time this cache noticed the content changed.
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    /// Same as [`Self::last_modified`], in seconds since the epoch (`0` if unknown)
    pub fn last_modified_timestamp(&self) -> i64 {
        self.last_modified.map(|dt| dt.timestamp()).unwrap_or(0)
    }

    /// Whether both snapshots come from the very same refresh
    pub fn shares_events_with(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.events, &other.events)
    }
}


/// The result of a successful download, ready to replace the current state
#[derive(Debug)]
pub(crate) struct Update {
    pub events: Vec<Event>,
    /// The `Last-Modified` header of the probe, if it was usable
    pub upstream_last_modified: Option<DateTime<Utc>>,
    pub fingerprint: Fingerprint,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub(crate) struct Store {
    /// The last time a refresh was attempted, successful or not
    last_checked: Option<Instant>,
    last_modified: Option<DateTime<Utc>>,
    fingerprint: Option<Fingerprint>,
    events: Arc<Vec<Event>>,
}

impl Store {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            events: Arc::clone(&self.events),
            last_modified: self.last_modified,
        }
    }

    pub fn last_checked(&self) -> Option<Instant> {
        self.last_checked
    }

    pub fn is_fresh(&self, now: Instant, interval: Duration) -> bool {
        self.last_checked
            .map(|checked| now.saturating_duration_since(checked) < interval)
            .unwrap_or(false)
    }

    pub fn mark_checked(&mut self, now: Instant) {
        self.last_checked = Some(now);
    }

    /// Whether a feed advertised as modified at `upstream_last_modified` is already known
    pub fn is_unchanged_since(&self, upstream_last_modified: DateTime<Utc>) -> bool {
        match self.last_modified {
            None => false,
            Some(known) => upstream_last_modified <= known,
        }
    }

    /// Replace the events, the freshness stamp and the fingerprint, all at once
    pub fn commit(&mut self, update: Update) {
        self.last_modified = match update.upstream_last_modified {
            Some(stamp) => Some(stamp),
            // No usable header: only bump the stamp if the content has actually changed
            None if update.fingerprint.differs_from(self.fingerprint.as_ref()) => Some(update.fetched_at),
            None => self.last_modified,
        };
        self.fingerprint = Some(update.fingerprint);
        self.events = Arc::new(update.events);
    }
}
