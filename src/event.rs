//! Calendar events, as extracted from a feed

use serde::{Deserialize, Serialize};
use chrono::{DateTime, FixedOffset};
use url::Url;

/// A display-ready calendar event (iCal `VEVENT`)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Whether this event spans whole days (its `DTSTART` is a `DATE`, not a `DATE-TIME`)
    all_day: bool,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    /// The raw `RRULE` value. It is not interpreted by this crate.
    recurrence_rule: Option<String>,

    /// The UID, as given by the server. It is only expected to be unique within its feed.
    uid: String,
    url: Option<Url>,
    summary: String,
    description: Option<String>,
}

impl Event {
    #[allow(clippy::too_many_arguments)]
    pub fn new(uid: String, summary: String, all_day: bool,
               start: DateTime<FixedOffset>, end: DateTime<FixedOffset>,
               recurrence_rule: Option<String>, url: Option<Url>, description: Option<String>) -> Self
    {
        Self { all_day, start, end, recurrence_rule, uid, url, summary, description }
    }

    pub fn all_day(&self) -> bool { self.all_day }
    pub fn start(&self) -> &DateTime<FixedOffset> { &self.start }
    pub fn end(&self) -> &DateTime<FixedOffset> { &self.end }
    pub fn recurrence_rule(&self) -> Option<&str> { self.recurrence_rule.as_deref() }
    pub fn uid(&self) -> &str { &self.uid }
    pub fn url(&self) -> Option<&Url> { self.url.as_ref() }
    pub fn summary(&self) -> &str { &self.summary }
    pub fn description(&self) -> Option<&str> { self.description.as_deref() }
}
