//! This module handles the decoding of iCal feeds into entries
//!
//! The cache does not care how the wire format is parsed: it only needs a [`Decoder`] that turns bytes into [`Entry`]s.
//! [`IcalDecoder`] is the default implementation, a wrapper around the `ical` crate.

use std::error::Error;
use std::io::BufRead;

mod parser;
pub use parser::{IcalDecoder, IcalEntry};

/// Turns a byte stream into calendar entries
pub trait Decoder: Send + Sync {
    type Entry: Entry + Send;

    /// Decode the whole content of `reader`.
    ///
    /// Returns `Ok(None)` when the stream contains no calendar at all, which is not an error.
    fn decode(&self, reader: &mut dyn BufRead) -> Result<Option<Vec<Self::Entry>>, Box<dyn Error + Send + Sync>>;
}

/// A single decoded calendar entry (usually a `VEVENT`), before it is turned into an [`Event`](crate::Event).
///
/// Text accessors return unescaped values, and `None` in case the property is absent.
pub trait Entry {
    fn uid(&self) -> Option<String>;
    fn summary(&self) -> Option<String>;
    fn description(&self) -> Option<String>;
    fn url(&self) -> Option<String>;
    fn start(&self) -> Option<DateTimeValue>;
    fn end(&self) -> Option<DateTimeValue>;
    /// The raw `DURATION` value
    fn duration(&self) -> Option<String>;
    /// The raw `RRULE` value
    fn recurrence_rule(&self) -> Option<String>;
}

/// The raw value of a `DTSTART` or `DTEND` property
#[derive(Clone, Debug, PartialEq)]
pub struct DateTimeValue {
    pub value: String,
    /// The `TZID` parameter, if any. It may name a zone that does not exist.
    pub tzid: Option<String>,
    pub value_type: ValueType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    /// A pure date, without time of day (e.g. `20230514`)
    Date,
    /// A date with a time of day (e.g. `20230514T093000` or `20230514T073000Z`)
    DateTime,
}
