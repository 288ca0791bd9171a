//! A module to parse iCal feeds

use std::error::Error;
use std::io::{BufRead, Read};

use ical::parser::ical::component::IcalEvent;
use ical::property::Property;

use super::{DateTimeValue, Decoder, Entry, ValueType};


/// A [`Decoder`] that uses the `ical` crate.
///
/// Only the first `VCALENDAR` of a feed is considered. The feed must be UTF-8.
#[derive(Clone, Copy, Debug, Default)]
pub struct IcalDecoder;

impl Decoder for IcalDecoder {
    type Entry = IcalEntry;

    fn decode(&self, reader: &mut dyn BufRead) -> Result<Option<Vec<IcalEntry>>, Box<dyn Error + Send + Sync>> {
        // The ical crate panics on invalid UTF-8, so the body is checked first
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        let text = std::str::from_utf8(&content)
            .map_err(|err| format!("Feed is not valid UTF-8: {}", err))?;

        let mut parser = ical::IcalParser::new(text.as_bytes());
        let calendar = match parser.next() {
            None => return Ok(None),
            Some(Err(err)) => return Err(format!("Unable to parse iCal data: {}", err).into()),
            Some(Ok(calendar)) => calendar,
        };

        Ok(Some(calendar.events.into_iter().map(IcalEntry::from).collect()))
    }
}


/// A `VEVENT` decoded by the `ical` crate
#[derive(Clone, Debug)]
pub struct IcalEntry {
    event: IcalEvent,
}

impl From<IcalEvent> for IcalEntry {
    fn from(event: IcalEvent) -> Self {
        Self { event }
    }
}

impl IcalEntry {
    fn property(&self, name: &str) -> Option<&Property> {
        self.event.properties.iter()
            .find(|prop| prop.name.eq_ignore_ascii_case(name))
    }

    fn raw_value(&self, name: &str) -> Option<&str> {
        self.property(name)
            .map(|prop| prop.value.as_deref().unwrap_or(""))
    }

    fn text(&self, name: &str) -> Option<String> {
        self.raw_value(name).map(unescape_text)
    }

    fn date_time(&self, name: &str) -> Option<DateTimeValue> {
        let prop = self.property(name)?;
        let value = prop.value.as_deref().unwrap_or("").trim().to_string();
        let tzid = param(prop, "TZID").map(String::from);
        let value_type = match param(prop, "VALUE") {
            Some(v) if v.eq_ignore_ascii_case("DATE") => ValueType::Date,
            Some(_) => ValueType::DateTime,
            None if value.len() == 8 && value.chars().all(|c| c.is_ascii_digit()) => ValueType::Date,
            None => ValueType::DateTime,
        };
        Some(DateTimeValue { value, tzid, value_type })
    }
}

impl Entry for IcalEntry {
    fn uid(&self) -> Option<String> { self.text("UID") }
    fn summary(&self) -> Option<String> { self.text("SUMMARY") }
    fn description(&self) -> Option<String> { self.text("DESCRIPTION") }
    fn url(&self) -> Option<String> { self.raw_value("URL").map(|url| url.trim().to_string()) }
    fn start(&self) -> Option<DateTimeValue> { self.date_time("DTSTART") }
    fn end(&self) -> Option<DateTimeValue> { self.date_time("DTEND") }
    fn duration(&self) -> Option<String> { self.raw_value("DURATION").map(String::from) }
    fn recurrence_rule(&self) -> Option<String> { self.raw_value("RRULE").map(String::from) }
}

/// Returns the first value of a property parameter
fn param<'a>(prop: &'a Property, name: &str) -> Option<&'a str> {
    prop.params.as_ref()?
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first())
        .map(|value| value.trim_matches('"'))
}

/// Reverts the escaping of RFC5545 TEXT values
fn unescape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
