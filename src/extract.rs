//! Turns decoded calendar entries into [`Event`]s

use chrono::{DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use url::Url;

use crate::error::FeedError;
use crate::ical::{DateTimeValue, Entry, ValueType};
use crate::Event;

const DATE_FORMAT: &str = "%Y%m%d";
const DATE_TIME_FORMAT: &str = "%Y%m%dT%H%M%S";


/// Extract every entry, in order.
///
/// This fails as soon as a single entry cannot be extracted, so that callers never get a partial list.
pub fn extract_events<E: Entry>(entries: &[E], default_tz: Tz) -> Result<Vec<Event>, FeedError> {
    let mut events = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let event = extract_event(entry, default_tz).map_err(|err| match err {
            FeedError::Extraction { property, reason } => FeedError::Extraction {
                property,
                reason: format!("entry #{}: {}", index, reason),
            },
            other => other,
        })?;
        events.push(event);
    }
    Ok(events)
}

/// Build an [`Event`] from a single entry.
///
/// `default_tz` is used for floating times, and as a replacement for `TZID`s that are not in the timezone database.
pub fn extract_event<E: Entry>(entry: &E, default_tz: Tz) -> Result<Event, FeedError> {
    let uid = entry.uid()
        .ok_or_else(|| FeedError::extraction("uid", "missing UID"))?;
    let summary = entry.summary()
        .ok_or_else(|| FeedError::extraction("summary", format!("{} has no SUMMARY", uid)))?;
    let description = entry.description().filter(|d| d.is_empty() == false);
    let url = match entry.url().filter(|u| u.is_empty() == false) {
        None => None,
        Some(raw) => Some(Url::parse(&raw).map_err(|err|
            FeedError::extraction("url", format!("{} has an invalid URL {:?} ({})", uid, raw, err)))?),
    };

    let start_value = entry.start()
        .ok_or_else(|| FeedError::extraction("start time", format!("{} has no DTSTART", uid)))?;
    let all_day = start_value.value_type == ValueType::Date;
    let start = to_instant(&start_value, default_tz)
        .map_err(|reason| FeedError::extraction("start time", format!("{}: {}", uid, reason)))?;

    let end = match entry.end() {
        Some(end_value) => to_instant(&end_value, default_tz)
            .map_err(|reason| FeedError::extraction("end time", format!("{}: {}", uid, reason)))?,
        None => match entry.duration() {
            Some(raw) => {
                let duration = parse_duration(&raw)
                    .ok_or_else(|| FeedError::extraction("end time", format!("{} has an invalid DURATION {:?}", uid, raw)))?;
                start.checked_add_signed(duration)
                    .ok_or_else(|| FeedError::extraction("end time", format!("{} has an out of range DURATION {:?}", uid, raw)))?
            },
            None if all_day => start.checked_add_signed(Duration::days(1))
                .ok_or_else(|| FeedError::extraction("end time", format!("{} starts too late", uid)))?,
            None => start,
        },
    };

    let recurrence_rule = entry.recurrence_rule().filter(|r| r.is_empty() == false);

    Ok(Event::new(uid, summary, all_day, start, end, recurrence_rule, url, description))
}

/// Resolve a `TZID`, falling back to `default_tz` for unknown identifiers
fn resolve_zone(tzid: Option<&str>, default_tz: Tz) -> Tz {
    match tzid {
        None => default_tz,
        Some(name) => match name.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                log::debug!("Unknown TZID {:?}, using {} instead", name, default_tz.name());
                default_tz
            },
        },
    }
}

fn to_instant(dt: &DateTimeValue, default_tz: Tz) -> Result<DateTime<FixedOffset>, String> {
    let zone = resolve_zone(dt.tzid.as_deref(), default_tz);
    let value = dt.value.as_str();

    match dt.value_type {
        ValueType::Date => {
            let date = NaiveDate::parse_from_str(value, DATE_FORMAT)
                .map_err(|err| format!("invalid date {:?} ({})", value, err))?;
            let midnight = date.and_hms_opt(0, 0, 0)
                .ok_or_else(|| format!("invalid date {:?}", value))?;
            Ok(local_instant(zone, midnight))
        },
        ValueType::DateTime => {
            match value.strip_suffix('Z').or_else(|| value.strip_suffix('z')) {
                Some(utc_value) => {
                    let naive = NaiveDateTime::parse_from_str(utc_value, DATE_TIME_FORMAT)
                        .map_err(|err| format!("invalid date-time {:?} ({})", value, err))?;
                    Ok(Utc.from_utc_datetime(&naive).into())
                },
                None => {
                    let naive = NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT)
                        .map_err(|err| format!("invalid date-time {:?} ({})", value, err))?;
                    Ok(local_instant(zone, naive))
                },
            }
        },
    }
}

fn local_instant(zone: Tz, naive: NaiveDateTime) -> DateTime<FixedOffset> {
    let dt = match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        // This local time was skipped by a DST transition
        LocalResult::None => naive.checked_add_signed(Duration::hours(1))
            .and_then(|shifted| zone.from_local_datetime(&shifted).earliest())
            .unwrap_or_else(|| zone.from_utc_datetime(&naive)),
    };
    dt.with_timezone(&dt.offset().fix())
}

/// Parse an RFC5545 `DURATION` (e.g. `P1W`, `P1DT2H30M`, `-PT15M`)
fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (negative, rest) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let rest = rest.strip_prefix('P')?;

    let mut total = Duration::zero();
    let mut number = String::new();
    let mut in_time = false;
    let mut has_component = false;
    for c in rest.chars() {
        match c {
            '0'..='9' => number.push(c),
            'T' if in_time == false && number.is_empty() => in_time = true,
            unit => {
                let n: i64 = number.parse().ok()?;
                number.clear();
                let component = match (unit, in_time) {
                    ('W', false) => Duration::try_weeks(n),
                    ('D', false) => Duration::try_days(n),
                    ('H', true) => Duration::try_hours(n),
                    ('M', true) => Duration::try_minutes(n),
                    ('S', true) => Duration::try_seconds(n),
                    _ => return None,
                };
                total = total.checked_add(&component?)?;
                has_component = true;
            },
        }
    }

    if number.is_empty() == false || has_component == false {
        return None;
    }
    Some(if negative { -total } else { total })
}
