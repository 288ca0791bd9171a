//! Some utility functions

use crate::cache::Snapshot;
use crate::Event;

/// A debug utility that pretty-prints the events of a snapshot
pub fn print_event_list(snapshot: &Snapshot) {
    match snapshot.last_modified() {
        None => println!("{} events (never modified)", snapshot.events().len()),
        Some(dt) => println!("{} events (last modified {})", snapshot.events().len(), dt),
    }
    for event in snapshot.events() {
        println!("    {}", format_event(event));
    }
}

/// A one-line description of an event
pub fn format_event(event: &Event) -> String {
    let when = if event.all_day() {
        event.start().format("%Y-%m-%d").to_string()
    } else {
        format!("{} → {}", event.start().format("%Y-%m-%d %H:%M %:z"), event.end().format("%H:%M"))
    };
    let recurrence = if event.recurrence_rule().is_some() { " ↻" } else { "" };
    format!("{}{}\t{}\t{}", when, recurrence, event.summary(), event.uid())
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn test_format_event() {
        let start = DateTime::parse_from_rfc3339("2023-05-14T09:30:00+02:00").unwrap();
        let end = DateTime::parse_from_rfc3339("2023-05-14T10:30:00+02:00").unwrap();
        let event = Event::new("uid-1".to_string(), "Meeting".to_string(), false, start, end,
                               Some("FREQ=WEEKLY".to_string()), None, None);
        assert_eq!(format_event(&event), "2023-05-14 09:30 +02:00 → 10:30 ↻\tMeeting\tuid-1");

        let all_day = Event::new("uid-2".to_string(), "Holiday".to_string(), true, start, end, None, None, None);
        assert_eq!(format_event(&all_day), "2023-05-14\tHoliday\tuid-2");
    }
}
