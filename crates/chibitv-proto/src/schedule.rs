//! Schedule projection: raw server records → sorted, future-relevant events.

use chrono::NaiveDateTime;

use crate::model::{Event, RawEvent};

/// Project a service's raw event records into the list shown to the viewer.
///
/// Invalid records are dropped, events that already ended before `now` are
/// discarded and the rest is sorted by start time.  The sort is stable, so
/// events starting at the same instant keep their server order.
pub fn project(raw_events: &[RawEvent], now: NaiveDateTime) -> Vec<Event> {
    let mut events: Vec<Event> = raw_events
        .iter()
        .filter_map(RawEvent::normalize)
        .filter(|event| event.is_relevant(now))
        .collect();
    events.sort_by_key(|event| event.start_at);
    events
}

/// The event on air at `now`, if any, from an already projected list.
pub fn current(events: &[Event], now: NaiveDateTime) -> Option<&Event> {
    events.iter().find(|event| event.is_current(now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2024-04-01T12:00:00", "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    fn raw(id: u16, title: Option<&str>, start_min: Option<i64>, end_min: Option<i64>) -> RawEvent {
        RawEvent {
            id,
            title: title.map(str::to_string),
            description: vec![],
            start_time: start_min.map(|m| now() + TimeDelta::minutes(m)),
            end_time: end_min.map(|m| now() + TimeDelta::minutes(m)),
        }
    }

    fn ids(events: &[Event]) -> Vec<u16> {
        events.iter().map(|e| e.id).collect()
    }

    #[test]
    fn test_project_sorts_by_start() {
        let events = project(
            &[
                raw(3, Some("Late"), Some(120), Some(180)),
                raw(1, Some("Now"), Some(-10), Some(20)),
                raw(2, Some("Next"), Some(20), Some(120)),
            ],
            now(),
        );
        assert_eq!(ids(&events), vec![1, 2, 3]);
    }

    #[test]
    fn test_project_drops_finished_events() {
        let events = project(
            &[
                raw(1, Some("Gone"), Some(-90), Some(-30)),
                raw(2, Some("Ends now"), Some(-30), Some(0)),
                raw(3, Some("Upcoming"), Some(30), Some(60)),
            ],
            now(),
        );
        assert_eq!(ids(&events), vec![2, 3]);
        assert!(events.iter().all(|e| e.end_at >= now()));
    }

    #[test]
    fn test_project_drops_invalid_records() {
        let events = project(
            &[
                raw(1, Some("News"), Some(0), None),
                raw(2, None, Some(0), Some(30)),
                raw(3, Some("Weather"), None, Some(30)),
                raw(4, Some(""), Some(0), Some(30)),
                raw(5, Some("Drama"), Some(30), Some(90)),
            ],
            now(),
        );
        assert_eq!(ids(&events), vec![5]);
    }

    #[test]
    fn test_project_keeps_insertion_order_on_equal_start() {
        let events = project(
            &[
                raw(9, Some("B"), Some(10), Some(20)),
                raw(4, Some("A"), Some(10), Some(40)),
                raw(6, Some("C"), Some(5), Some(40)),
            ],
            now(),
        );
        assert_eq!(ids(&events), vec![6, 9, 4]);
    }

    #[test]
    fn test_project_output_is_always_sorted_and_relevant() {
        // Deterministic pseudo-random windows around `now`.
        let mut seed: i64 = 17;
        let mut records = Vec::new();
        for id in 0..200u16 {
            seed = (seed * 1103515245 + 12345) % 2147483648;
            let start = seed % 600 - 300;
            let len = (seed / 600) % 120;
            let title = if seed % 11 == 0 { None } else { Some("x") };
            records.push(raw(id, title, Some(start), Some(start + len)));
        }
        let events = project(&records, now());
        assert!(events.windows(2).all(|w| w[0].start_at <= w[1].start_at));
        assert!(events.iter().all(|e| e.end_at >= now()));
    }

    #[test]
    fn test_current_event() {
        let events = project(
            &[
                raw(1, Some("Now"), Some(-10), Some(20)),
                raw(2, Some("Next"), Some(20), Some(120)),
            ],
            now(),
        );
        assert_eq!(current(&events, now()).map(|e| e.id), Some(1));
        assert_eq!(
            current(&events, now() + TimeDelta::minutes(20)).map(|e| e.id),
            Some(2)
        );
    }
}
