//! Clock and duration labels for schedule display.

use chrono::NaiveDateTime;

/// The viewer's notion of "now".  Broadcast times are local wall-clock
/// times without an offset, so compare against the local clock.
pub fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// `HH:MM`
pub fn format_time(ts: NaiveDateTime) -> String {
    ts.format("%H:%M").to_string()
}

/// `HH:MM – HH:MM`
pub fn format_time_range(start: NaiveDateTime, end: NaiveDateTime) -> String {
    format!("{} – {}", format_time(start), format_time(end))
}

/// Coarse length label: `"45s"`, `"2m"`, `"3h"`.
///
/// Every bucket rounds up, so 61 seconds reads as `"2m"` and 3601 seconds as
/// `"2h"`.  A window that ends before it starts counts as zero.
pub fn format_duration(start: NaiveDateTime, end: NaiveDateTime) -> String {
    let seconds = (end - start).num_seconds().max(0);
    if seconds < 60 {
        return format!("{}s", seconds);
    }
    let minutes = div_ceil(seconds, 60);
    if minutes < 60 {
        return format!("{}m", minutes);
    }
    format!("{}h", div_ceil(minutes, 60))
}

fn div_ceil(n: i64, d: i64) -> i64 {
    (n + d - 1) / d
}
