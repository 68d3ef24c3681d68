/// Types and utilities for manipulating timestamps.
use chrono::{DateTime, Duration, TimeZone, Utc};

/// All timestamps are UTC.  Telemetry sources report in whatever zone they like; conversion
/// happens at the edge, not here.
pub type Timestamp = DateTime<Utc>;

// The time right now.

pub fn now() -> Timestamp {
    Utc::now()
}

// "A long long time ago".

pub fn epoch() -> Timestamp {
    Utc.timestamp_opt(0, 0).unwrap()
}

// Seconds since the Unix epoch, with subsecond precision.

pub fn unix_seconds(t: Timestamp) -> f64 {
    t.timestamp() as f64 + f64::from(t.timestamp_subsec_nanos()) / 1e9
}

// File-system-safe stamp used for auto-named measurement directories.

pub fn measurement_stamp(t: Timestamp) -> String {
    t.format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Truncate `t` down to the start of the fixed-width interval containing it.  Intervals are
/// anchored at the epoch, so all callers agree on bucket boundaries.  An interval shorter than
/// one second is treated as one second.

pub fn truncate_to_interval(t: Timestamp, interval: Duration) -> Timestamp {
    let width = i64::max(interval.num_seconds(), 1);
    let secs = t.timestamp();
    Utc.timestamp_opt(secs - secs.rem_euclid(width), 0).unwrap()
}

#[test]
fn test_unix_seconds() {
    assert!(unix_seconds(epoch()) == 0.0);
    let t = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 10).unwrap();
    assert!(unix_seconds(t) == 1735732810.0);
}

#[test]
fn test_measurement_stamp() {
    let t = Utc.with_ymd_and_hms(2025, 3, 7, 9, 30, 5).unwrap();
    assert!(measurement_stamp(t) == "2025-03-07_09-30-05");
}

#[test]
fn test_truncate_to_interval() {
    let t = Utc.with_ymd_and_hms(2025, 1, 1, 12, 34, 56).unwrap();
    let h = truncate_to_interval(t, Duration::hours(1));
    assert!(h == Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap());
    let m = truncate_to_interval(t, Duration::seconds(30));
    assert!(m == Utc.with_ymd_and_hms(2025, 1, 1, 12, 34, 30).unwrap());
    // Degenerate interval clamps to one second.
    let s = truncate_to_interval(t, Duration::seconds(0));
    assert!(s == t);
}
