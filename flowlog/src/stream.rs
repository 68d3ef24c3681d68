/// Statistics and folding over telemetry sample series.
///
/// A series is a vector of (timestamp, value) pairs sorted ascending by timestamp (the
/// TrackingData invariant).  Averages are time-weighted: a sample's value is in effect until the
/// next sample, and the average integrates the trapezoid between consecutive samples.  A series
/// with a single sample has no extent, so its average is the sample itself.
use crate::dates::{truncate_to_interval, Timestamp};

use chrono::Duration;
use itertools::Itertools;

/// Time-weighted average of the series, None for an empty series.

pub fn time_weighted_avg(series: &[(Timestamp, f64)]) -> Option<f64> {
    match series {
        [] => None,
        [(_, v)] => Some(*v),
        _ => {
            let mut weighted = 0.0;
            let mut elapsed = 0.0;
            for w in series.windows(2) {
                let (t0, v0) = w[0];
                let (t1, v1) = w[1];
                let dt = (t1 - t0).num_milliseconds() as f64 / 1000.0;
                weighted += (v0 + v1) / 2.0 * dt;
                elapsed += dt;
            }
            if elapsed > 0.0 {
                Some(weighted / elapsed)
            } else {
                // All samples at the same instant; degenerate but must not divide.
                Some(series[0].1)
            }
        }
    }
}

/// Largest value in the series, None for an empty series.

pub fn peak(series: &[(Timestamp, f64)]) -> Option<f64> {
    series
        .iter()
        .map(|&(_, v)| v)
        .fold(None, |acc, v| match acc {
            None => Some(v),
            Some(a) => Some(f64::max(a, v)),
        })
}

/// Bucket the series by a fixed interval and average each bucket.
///
/// Bucket timestamps are truncated to the bucket start.  Because the input is ascending, each
/// bucket is a contiguous run, and the output is ascending as well.  Used to bound the size of
/// tracking series from long runs before they are persisted.

pub fn fold_series(series: &[(Timestamp, f64)], interval: Duration) -> Vec<(Timestamp, f64)> {
    let groups = series
        .iter()
        .group_by(|&&(t, _)| truncate_to_interval(t, interval));
    let mut folded = vec![];
    for (bucket, samples) in &groups {
        let mut sum = 0.0;
        let mut n = 0usize;
        for &(_, v) in samples {
            sum += v;
            n += 1;
        }
        folded.push((bucket, sum / n as f64));
    }
    folded
}

#[cfg(test)]
fn ts(secs: i64) -> Timestamp {
    use chrono::{TimeZone, Utc};
    Utc.timestamp_opt(secs, 0).unwrap()
}

#[test]
fn test_time_weighted_avg_empty_and_single() {
    assert!(time_weighted_avg(&[]).is_none());
    assert!(time_weighted_avg(&[(ts(10), 7.5)]) == Some(7.5));
}

#[test]
fn test_time_weighted_avg_uniform_spacing() {
    // Linear ramp at uniform spacing averages to the midpoint.
    let series = vec![(ts(0), 0.0), (ts(10), 10.0), (ts(20), 20.0)];
    assert!(time_weighted_avg(&series) == Some(10.0));
}

#[test]
fn test_time_weighted_avg_weights_by_duration() {
    // The 2.0 plateau lasts 9x as long as the ramp from 0, so it dominates.
    let series = vec![(ts(0), 0.0), (ts(1), 2.0), (ts(10), 2.0)];
    let avg = time_weighted_avg(&series).unwrap();
    // (1*1 + 9*2) / 10
    assert!((avg - 1.9).abs() < 1e-9);
}

#[test]
fn test_peak() {
    assert!(peak(&[]).is_none());
    let series = vec![(ts(0), 1.0), (ts(1), 5.0), (ts(2), 3.0)];
    assert!(peak(&series) == Some(5.0));
}

#[test]
fn test_fold_series_buckets_and_averages() {
    let series = vec![
        (ts(0), 1.0),
        (ts(5), 3.0),
        (ts(10), 10.0),
        (ts(14), 20.0),
        (ts(21), 7.0),
    ];
    let folded = fold_series(&series, Duration::seconds(10));
    assert!(folded.len() == 3);
    assert!(folded[0] == (ts(0), 2.0));
    assert!(folded[1] == (ts(10), 15.0));
    assert!(folded[2] == (ts(20), 7.0));
}

#[test]
fn test_fold_series_empty() {
    assert!(fold_series(&[], Duration::seconds(60)).is_empty());
}
