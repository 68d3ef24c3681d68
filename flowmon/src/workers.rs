/// Worker-level metrics from tracking time series.
///
/// Everything here is None when tracking was disabled or produced no samples; a missing
/// telemetry source must stay distinguishable from an idle cluster.
///
/// Averages over time series are time-weighted (see flowlog::stream).  Cluster-wide active-task
/// figures are built by summing the per-worker series at each sampling instant first; all
/// per-worker series share the snapshot timestamps, so the sum at each instant is well defined.
use crate::metrics::ResourceSummary;

use flowlog::{peak, time_weighted_avg, Timestamp, TrackingData};
use std::collections::HashMap;

pub fn parse_tracking_data(tracking: Option<&TrackingData>) -> ResourceSummary {
    let data = match tracking {
        Some(d) if !d.is_empty() => d,
        _ => return ResourceSummary::default(),
    };

    let counts = data
        .worker_counts
        .iter()
        .map(|&(t, n)| (t, n as f64))
        .collect::<Vec<(Timestamp, f64)>>();
    let workers_avg = time_weighted_avg(&counts);
    let workers_peak = data.worker_counts.iter().map(|&(_, n)| n).max();

    // Total core capacity: each worker contributes its time-averaged core count.  Workers can
    // be resized mid-run, hence the average rather than the first sample.
    let mut cores_total = 0.0;
    let mut cores_known = false;
    for series in data.worker_cores.values() {
        let series = series
            .iter()
            .map(|&(t, c)| (t, f64::from(c)))
            .collect::<Vec<(Timestamp, f64)>>();
        if let Some(avg) = time_weighted_avg(&series) {
            cores_total += avg;
            cores_known = true;
        }
    }
    let cores_total = if cores_known { Some(cores_total) } else { None };
    let cores_per_worker = match cores_total {
        Some(total) if !data.worker_cores.is_empty() => {
            Some(total / data.worker_cores.len() as f64)
        }
        _ => None,
    };

    let memory_peak_bytes = data
        .worker_memory
        .values()
        .filter_map(|series| peak(series))
        .fold(None, |acc: Option<f64>, v| match acc {
            None => Some(v),
            Some(a) => Some(f64::max(a, v)),
        });

    let per_worker_avgs = data
        .worker_memory
        .values()
        .filter_map(|series| time_weighted_avg(series))
        .collect::<Vec<f64>>();
    let memory_avg_per_worker_bytes = if per_worker_avgs.is_empty() {
        None
    } else {
        Some(per_worker_avgs.iter().sum::<f64>() / per_worker_avgs.len() as f64)
    };

    let active_series = cluster_active_tasks(data);
    let active_tasks_avg = time_weighted_avg(&active_series);
    let active_tasks_peak = active_series
        .iter()
        .map(|&(_, v)| v.round() as u32)
        .max();

    let occupancy_avg = match (active_tasks_avg, cores_total) {
        (Some(active), Some(cores)) if cores > 0.0 => Some(active / cores),
        _ => None,
    };

    ResourceSummary {
        workers_avg,
        workers_peak,
        cores_per_worker,
        cores_total,
        memory_peak_bytes,
        memory_avg_per_worker_bytes,
        active_tasks_avg,
        active_tasks_peak,
        occupancy_avg,
    }
}

// Sum active tasks across workers at each sampling instant.

fn cluster_active_tasks(data: &TrackingData) -> Vec<(Timestamp, f64)> {
    let mut sums: HashMap<Timestamp, f64> = HashMap::new();
    for series in data.worker_active_tasks.values() {
        for &(t, n) in series {
            *sums.entry(t).or_insert(0.0) += f64::from(n);
        }
    }
    let mut series = sums.into_iter().collect::<Vec<(Timestamp, f64)>>();
    series.sort_by_key(|&(t, _)| t);
    series
}

#[cfg(test)]
use flowlog::{ClusterSnapshot, WorkerState};
#[cfg(test)]
use ustr::Ustr;

#[cfg(test)]
fn sample_tracking() -> TrackingData {
    use chrono::{TimeZone, Utc};

    // Two workers, two samples 10 s apart, 4 cores each.
    let mk = |secs: i64, w1: (f64, u32), w2: (f64, u32)| ClusterSnapshot {
        timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, secs as u32).unwrap(),
        workers: vec![
            WorkerState {
                id: Ustr::from("worker1"),
                memory_bytes: w1.0,
                memory_limit_bytes: 4e9,
                active_tasks: w1.1,
                cores: 4,
            },
            WorkerState {
                id: Ustr::from("worker2"),
                memory_bytes: w2.0,
                memory_limit_bytes: 4e9,
                active_tasks: w2.1,
                cores: 4,
            },
        ],
    };
    let mut data = TrackingData::new();
    data.ingest(&mk(0, (1.0e9, 2), (0.8e9, 1)));
    data.ingest(&mk(10, (1.5e9, 1), (1.2e9, 2)));
    data
}

#[cfg(test)]
fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_no_tracking_is_all_none() {
    let r = parse_tracking_data(None);
    assert!(r.workers_avg.is_none());
    assert!(r.workers_peak.is_none());
    assert!(r.cores_total.is_none());
    assert!(r.memory_peak_bytes.is_none());
    assert!(r.occupancy_avg.is_none());

    let empty = TrackingData::new();
    assert!(parse_tracking_data(Some(&empty)).workers_avg.is_none());
}

#[test]
fn test_worker_counts_and_cores() {
    let r = parse_tracking_data(Some(&sample_tracking()));
    assert!(r.workers_avg == Some(2.0));
    assert!(r.workers_peak == Some(2));
    assert!(r.cores_total == Some(8.0));
    assert!(r.cores_per_worker == Some(4.0));
}

#[test]
fn test_memory_statistics() {
    let r = parse_tracking_data(Some(&sample_tracking()));
    assert!(r.memory_peak_bytes == Some(1.5e9));
    // Per-worker time averages: 1.25e9 and 1.0e9; mean 1.125e9.
    assert!(approx(r.memory_avg_per_worker_bytes.unwrap(), 1.125e9));
}

#[test]
fn test_active_tasks_and_occupancy() {
    let r = parse_tracking_data(Some(&sample_tracking()));
    // Cluster-wide active tasks are 3 at both instants.
    assert!(approx(r.active_tasks_avg.unwrap(), 3.0));
    assert!(r.active_tasks_peak == Some(3));
    assert!(approx(r.occupancy_avg.unwrap(), 3.0 / 8.0));
}
