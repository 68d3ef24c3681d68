/// Worker resource samples and the time series accumulated from them.
///
/// A scheduler-side sampling hook delivers one `ClusterSnapshot` per sampling interval; the
/// snapshot carries the instantaneous state of every worker the scheduler knows about.
/// `TrackingData` is the columnar accumulation of those snapshots: one cluster-wide worker-count
/// series plus per-worker series for memory, memory limit, active task count and core count.
///
/// There is an important invariant on the series:
///
/// - within one series, timestamps are strictly ascending (and hence unique)
///
/// The invariant holds by construction because snapshots are delivered in time order by a single
/// sampling loop; a snapshot that does not advance the clock is dropped on ingestion.
use crate::dates::Timestamp;

use std::collections::HashMap;
use ustr::Ustr;

/// One worker's state at one sampling instant.
///
/// Memory quantities are bytes.  `active_tasks` is the number of tasks executing on the worker
/// at the instant of sampling, not a rate.  `cores` is the worker's thread-pool size; it is
/// sampled rather than configured because clusters scale workers adaptively.
#[derive(Debug, Clone)]
pub struct WorkerState {
    pub id: Ustr,
    pub memory_bytes: f64,
    pub memory_limit_bytes: f64,
    pub active_tasks: u32,
    pub cores: u32,
}

/// The payload of one sampling callback: everything the scheduler reported at `timestamp`.
#[derive(Debug, Clone)]
pub struct ClusterSnapshot {
    pub timestamp: Timestamp,
    pub workers: Vec<WorkerState>,
}

/// Accumulated tracking time series for one collection run.
///
/// Workers may come and go during the run; a worker's series covers only the snapshots it
/// appeared in.  The worker-count series has exactly one point per ingested snapshot.
#[derive(Debug, Clone, Default)]
pub struct TrackingData {
    pub worker_counts: Vec<(Timestamp, usize)>,
    pub worker_memory: HashMap<Ustr, Vec<(Timestamp, f64)>>,
    pub worker_memory_limit: HashMap<Ustr, Vec<(Timestamp, f64)>>,
    pub worker_active_tasks: HashMap<Ustr, Vec<(Timestamp, u32)>>,
    pub worker_cores: HashMap<Ustr, Vec<(Timestamp, u32)>>,
}

impl TrackingData {
    pub fn new() -> TrackingData {
        TrackingData::default()
    }

    pub fn is_empty(&self) -> bool {
        self.worker_counts.is_empty()
    }

    pub fn num_samples(&self) -> usize {
        self.worker_counts.len()
    }

    pub fn num_workers(&self) -> usize {
        self.worker_memory.len()
    }

    /// Fold one snapshot into the series.  Returns false if the snapshot was dropped for not
    /// advancing the clock.
    pub fn ingest(&mut self, snap: &ClusterSnapshot) -> bool {
        if let Some(&(last, _)) = self.worker_counts.last() {
            if snap.timestamp <= last {
                return false;
            }
        }
        self.worker_counts.push((snap.timestamp, snap.workers.len()));
        for w in &snap.workers {
            self.worker_memory
                .entry(w.id)
                .or_default()
                .push((snap.timestamp, w.memory_bytes));
            self.worker_memory_limit
                .entry(w.id)
                .or_default()
                .push((snap.timestamp, w.memory_limit_bytes));
            self.worker_active_tasks
                .entry(w.id)
                .or_default()
                .push((snap.timestamp, w.active_tasks));
            self.worker_cores
                .entry(w.id)
                .or_default()
                .push((snap.timestamp, w.cores));
        }
        true
    }
}

#[cfg(test)]
fn snapshot_at(secs: i64, workers: &[(&str, f64, u32)]) -> ClusterSnapshot {
    use chrono::{TimeZone, Utc};
    ClusterSnapshot {
        timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        workers: workers
            .iter()
            .map(|&(id, mem, tasks)| WorkerState {
                id: Ustr::from(id),
                memory_bytes: mem,
                memory_limit_bytes: 4e9,
                active_tasks: tasks,
                cores: 4,
            })
            .collect(),
    }
}

#[test]
fn test_ingest_accumulates_series() {
    let mut data = TrackingData::new();
    assert!(data.is_empty());
    assert!(data.ingest(&snapshot_at(100, &[("w1", 1e9, 2), ("w2", 8e8, 1)])));
    assert!(data.ingest(&snapshot_at(101, &[("w1", 1.5e9, 1), ("w2", 1.2e9, 2)])));
    assert!(!data.is_empty());
    assert!(data.num_samples() == 2);
    assert!(data.num_workers() == 2);
    let w1 = &data.worker_memory[&Ustr::from("w1")];
    assert!(w1.len() == 2);
    assert!(w1[0].1 == 1e9 && w1[1].1 == 1.5e9);
    assert!(data.worker_counts[0].1 == 2);
    assert!(data.worker_cores[&Ustr::from("w2")][1].1 == 4);
}

#[test]
fn test_ingest_drops_stale_snapshot() {
    let mut data = TrackingData::new();
    assert!(data.ingest(&snapshot_at(100, &[("w1", 1e9, 0)])));
    // Same timestamp and earlier timestamp both violate the ascending invariant.
    assert!(!data.ingest(&snapshot_at(100, &[("w1", 2e9, 0)])));
    assert!(!data.ingest(&snapshot_at(99, &[("w1", 3e9, 0)])));
    assert!(data.num_samples() == 1);
    assert!(data.worker_memory[&Ustr::from("w1")].len() == 1);
}

#[test]
fn test_ingest_tracks_worker_churn() {
    let mut data = TrackingData::new();
    data.ingest(&snapshot_at(100, &[("w1", 1e9, 0)]));
    data.ingest(&snapshot_at(101, &[("w1", 1e9, 0), ("w2", 5e8, 1)]));
    data.ingest(&snapshot_at(102, &[("w2", 6e8, 1)]));
    assert!(data.num_samples() == 3);
    assert!(data.num_workers() == 2);
    assert!(data.worker_memory[&Ustr::from("w1")].len() == 2);
    assert!(data.worker_memory[&Ustr::from("w2")].len() == 2);
    let counts = data
        .worker_counts
        .iter()
        .map(|&(_, n)| n)
        .collect::<Vec<usize>>();
    assert!(counts == vec![1, 2, 1]);
}
