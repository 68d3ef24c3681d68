/// Backend adapters: the seam between this crate and the host distributed-computing framework.
///
/// The host framework owns every loop and thread.  Its scheduler-side sampling callback calls
/// `record_snapshot` once per interval, and its span plumbing forwards cumulative fine-metric
/// readings through `record_span_metric`.  A backend only accumulates what it is handed and
/// answers for it when tracking stops.
use anyhow::{bail, Result};
use chrono::Duration;
use flowlog::{fold_series, ClusterSnapshot, SpanMetricKey, SpanMetrics, Timestamp, TrackingData};
use log::{debug, warn};

pub trait MetricsBackend {
    /// Backend name, used to select the matching aggregation parser.
    fn name(&self) -> &'static str;

    /// Begin accumulating worker samples.  Starting an already-started backend is an error.
    fn start_tracking(&mut self) -> Result<()>;

    /// Sampling hook: fold one scheduler snapshot into the tracking series.  Snapshots arriving
    /// while tracking is stopped are dropped.
    fn record_snapshot(&mut self, snap: &ClusterSnapshot);

    /// Stop accumulating and hand over the series.  None if tracking was never started.
    fn stop_tracking(&mut self) -> Option<TrackingData>;

    fn supports_fine_metrics(&self) -> bool;

    /// Open the fine-metrics span.  Opening a second span before closing the first is an error.
    fn open_span(&mut self, name: &str) -> Result<()>;

    /// Fine-metric hook: accumulate one cumulative counter reading into the open span.
    fn record_span_metric(&mut self, key: SpanMetricKey, value: f64);

    /// Close the span and hand over its counters.  None if no span was open.
    fn close_span(&mut self) -> Option<SpanMetrics>;
}

/// The provided backend: plain accumulation of scheduler-hook deliveries.
///
/// An optional fold interval downsamples the per-worker series when tracking stops, bounding
/// the raw data volume of long runs.  Worker counts are kept at full resolution; that series
/// grows by one point per snapshot regardless of cluster size.
pub struct SchedulerHook {
    tracking: Option<TrackingData>,
    span: Option<SpanMetrics>,
    fold_interval: Option<Duration>,
}

impl SchedulerHook {
    pub fn new() -> SchedulerHook {
        SchedulerHook {
            tracking: None,
            span: None,
            fold_interval: None,
        }
    }

    pub fn with_fold_interval(interval: Duration) -> SchedulerHook {
        SchedulerHook {
            tracking: None,
            span: None,
            fold_interval: Some(interval),
        }
    }
}

impl Default for SchedulerHook {
    fn default() -> SchedulerHook {
        SchedulerHook::new()
    }
}

impl MetricsBackend for SchedulerHook {
    fn name(&self) -> &'static str {
        "scheduler"
    }

    fn start_tracking(&mut self) -> Result<()> {
        if self.tracking.is_some() {
            bail!("Worker tracking already started");
        }
        debug!("worker tracking started");
        self.tracking = Some(TrackingData::new());
        Ok(())
    }

    fn record_snapshot(&mut self, snap: &ClusterSnapshot) {
        match self.tracking.as_mut() {
            Some(data) => {
                if !data.ingest(snap) {
                    debug!("dropped snapshot that did not advance the clock");
                }
            }
            None => {
                warn!("snapshot delivered while tracking is stopped, dropping it");
            }
        }
    }

    fn stop_tracking(&mut self) -> Option<TrackingData> {
        let mut data = self.tracking.take()?;
        debug!(
            "worker tracking stopped: {} samples, {} workers",
            data.num_samples(),
            data.num_workers()
        );
        if let Some(interval) = self.fold_interval {
            fold_worker_series(&mut data, interval);
        }
        Some(data)
    }

    fn supports_fine_metrics(&self) -> bool {
        true
    }

    fn open_span(&mut self, name: &str) -> Result<()> {
        if self.span.is_some() {
            bail!("Span already open");
        }
        debug!("span opened: {name}");
        self.span = Some(SpanMetrics::new());
        Ok(())
    }

    fn record_span_metric(&mut self, key: SpanMetricKey, value: f64) {
        match self.span.as_mut() {
            Some(span) => span.add(key, value),
            None => warn!("span metric delivered with no span open, dropping it"),
        }
    }

    fn close_span(&mut self) -> Option<SpanMetrics> {
        let span = self.span.take()?;
        if span.is_empty() {
            warn!("span closed but no fine metrics were collected");
        } else {
            debug!("span closed with {} fine metrics", span.len());
        }
        Some(span)
    }
}

// Downsample the f64 series; the integer series (active tasks, cores) are step functions where
// in-bucket averaging would invent fractional readings, so they are thinned to bucket-first
// samples instead.

fn fold_worker_series(data: &mut TrackingData, interval: Duration) {
    for series in data.worker_memory.values_mut() {
        *series = fold_series(series, interval);
    }
    for series in data.worker_memory_limit.values_mut() {
        *series = fold_series(series, interval);
    }
    for series in data.worker_active_tasks.values_mut() {
        thin_to_bucket_first(series, interval);
    }
    for series in data.worker_cores.values_mut() {
        thin_to_bucket_first(series, interval);
    }
}

fn thin_to_bucket_first(series: &mut Vec<(Timestamp, u32)>, interval: Duration) {
    let mut last_bucket: Option<Timestamp> = None;
    series.retain(|&(t, _)| {
        let bucket = flowlog::truncate_to_interval(t, interval);
        if last_bucket == Some(bucket) {
            false
        } else {
            last_bucket = Some(bucket);
            true
        }
    });
}

#[cfg(test)]
use flowlog::WorkerState;
#[cfg(test)]
use ustr::Ustr;

#[cfg(test)]
fn snapshot_at(secs: i64, mem: f64) -> ClusterSnapshot {
    use chrono::{TimeZone, Utc};
    ClusterSnapshot {
        timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        workers: vec![WorkerState {
            id: Ustr::from("w1"),
            memory_bytes: mem,
            memory_limit_bytes: 4e9,
            active_tasks: 1,
            cores: 2,
        }],
    }
}

#[test]
fn test_tracking_lifecycle() {
    let mut hook = SchedulerHook::new();
    assert!(hook.stop_tracking().is_none());
    hook.start_tracking().unwrap();
    assert!(hook.start_tracking().is_err());
    hook.record_snapshot(&snapshot_at(100, 1e9));
    hook.record_snapshot(&snapshot_at(101, 2e9));
    let data = hook.stop_tracking().unwrap();
    assert!(data.num_samples() == 2);
    // Stopped: further snapshots are dropped, a new start begins fresh.
    hook.record_snapshot(&snapshot_at(102, 3e9));
    hook.start_tracking().unwrap();
    let data = hook.stop_tracking().unwrap();
    assert!(data.is_empty());
}

#[test]
fn test_span_lifecycle() {
    use flowlog::METRIC_THREAD_CPU;

    let mut hook = SchedulerHook::new();
    assert!(hook.close_span().is_none());
    hook.open_span("workflow-processing").unwrap();
    assert!(hook.open_span("again").is_err());
    let key = SpanMetricKey::execute("process-1", METRIC_THREAD_CPU);
    hook.record_span_metric(key, 5.0);
    hook.record_span_metric(key, 7.0);
    let span = hook.close_span().unwrap();
    assert!(span.sum_metric(METRIC_THREAD_CPU) == 12.0);
    assert!(hook.close_span().is_none());
}

#[test]
fn test_fold_interval_downsamples_memory() {
    let mut hook = SchedulerHook::with_fold_interval(Duration::seconds(10));
    hook.start_tracking().unwrap();
    for i in 0..20 {
        hook.record_snapshot(&snapshot_at(100 + i, 1e9 + i as f64));
    }
    let data = hook.stop_tracking().unwrap();
    // 20 one-second samples spanning [100, 120) fold into 10-second buckets.
    let mem = &data.worker_memory[&Ustr::from("w1")];
    assert!(mem.len() == 2);
    // Worker counts stay at full resolution.
    assert!(data.worker_counts.len() == 20);
    // Integer series are thinned, not averaged.
    let cores = &data.worker_cores[&Ustr::from("w1")];
    assert!(cores.len() == 2);
    assert!(cores.iter().all(|&(_, c)| c == 2));
}
