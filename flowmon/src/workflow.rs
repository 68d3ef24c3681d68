/// Workflow-level metrics: throughput, event rates and timing from the job-level report.
///
/// When a per-dataset breakdown is present it is the source for the byte/event/CPU totals;
/// otherwise the report's own totals are used.  The chunk count always comes from the report.
///
/// Rates against a zero denominator are pinned to zero rather than propagated as NaN: a
/// zero-length run has measured nothing, and zero is what the downstream ratio consumers
/// expect from it.
use crate::metrics::{EventSummary, ThroughputSummary, TimingSummary};

use flowlog::{DatasetReports, WorkflowReport};

#[derive(Debug, Clone, Default)]
pub struct WorkflowMetrics {
    pub wall_seconds: f64,
    pub cpu_seconds: f64,
    pub num_chunks: u64,
    pub cpu_seconds_per_chunk: f64,
    pub total_events: u64,
    pub bytes_compressed: u64,
    pub data_rate_gbps: f64,
    pub data_rate_mbps: f64,
    pub rate_wall_khz: f64,
    pub rate_agg_khz: f64,
}

pub fn aggregate_workflow_metrics(
    report: &WorkflowReport,
    datasets: Option<&DatasetReports>,
    t_start: f64,
    t_end: f64,
) -> WorkflowMetrics {
    let wall_seconds = t_end - t_start;

    let (bytes_compressed, total_events, cpu_seconds) = match datasets {
        Some(ds) if !ds.is_empty() => {
            let mut bytes = 0u64;
            let mut events = 0u64;
            let mut cpu = 0.0;
            for d in ds.values() {
                bytes += d.bytes_read;
                events += d.entries;
                cpu += d.duration;
            }
            (bytes, events, cpu)
        }
        _ => (report.bytes_read, report.entries, report.process_time),
    };

    let num_chunks = report.chunks;

    let (data_rate_gbps, data_rate_mbps, rate_wall_khz) = if wall_seconds > 0.0 {
        (
            bytes_compressed as f64 * 8.0 / 1e9 / wall_seconds,
            bytes_compressed as f64 / 1e6 / wall_seconds,
            total_events as f64 / wall_seconds / 1000.0,
        )
    } else {
        (0.0, 0.0, 0.0)
    };

    let rate_agg_khz = if cpu_seconds > 0.0 {
        total_events as f64 / cpu_seconds / 1000.0
    } else {
        0.0
    };

    let cpu_seconds_per_chunk = if num_chunks > 0 {
        cpu_seconds / num_chunks as f64
    } else {
        0.0
    };

    WorkflowMetrics {
        wall_seconds,
        cpu_seconds,
        num_chunks,
        cpu_seconds_per_chunk,
        total_events,
        bytes_compressed,
        data_rate_gbps,
        data_rate_mbps,
        rate_wall_khz,
        rate_agg_khz,
    }
}

impl WorkflowMetrics {
    pub fn throughput_summary(&self) -> ThroughputSummary {
        ThroughputSummary {
            data_rate_gbps: self.data_rate_gbps,
            data_rate_mbps: self.data_rate_mbps,
            bytes_compressed: self.bytes_compressed,
            // Filled from span metrics by the aggregator when available.
            bytes_uncompressed: None,
            compression_ratio: None,
        }
    }

    pub fn event_summary(&self) -> EventSummary {
        EventSummary {
            total: self.total_events,
            rate_wall_khz: self.rate_wall_khz,
            rate_agg_khz: self.rate_agg_khz,
            rate_core_hz: None,
        }
    }

    pub fn timing_summary(&self) -> TimingSummary {
        TimingSummary {
            wall_seconds: self.wall_seconds,
            cpu_seconds: self.cpu_seconds,
            num_chunks: self.num_chunks,
            cpu_seconds_per_chunk: self.cpu_seconds_per_chunk,
        }
    }
}

#[cfg(test)]
fn sample_report() -> WorkflowReport {
    WorkflowReport {
        bytes_read: 10_000_000_000,
        entries: 1_000_000,
        process_time: 100.0,
        chunks: 50,
    }
}

#[cfg(test)]
fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_basic_totals() {
    let m = aggregate_workflow_metrics(&sample_report(), None, 0.0, 50.0);
    assert!(m.wall_seconds == 50.0);
    assert!(m.cpu_seconds == 100.0);
    assert!(m.num_chunks == 50);
    assert!(m.total_events == 1_000_000);
    assert!(m.bytes_compressed == 10_000_000_000);
}

#[test]
fn test_throughput_rates() {
    let m = aggregate_workflow_metrics(&sample_report(), None, 0.0, 50.0);
    // 10 GB in 50 seconds: 1.6 Gbps, 200 MB/s.
    assert!(approx(m.data_rate_gbps, 1.6));
    assert!(approx(m.data_rate_mbps, 200.0));
}

#[test]
fn test_event_rates() {
    let m = aggregate_workflow_metrics(&sample_report(), None, 0.0, 50.0);
    // 1M events / 50 s wall = 20 kHz; 1M events / 100 s CPU = 10 kHz.
    assert!(approx(m.rate_wall_khz, 20.0));
    assert!(approx(m.rate_agg_khz, 10.0));
    // 100 s CPU / 50 chunks.
    assert!(approx(m.cpu_seconds_per_chunk, 2.0));
}

#[test]
fn test_dataset_breakdown_is_authoritative() {
    use flowlog::DatasetReport;
    use ustr::Ustr;

    let mut datasets = DatasetReports::new();
    datasets.insert(
        Ustr::from("ttbar"),
        DatasetReport {
            entries: 600_000,
            duration: 60.0,
            bytes_read: 6_000_000_000,
        },
    );
    datasets.insert(
        Ustr::from("wjets"),
        DatasetReport {
            entries: 400_000,
            duration: 40.0,
            bytes_read: 4_000_000_000,
        },
    );
    // Report totals disagree on purpose; the breakdown wins.
    let report = WorkflowReport {
        bytes_read: 1,
        entries: 1,
        process_time: 1.0,
        chunks: 50,
    };
    let m = aggregate_workflow_metrics(&report, Some(&datasets), 0.0, 50.0);
    assert!(m.total_events == 1_000_000);
    assert!(m.bytes_compressed == 10_000_000_000);
    assert!(approx(m.cpu_seconds, 100.0));
    assert!(m.num_chunks == 50);
}

#[test]
fn test_zero_wall_time() {
    let m = aggregate_workflow_metrics(&sample_report(), None, 10.0, 10.0);
    assert!(m.data_rate_gbps == 0.0);
    assert!(m.data_rate_mbps == 0.0);
    assert!(m.rate_wall_khz == 0.0);
    // CPU-based rate is unaffected by wall time.
    assert!(approx(m.rate_agg_khz, 10.0));
}

#[test]
fn test_zero_cpu_time_and_chunks() {
    let report = WorkflowReport {
        bytes_read: 1000,
        entries: 100,
        process_time: 0.0,
        chunks: 0,
    };
    let m = aggregate_workflow_metrics(&report, None, 0.0, 10.0);
    assert!(m.rate_agg_khz == 0.0);
    assert!(m.cpu_seconds_per_chunk == 0.0);
}
