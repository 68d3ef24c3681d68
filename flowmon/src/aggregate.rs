/// The combining aggregator: raw telemetry in, `Metrics` out.
///
/// Aggregation is a pure transformation.  Inputs are moved into `Metrics::raw` unchanged so a
/// saved measurement can be reanalyzed; nothing is mutated along the way.
use crate::chunks::{aggregate_chunk_metrics, aggregate_section_metrics};
use crate::efficiency::calculate_efficiency_metrics;
use crate::fine::{compression_from_spans, parse_fine_metrics};
use crate::metrics::{Metrics, RawData, Summary};
use crate::workers::parse_tracking_data;
use crate::workflow::aggregate_workflow_metrics;

use anyhow::{bail, Result};
use flowlog::{ChunkRecord, DatasetReports, SectionRecord, SpanMetrics, TrackingData, WorkflowReport};

/// Everything one collection run hands to the aggregator.
#[derive(Debug, Clone, Default)]
pub struct AggregationInputs {
    pub report: WorkflowReport,
    pub datasets: Option<DatasetReports>,
    pub tracking: Option<TrackingData>,
    pub spans: Option<SpanMetrics>,
    pub chunks: Vec<ChunkRecord>,
    pub sections: Vec<SectionRecord>,
    pub t_start: f64,
    pub t_end: f64,
    pub processor_label: Option<String>,
}

#[derive(Debug)]
pub struct MetricsAggregator {
    backend: &'static str,
}

// Backends with a known telemetry shape.  The aggregation layer is deliberately picky here:
// tracking data from an unknown backend could use different units or sampling semantics.
const SUPPORTED_BACKENDS: &[&str] = &["scheduler"];

impl MetricsAggregator {
    pub fn new(backend: &str) -> Result<MetricsAggregator> {
        match SUPPORTED_BACKENDS.iter().find(|&&b| b == backend) {
            Some(&b) => Ok(MetricsAggregator { backend: b }),
            None => bail!("Unsupported backend: {backend}"),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend
    }

    pub fn aggregate(&self, inputs: AggregationInputs) -> Metrics {
        let AggregationInputs {
            report,
            datasets,
            tracking,
            spans,
            chunks,
            sections,
            t_start,
            t_end,
            processor_label,
        } = inputs;

        let workflow =
            aggregate_workflow_metrics(&report, datasets.as_ref(), t_start, t_end);
        let resources = parse_tracking_data(tracking.as_ref());
        let efficiency = calculate_efficiency_metrics(&workflow, &resources);

        let mut throughput = workflow.throughput_summary();
        let mut events = workflow.event_summary();
        events.rate_core_hz = efficiency.rate_core_hz;

        let fine = match &spans {
            Some(s) if !s.is_empty() => {
                let (ratio, uncompressed) =
                    compression_from_spans(throughput.bytes_compressed, s);
                throughput.compression_ratio = ratio;
                throughput.bytes_uncompressed = uncompressed;
                Some(parse_fine_metrics(s, processor_label.as_deref()))
            }
            _ => None,
        };

        let summary = Summary {
            throughput,
            events,
            timing: workflow.timing_summary(),
            resources,
            efficiency: efficiency.summary,
            fine,
            chunks: aggregate_chunk_metrics(&chunks),
            sections: aggregate_section_metrics(&sections),
        };

        Metrics {
            raw: RawData {
                workers: tracking,
                tasks: spans,
                chunks,
                sections,
            },
            summary,
        }
    }
}

#[cfg(test)]
use flowlog::{ClusterSnapshot, SpanMetricKey, WorkerState, METRIC_DISK_READ, METRIC_THREAD_CPU, METRIC_THREAD_NONCPU};
#[cfg(test)]
use ustr::Ustr;

#[cfg(test)]
fn sample_report() -> WorkflowReport {
    WorkflowReport {
        bytes_read: 5_000_000_000,
        entries: 500_000,
        process_time: 50.0,
        chunks: 25,
    }
}

#[cfg(test)]
fn sample_tracking() -> TrackingData {
    use chrono::{TimeZone, Utc};

    let mk = |secs: u32, w1_mem: f64, w2_mem: f64| ClusterSnapshot {
        timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, secs).unwrap(),
        workers: vec![
            WorkerState {
                id: Ustr::from("worker1"),
                memory_bytes: w1_mem,
                memory_limit_bytes: 4e9,
                active_tasks: 2,
                cores: 4,
            },
            WorkerState {
                id: Ustr::from("worker2"),
                memory_bytes: w2_mem,
                memory_limit_bytes: 4e9,
                active_tasks: 1,
                cores: 4,
            },
        ],
    };
    let mut data = TrackingData::new();
    data.ingest(&mk(0, 1.0e9, 0.8e9));
    data.ingest(&mk(10, 1.5e9, 1.2e9));
    data
}

#[cfg(test)]
fn sample_inputs() -> AggregationInputs {
    AggregationInputs {
        report: sample_report(),
        tracking: Some(sample_tracking()),
        t_start: 0.0,
        t_end: 25.0,
        ..Default::default()
    }
}

#[test]
fn test_unsupported_backend_rejected() {
    let aggregator = MetricsAggregator::new("scheduler").unwrap();
    assert!(aggregator.backend_name() == "scheduler");
    let err = MetricsAggregator::new("taskvine").unwrap_err();
    assert!(err.to_string().contains("Unsupported backend"));
}

#[test]
fn test_aggregate_combines_all_sections() {
    let aggregator = MetricsAggregator::new("scheduler").unwrap();
    let m = aggregator.aggregate(sample_inputs());

    assert!(m.summary.timing.wall_seconds == 25.0);
    assert!(m.summary.timing.cpu_seconds == 50.0);
    assert!(m.summary.throughput.data_rate_gbps > 0.0);
    assert!(m.summary.events.rate_wall_khz == 20.0);

    assert!(m.summary.resources.workers_avg == Some(2.0));
    assert!(m.summary.resources.workers_peak == Some(2));
    assert!(m.summary.resources.cores_total == Some(8.0));
    assert!(m.summary.resources.memory_peak_bytes == Some(1.5e9));

    // 50 s CPU over 25 s wall on 8 cores.
    assert!(m.summary.efficiency.speedup == Some(2.0));
    assert!(m.summary.efficiency.core_efficiency == Some(0.25));
    assert!(m.summary.events.rate_core_hz == Some(2500.0));
}

#[test]
fn test_aggregate_preserves_raw_inputs() {
    let aggregator = MetricsAggregator::new("scheduler").unwrap();
    let m = aggregator.aggregate(sample_inputs());
    let workers = m.raw.workers.as_ref().unwrap();
    assert!(workers.num_samples() == 2);
    assert!(workers.worker_memory[&Ustr::from("worker1")][1].1 == 1.5e9);
    assert!(m.raw.tasks.is_none());
    assert!(m.raw.chunks.is_empty());
}

#[test]
fn test_aggregate_without_tracking() {
    let aggregator = MetricsAggregator::new("scheduler").unwrap();
    let mut inputs = sample_inputs();
    inputs.tracking = None;
    let m = aggregator.aggregate(inputs);

    assert!(m.summary.timing.wall_seconds == 25.0);
    assert!(m.summary.throughput.data_rate_gbps > 0.0);
    assert!(m.raw.workers.is_none());
    assert!(m.summary.resources.workers_avg.is_none());
    assert!(m.summary.resources.cores_total.is_none());
    assert!(m.summary.efficiency.core_efficiency.is_none());
    // Wall time is known, so speedup still is.
    assert!(m.summary.efficiency.speedup == Some(2.0));
}

#[test]
fn test_aggregate_with_spans_fills_compression() {
    let mut spans = SpanMetrics::new();
    spans.add(SpanMetricKey::execute("process-x", METRIC_THREAD_CPU), 40.0);
    spans.add(SpanMetricKey::execute("process-x", METRIC_THREAD_NONCPU), 10.0);
    spans.add(
        SpanMetricKey::execute("process-x", METRIC_DISK_READ),
        12_500_000_000.0,
    );

    let aggregator = MetricsAggregator::new("scheduler").unwrap();
    let mut inputs = sample_inputs();
    inputs.spans = Some(spans);
    let m = aggregator.aggregate(inputs);

    let fine = m.summary.fine.as_ref().unwrap();
    assert!(fine.cpu_seconds == 40.0);
    assert!(fine.cpu_pct == 80.0);
    // 12.5 GB uncompressed over 5 GB compressed.
    assert!(m.summary.throughput.compression_ratio == Some(2.5));
    assert!(m.summary.throughput.bytes_uncompressed == Some(12_500_000_000));
    assert!(m.raw.tasks.is_some());
}

#[test]
fn test_aggregate_with_chunks_and_sections() {
    use flowlog::SectionKind;

    let aggregator = MetricsAggregator::new("scheduler").unwrap();
    let mut inputs = sample_inputs();
    inputs.chunks = vec![
        ChunkRecord {
            t_start: 0.0,
            t_end: 10.0,
            duration: 10.0,
            num_events: 1000,
            ..Default::default()
        },
        ChunkRecord {
            t_start: 10.0,
            t_end: 20.0,
            duration: 10.0,
            num_events: 1500,
            ..Default::default()
        },
    ];
    inputs.sections = vec![SectionRecord {
        name: Ustr::from("jet_selection"),
        kind: SectionKind::Time,
        t_start: 0.0,
        t_end: 5.0,
        duration: 5.0,
        mem_before_mb: None,
        mem_after_mb: None,
        mem_delta_mb: None,
        metadata: vec![],
    }];
    let m = aggregator.aggregate(inputs);

    let chunks = m.summary.chunks.as_ref().unwrap();
    assert!(chunks.duration_max == 10.0);
    assert!(chunks.events_total == 2500);
    assert!(m.raw.chunks.len() == 2);
    assert!(m.summary.sections.len() == 1);
    assert!(m.summary.sections[0].name == "jet_selection");
    assert!(m.raw.sections.len() == 1);
}
