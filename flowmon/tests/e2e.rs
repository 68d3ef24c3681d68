// End-to-end test of a monitored workflow run.
//
// There is no cluster here: the host framework's side of the seam (the sampling loop, the span
// plumbing, the task executor) is played by the test, which drives the collector's backend
// hooks directly.  Everything downstream of the seam - accumulation, aggregation, persistence,
// reporting - is the real thing.

use chrono::Duration;
use flowlog::{
    ClusterSnapshot, DatasetReport, DatasetReports, SpanMetricKey, WorkerState, WorkflowReport,
    METRIC_DISK_READ, METRIC_THREAD_CPU, METRIC_THREAD_NONCPU,
};
use flowmon::{
    load_measurement, ChunkMeta, CollectorOptions, MetricsBackend, MetricsCollector, SchedulerHook,
};
use std::path::PathBuf;
use ustr::Ustr;

fn snapshot(offset_secs: i64, mems: &[(&str, f64)]) -> ClusterSnapshot {
    ClusterSnapshot {
        timestamp: flowlog::now() + Duration::milliseconds(offset_secs * 1000),
        workers: mems
            .iter()
            .map(|&(id, mem)| WorkerState {
                id: Ustr::from(id),
                memory_bytes: mem,
                memory_limit_bytes: 8e9,
                active_tasks: 2,
                cores: 4,
            })
            .collect(),
    }
}

fn test_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("flowmon-e2e-{}-{}", tag, std::process::id()))
}

#[test]
fn full_run_produces_consistent_metrics() {
    let options = CollectorOptions {
        processor_label: Some("process".to_string()),
        ..Default::default()
    };
    let mut collector = MetricsCollector::with_options(SchedulerHook::new(), options);
    collector.start().unwrap();

    // Sampling hook: two workers observed twice.
    collector
        .backend_mut()
        .record_snapshot(&snapshot(0, &[("w1", 1.0e9), ("w2", 0.8e9)]));
    collector
        .backend_mut()
        .record_snapshot(&snapshot(1, &[("w1", 1.5e9), ("w2", 1.2e9)]));

    // Span plumbing: fine counters for processor tasks and framework overhead.
    let backend = collector.backend_mut();
    backend.record_span_metric(SpanMetricKey::execute("process-abc", METRIC_THREAD_CPU), 40.0);
    backend.record_span_metric(
        SpanMetricKey::execute("process-abc", METRIC_THREAD_NONCPU),
        10.0,
    );
    backend.record_span_metric(SpanMetricKey::execute("shuffle-1", METRIC_THREAD_CPU), 5.0);
    backend.record_span_metric(
        SpanMetricKey::execute("process-abc", METRIC_DISK_READ),
        2_500_000_000.0,
    );

    // Task executor: two instrumented chunks with a section inside.
    for (dataset, events) in [("ttbar", 600_000u64), ("wjets", 400_000u64)] {
        let meta = ChunkMeta {
            dataset: Some(Ustr::from(dataset)),
            file: Some(Ustr::from("data.root")),
            entry_start: Some(0),
            entry_stop: Some(events),
            num_events: events,
            bytes_read: 500_000_000,
            ..Default::default()
        };
        collector.track_chunk(meta, || {
            collector_noop();
        });
    }

    // The host framework's job-level report, with a per-dataset breakdown.
    collector.set_report(WorkflowReport {
        bytes_read: 1_000_000_000,
        entries: 1_000_000,
        process_time: 80.0,
        chunks: 2,
    });
    let mut datasets = DatasetReports::new();
    datasets.insert(
        Ustr::from("ttbar"),
        DatasetReport {
            entries: 600_000,
            duration: 48.0,
            bytes_read: 600_000_000,
        },
    );
    datasets.insert(
        Ustr::from("wjets"),
        DatasetReport {
            entries: 400_000,
            duration: 32.0,
            bytes_read: 400_000_000,
        },
    );
    collector.set_dataset_reports(datasets);

    collector.finish().unwrap();
    let metrics = collector.metrics().unwrap();

    // Workflow totals come from the dataset breakdown.
    assert!(metrics.summary.events.total == 1_000_000);
    assert!(metrics.summary.throughput.bytes_compressed == 1_000_000_000);
    assert!(metrics.summary.timing.cpu_seconds == 80.0);

    // Worker tracking.
    assert!(metrics.summary.resources.workers_peak == Some(2));
    assert!(metrics.summary.resources.cores_total == Some(8.0));
    assert!(metrics.summary.resources.memory_peak_bytes == Some(1.5e9));

    // Fine metrics and the processor split.
    let fine = metrics.summary.fine.as_ref().unwrap();
    assert!(fine.cpu_seconds == 45.0);
    assert!(fine.io_seconds == 10.0);
    assert!(fine.processor_cpu_seconds == Some(40.0));
    assert!(fine.overhead_cpu_seconds == Some(5.0));

    // Compression derived from span disk traffic: 2.5 GB delivered / 1 GB stored.
    assert!(metrics.summary.throughput.compression_ratio == Some(2.5));
    assert!(metrics.summary.throughput.bytes_uncompressed == Some(2_500_000_000));

    // Instrumentation.
    let chunks = metrics.summary.chunks.as_ref().unwrap();
    assert!(chunks.count == 2);
    assert!(chunks.events_total == 1_000_000);
    assert!(chunks.bytes_read_total == 1_000_000_000);

    // Raw telemetry preserved for reanalysis.
    assert!(metrics.raw.workers.as_ref().unwrap().num_samples() == 2);
    assert!(metrics.raw.tasks.is_some());
    assert!(metrics.raw.chunks.len() == 2);
}

// track_chunk holds &mut self, so the chunk body cannot call back into the collector; sections
// inside chunks are recorded by the worker-side instrumentation in a real run.
fn collector_noop() {}

#[test]
fn measurement_roundtrip_and_report() {
    let mut collector = MetricsCollector::new(SchedulerHook::new());
    collector.start().unwrap();
    collector
        .backend_mut()
        .record_snapshot(&snapshot(0, &[("w1", 2.0e9)]));
    collector
        .backend_mut()
        .record_snapshot(&snapshot(1, &[("w1", 3.0e9)]));
    collector.time_section("histogram_fill", &[("step", "final")], || {});
    collector.set_report(WorkflowReport {
        bytes_read: 5_000_000_000,
        entries: 500_000,
        process_time: 50.0,
        chunks: 25,
    });
    collector.finish().unwrap();

    // Save and load back.
    let out = test_dir("roundtrip");
    let dir = collector.save_measurement(&out, Some("run1")).unwrap();
    let (doc, t0, t1) = load_measurement(&dir).unwrap();
    assert!(t1 >= t0);
    assert!(doc["summary"]["events"]["total"] == serde_json::json!(500_000));
    assert!(doc["summary"]["resources"]["workers_peak"] == serde_json::json!(1));
    let mem = &doc["raw"]["workers"]["worker_memory"]["w1"];
    assert!(mem.as_array().unwrap().len() == 2);
    assert!(doc["raw"]["sections"][0]["name"] == serde_json::json!("histogram_fill"));
    std::fs::remove_dir_all(&out).unwrap();

    // Render the summary both human- and machine-readable.
    let mut fixed = Vec::new();
    collector.print_summary(&mut fixed, None).unwrap();
    let text = String::from_utf8(fixed).unwrap();
    assert!(text.contains("data rate"));
    assert!(text.contains("total events"));
    assert!(text.contains("500,000"));

    let mut csv = Vec::new();
    collector
        .print_summary(&mut csv, Some("metric,value,csv"))
        .unwrap();
    let text = String::from_utf8(csv).unwrap();
    assert!(text.lines().any(|l| l.starts_with("total events,")));
}

#[test]
fn tracking_disabled_leaves_worker_metrics_unknown() {
    let options = CollectorOptions {
        track_workers: false,
        ..Default::default()
    };
    let mut collector = MetricsCollector::with_options(SchedulerHook::new(), options);
    collector.start().unwrap();
    // The hook still fires; the backend drops what it is handed while stopped.
    collector
        .backend_mut()
        .record_snapshot(&snapshot(0, &[("w1", 1e9)]));
    collector.set_report(WorkflowReport {
        bytes_read: 1_000,
        entries: 100,
        process_time: 1.0,
        chunks: 1,
    });
    collector.finish().unwrap();

    let metrics = collector.metrics().unwrap();
    assert!(metrics.summary.resources.workers_avg.is_none());
    assert!(metrics.summary.resources.workers_peak.is_none());
    assert!(metrics.summary.resources.cores_total.is_none());
    assert!(metrics.summary.efficiency.core_efficiency.is_none());
    assert!(metrics.raw.workers.is_none());
    // Workflow metrics are unaffected.
    assert!(metrics.summary.events.total == 100);
    assert!(metrics.summary.throughput.data_rate_gbps > 0.0);
}
