/// Fine-grained CPU/I-O breakdown from span metrics.
///
/// The scheduler's cumulative counters separate thread time into CPU ("thread-cpu") and
/// everything else ("thread-noncpu" - blocking I/O, lock waits, GIL-style stalls), and report
/// disk traffic and compression/serialization time alongside.  Summation is across all tasks
/// that reported under the span.
///
/// When a processor label is configured, thread-cpu readings are split into tasks whose name
/// carries the label (the analysis code itself) and the rest (framework overhead).
use crate::metrics::FineSummary;

use flowlog::{
    SpanMetrics, METRIC_COMPRESS, METRIC_DECOMPRESS, METRIC_DESERIALIZE, METRIC_DISK_READ,
    METRIC_DISK_WRITE, METRIC_SERIALIZE, METRIC_THREAD_CPU, METRIC_THREAD_NONCPU,
};

pub fn parse_fine_metrics(spans: &SpanMetrics, processor_label: Option<&str>) -> FineSummary {
    let cpu_seconds = spans.sum_metric(METRIC_THREAD_CPU);
    let io_seconds = spans.sum_metric(METRIC_THREAD_NONCPU);

    let total = cpu_seconds + io_seconds;
    let (cpu_pct, io_pct) = if total > 0.0 {
        (cpu_seconds / total * 100.0, io_seconds / total * 100.0)
    } else {
        (0.0, 0.0)
    };

    let compress_seconds = spans.sum_metric(METRIC_COMPRESS);
    let decompress_seconds = spans.sum_metric(METRIC_DECOMPRESS);
    let serialize_seconds = spans.sum_metric(METRIC_SERIALIZE);
    let deserialize_seconds = spans.sum_metric(METRIC_DESERIALIZE);

    let (processor_cpu_seconds, overhead_cpu_seconds) = match processor_label {
        Some(label) => {
            let processor =
                spans.sum_metric_where(METRIC_THREAD_CPU, |k| k.task.contains(label));
            (Some(processor), Some(cpu_seconds - processor))
        }
        None => (None, None),
    };

    FineSummary {
        cpu_seconds,
        io_seconds,
        cpu_pct,
        io_pct,
        disk_read_bytes: spans.sum_metric(METRIC_DISK_READ) as u64,
        disk_write_bytes: spans.sum_metric(METRIC_DISK_WRITE) as u64,
        compress_seconds,
        decompress_seconds,
        compression_overhead_seconds: compress_seconds + decompress_seconds,
        serialize_seconds,
        deserialize_seconds,
        serialization_overhead_seconds: serialize_seconds + deserialize_seconds,
        processor_cpu_seconds,
        overhead_cpu_seconds,
    }
}

/// Compression ratio and uncompressed volume, derived from span disk traffic.
///
/// The workflow report counts bytes as stored (compressed); the span's disk-read counter
/// measures the bytes actually delivered to tasks after decompression.  The ratio is undefined
/// when either side is zero or the disk counter is absent.

pub fn compression_from_spans(
    bytes_compressed: u64,
    spans: &SpanMetrics,
) -> (Option<f64>, Option<u64>) {
    if !spans.has_metric(METRIC_DISK_READ) || bytes_compressed == 0 {
        return (None, None);
    }
    let disk_read = spans.sum_metric(METRIC_DISK_READ);
    if disk_read <= 0.0 {
        return (None, None);
    }
    let ratio = disk_read / bytes_compressed as f64;
    (Some(ratio), Some(disk_read as u64))
}

#[cfg(test)]
use flowlog::SpanMetricKey;

#[cfg(test)]
fn sample_spans() -> SpanMetrics {
    let mut spans = SpanMetrics::new();
    let add = |s: &mut SpanMetrics, metric: &str, v: f64| {
        s.add(SpanMetricKey::execute("process-abc", metric), v);
    };
    add(&mut spans, METRIC_THREAD_CPU, 100.0);
    add(&mut spans, METRIC_THREAD_NONCPU, 50.0);
    add(&mut spans, METRIC_DISK_READ, 10_000_000_000.0);
    add(&mut spans, METRIC_DISK_WRITE, 500_000_000.0);
    add(&mut spans, METRIC_DECOMPRESS, 5.0);
    add(&mut spans, METRIC_COMPRESS, 1.0);
    add(&mut spans, METRIC_DESERIALIZE, 3.0);
    add(&mut spans, METRIC_SERIALIZE, 2.0);
    spans
}

#[cfg(test)]
fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 0.01
}

#[test]
fn test_parse_extracts_cpu_and_io() {
    let m = parse_fine_metrics(&sample_spans(), None);
    assert!(m.cpu_seconds == 100.0);
    assert!(m.io_seconds == 50.0);
    assert!(approx(m.cpu_pct, 66.67));
    assert!(approx(m.io_pct, 33.33));
}

#[test]
fn test_parse_extracts_disk_and_overheads() {
    let m = parse_fine_metrics(&sample_spans(), None);
    assert!(m.disk_read_bytes == 10_000_000_000);
    assert!(m.disk_write_bytes == 500_000_000);
    assert!(m.compress_seconds == 1.0);
    assert!(m.decompress_seconds == 5.0);
    assert!(m.compression_overhead_seconds == 6.0);
    assert!(m.serialize_seconds == 2.0);
    assert!(m.deserialize_seconds == 3.0);
    assert!(m.serialization_overhead_seconds == 5.0);
}

#[test]
fn test_parse_empty_spans() {
    let m = parse_fine_metrics(&SpanMetrics::new(), None);
    assert!(m.cpu_seconds == 0.0);
    assert!(m.io_seconds == 0.0);
    assert!(m.cpu_pct == 0.0);
    assert!(m.io_pct == 0.0);
    assert!(m.disk_read_bytes == 0);
}

#[test]
fn test_parse_zero_total_time() {
    let mut spans = SpanMetrics::new();
    spans.add(SpanMetricKey::execute("t", METRIC_THREAD_CPU), 0.0);
    spans.add(SpanMetricKey::execute("t", METRIC_THREAD_NONCPU), 0.0);
    let m = parse_fine_metrics(&spans, None);
    assert!(m.cpu_pct == 0.0 && m.io_pct == 0.0);
}

#[test]
fn test_processor_split() {
    let mut spans = sample_spans();
    spans.add(
        SpanMetricKey::execute("shuffle-17", METRIC_THREAD_CPU),
        25.0,
    );
    let m = parse_fine_metrics(&spans, Some("process"));
    assert!(m.processor_cpu_seconds == Some(100.0));
    assert!(m.overhead_cpu_seconds == Some(25.0));
    // Without a label the split is not reported.
    let m = parse_fine_metrics(&spans, None);
    assert!(m.processor_cpu_seconds.is_none());
    assert!(m.overhead_cpu_seconds.is_none());
}

#[test]
fn test_compression_ratio() {
    let (ratio, uncompressed) = compression_from_spans(4_000_000_000, &sample_spans());
    assert!(approx(ratio.unwrap(), 2.5));
    assert!(uncompressed == Some(10_000_000_000));
}

#[test]
fn test_compression_ratio_unity() {
    let mut spans = SpanMetrics::new();
    spans.add(
        SpanMetricKey::execute("t", METRIC_DISK_READ),
        5_000_000_000.0,
    );
    let (ratio, uncompressed) = compression_from_spans(5_000_000_000, &spans);
    assert!(approx(ratio.unwrap(), 1.0));
    assert!(uncompressed == Some(5_000_000_000));
}

#[test]
fn test_compression_ratio_undefined() {
    // No disk-read metric at all.
    assert!(compression_from_spans(4_000_000_000, &SpanMetrics::new()) == (None, None));
    // Disk-read present but zero.
    let mut spans = SpanMetrics::new();
    spans.add(SpanMetricKey::execute("t", METRIC_DISK_READ), 0.0);
    assert!(compression_from_spans(4_000_000_000, &spans) == (None, None));
    // Compressed side zero.
    assert!(compression_from_spans(0, &sample_spans()) == (None, None));
}
