/// Render the aggregated summary as sectioned tables.
///
/// Every metric becomes one (section, metric, value) row; the format module turns the rows
/// into fixed-width, csv or json output according to the field spec.  Metrics whose telemetry
/// source was absent render as "-" so the table shape is stable across runs.
use crate::format;
use crate::metrics::Summary;

use anyhow::Result;
use std::collections::HashMap;
use std::io;

const FMT_DEFAULTS: &str = "all";

pub fn print_summary(
    output: &mut dyn io::Write,
    summary: &Summary,
    fmt: Option<&str>,
) -> Result<()> {
    let (formatters, aliases) = my_formatters();
    let spec = fmt.unwrap_or(FMT_DEFAULTS);
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let opts = format::standard_options(&others);
    let rows = summary_rows(summary);
    format::format_data(output, &fields, &formatters, &opts, &rows, &());
    Ok(())
}

pub struct Row {
    pub section: &'static str,
    pub metric: &'static str,
    pub value: String,
}

type RowDatum<'a> = &'a Row;
type RowCtx<'a> = &'a ();

fn my_formatters() -> (
    HashMap<String, format::Formatter<Row, ()>>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, format::Formatter<Row, ()>> = HashMap::new();
    formatters.insert("section".to_string(), format_section);
    formatters.insert("metric".to_string(), format_metric);
    formatters.insert("value".to_string(), format_value);

    let mut aliases = HashMap::new();
    aliases.insert(
        "all".to_string(),
        vec![
            "section".to_string(),
            "metric".to_string(),
            "value".to_string(),
        ],
    );
    (formatters, aliases)
}

fn format_section(d: RowDatum, _: RowCtx) -> String {
    d.section.to_string()
}

fn format_metric(d: RowDatum, _: RowCtx) -> String {
    d.metric.to_string()
}

fn format_value(d: RowDatum, _: RowCtx) -> String {
    d.value.clone()
}

fn summary_rows(s: &Summary) -> Vec<Row> {
    let mut rows = vec![];
    let mut push = |section: &'static str, metric: &'static str, value: String| {
        rows.push(Row {
            section,
            metric,
            value,
        })
    };
    let dash = || "-".to_string();

    // Throughput
    push(
        "throughput",
        "data rate",
        format!(
            "{:.2} Gbps ({:.1} MB/s)",
            s.throughput.data_rate_gbps, s.throughput.data_rate_mbps
        ),
    );
    push(
        "throughput",
        "compression ratio",
        s.throughput
            .compression_ratio
            .map_or_else(dash, |r| format!("{r:.2}x")),
    );
    push("throughput", "data read", {
        let compressed = format_bytes(s.throughput.bytes_compressed as f64);
        match s.throughput.bytes_uncompressed {
            Some(u) => format!(
                "{compressed} compressed, {} uncompressed",
                format_bytes(u as f64)
            ),
            None => format!("{compressed} compressed"),
        }
    });

    // Events
    push("events", "total events", format_count(s.events.total));
    push(
        "events",
        "rate (wall clock)",
        format!("{:.1} kHz", s.events.rate_wall_khz),
    );
    push(
        "events",
        "rate (aggregated)",
        format!("{:.1} kHz", s.events.rate_agg_khz),
    );
    push(
        "events",
        "rate (core-averaged)",
        s.events
            .rate_core_hz
            .map_or_else(dash, |r| format!("{r:.1} Hz/core")),
    );

    // Resources
    push(
        "resources",
        "workers (time-averaged)",
        s.resources.workers_avg.map_or_else(dash, |w| format!("{w:.1}")),
    );
    push(
        "resources",
        "peak workers",
        s.resources.workers_peak.map_or_else(dash, |w| w.to_string()),
    );
    push(
        "resources",
        "cores per worker",
        s.resources
            .cores_per_worker
            .map_or_else(dash, |c| format!("{c:.1}")),
    );
    push(
        "resources",
        "total cores",
        s.resources.cores_total.map_or_else(dash, |c| format!("{c:.0}")),
    );
    push(
        "resources",
        "occupancy",
        s.resources
            .occupancy_avg
            .map_or_else(dash, |o| format!("{:.1}%", o * 100.0)),
    );
    push(
        "resources",
        "peak memory (per worker)",
        s.resources
            .memory_peak_bytes
            .map_or_else(dash, format_bytes),
    );
    push(
        "resources",
        "avg memory (per worker)",
        s.resources
            .memory_avg_per_worker_bytes
            .map_or_else(dash, format_bytes),
    );

    // Efficiency
    push(
        "efficiency",
        "core efficiency",
        s.efficiency
            .core_efficiency
            .map_or_else(dash, |e| format!("{:.1}%", e * 100.0)),
    );
    push(
        "efficiency",
        "speedup",
        s.efficiency.speedup.map_or_else(dash, |x| format!("{x:.1}x")),
    );
    push(
        "efficiency",
        "parallel efficiency",
        s.efficiency
            .parallel_efficiency
            .map_or_else(dash, |e| format!("{:.1}%", e * 100.0)),
    );

    // Timing
    push("timing", "wall time", format_duration(s.timing.wall_seconds));
    push(
        "timing",
        "total cpu time",
        format_duration(s.timing.cpu_seconds),
    );
    if s.timing.num_chunks > 0 {
        push("timing", "chunks", format_count(s.timing.num_chunks));
        push(
            "timing",
            "avg cpu time per chunk",
            format_duration(s.timing.cpu_seconds_per_chunk),
        );
    }

    // Fine metrics, when a span produced readings.
    if let Some(fine) = &s.fine {
        push("fine", "cpu time", format_duration(fine.cpu_seconds));
        push("fine", "i/o time", format_duration(fine.io_seconds));
        push("fine", "cpu", format!("{:.1}%", fine.cpu_pct));
        push("fine", "i/o", format!("{:.1}%", fine.io_pct));
        if fine.disk_read_bytes > 0 {
            push("fine", "disk read", format_bytes(fine.disk_read_bytes as f64));
        }
        if fine.disk_write_bytes > 0 {
            push(
                "fine",
                "disk write",
                format_bytes(fine.disk_write_bytes as f64),
            );
        }
        if fine.compression_overhead_seconds > 0.0 {
            push(
                "fine",
                "compression overhead",
                format!(
                    "{} ({} compress, {} decompress)",
                    format_duration(fine.compression_overhead_seconds),
                    format_duration(fine.compress_seconds),
                    format_duration(fine.decompress_seconds)
                ),
            );
        }
        if fine.serialization_overhead_seconds > 0.0 {
            push(
                "fine",
                "serialization overhead",
                format!(
                    "{} ({} serialize, {} deserialize)",
                    format_duration(fine.serialization_overhead_seconds),
                    format_duration(fine.serialize_seconds),
                    format_duration(fine.deserialize_seconds)
                ),
            );
        }
        if let (Some(p), Some(o)) = (fine.processor_cpu_seconds, fine.overhead_cpu_seconds) {
            push("fine", "processor cpu time", format_duration(p));
            push("fine", "overhead cpu time", format_duration(o));
        }
    }

    // Chunk statistics, when chunks were instrumented.
    if let Some(chunks) = &s.chunks {
        push("chunks", "count", format_count(chunks.count));
        push(
            "chunks",
            "duration (min/avg/max)",
            format!(
                "{} / {} / {}",
                format_duration(chunks.duration_min),
                format_duration(chunks.duration_avg),
                format_duration(chunks.duration_max)
            ),
        );
        push(
            "chunks",
            "events per chunk",
            format!("{:.0}", chunks.events_per_chunk_avg),
        );
        if chunks.bytes_read_total > 0 {
            push(
                "chunks",
                "bytes read",
                format_bytes(chunks.bytes_read_total as f64),
            );
        }
    }

    for section in &s.sections {
        rows.push(Row {
            section: "sections",
            metric: "section",
            value: format!(
                "{}: {} calls, {} total, {} avg",
                section.name,
                section.count,
                format_duration(section.total_seconds),
                format_duration(section.avg_seconds)
            ),
        });
    }

    rows
}

/// Format a byte count in human-readable binary units.

pub fn format_bytes(mut n: f64) -> String {
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if n.abs() < 1024.0 {
            return format!("{n:.2} {unit}");
        }
        n /= 1024.0;
    }
    format!("{n:.2} PB")
}

/// Format a duration in human-readable units.

pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{seconds:.1}s");
    }
    let minutes = (seconds / 60.0) as u64;
    let rem_seconds = (seconds % 60.0) as u64;
    if minutes < 60 {
        return format!("{minutes}m {rem_seconds}s");
    }
    format!("{}h {}m {rem_seconds}s", minutes / 60, minutes % 60)
}

/// Format a count with thousands separators.

pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
use crate::metrics::{
    ChunkSummary, EfficiencySummary, EventSummary, FineSummary, ResourceSummary, SectionSummary,
    ThroughputSummary, TimingSummary,
};

#[cfg(test)]
fn sample_summary() -> Summary {
    Summary {
        throughput: ThroughputSummary {
            data_rate_gbps: 1.6,
            data_rate_mbps: 200.0,
            bytes_compressed: 10_000_000_000,
            bytes_uncompressed: None,
            compression_ratio: None,
        },
        events: EventSummary {
            total: 1_000_000,
            rate_wall_khz: 20.0,
            rate_agg_khz: 10.0,
            rate_core_hz: Some(2500.0),
        },
        timing: TimingSummary {
            wall_seconds: 50.0,
            cpu_seconds: 100.0,
            num_chunks: 50,
            cpu_seconds_per_chunk: 2.0,
        },
        resources: ResourceSummary {
            workers_avg: Some(2.0),
            workers_peak: Some(2),
            cores_per_worker: Some(4.0),
            cores_total: Some(8.0),
            memory_peak_bytes: Some(1.5e9),
            memory_avg_per_worker_bytes: Some(1.125e9),
            active_tasks_avg: Some(3.0),
            active_tasks_peak: Some(3),
            occupancy_avg: Some(0.375),
        },
        efficiency: EfficiencySummary {
            core_efficiency: Some(0.25),
            speedup: Some(2.0),
            parallel_efficiency: Some(1.0),
        },
        fine: None,
        chunks: None,
        sections: vec![],
    }
}

#[test]
fn test_format_bytes() {
    assert!(format_bytes(0.0) == "0.00 B");
    assert!(format_bytes(1536.0) == "1.50 KB");
    assert!(format_bytes(10_000_000_000.0) == "9.31 GB");
}

#[test]
fn test_format_duration() {
    assert!(format_duration(42.5) == "42.5s");
    assert!(format_duration(125.0) == "2m 5s");
    assert!(format_duration(3725.0) == "1h 2m 5s");
}

#[test]
fn test_format_count() {
    assert!(format_count(5) == "5");
    assert!(format_count(1000) == "1,000");
    assert!(format_count(1234567) == "1,234,567");
}

#[test]
fn test_summary_rows_stable_shape() {
    let rows = summary_rows(&sample_summary());
    // Base sections only; no fine/chunk/section telemetry was present.
    assert!(rows.iter().all(|r| r.section != "fine" && r.section != "chunks"));
    let data_rate = rows
        .iter()
        .find(|r| r.metric == "data rate")
        .unwrap();
    assert!(data_rate.value == "1.60 Gbps (200.0 MB/s)");
    let ratio = rows
        .iter()
        .find(|r| r.metric == "compression ratio")
        .unwrap();
    assert!(ratio.value == "-");
    let eff = rows
        .iter()
        .find(|r| r.metric == "core efficiency")
        .unwrap();
    assert!(eff.value == "25.0%");
}

#[test]
fn test_optional_sections_appear_with_data() {
    let mut summary = sample_summary();
    summary.fine = Some(FineSummary {
        cpu_seconds: 100.0,
        io_seconds: 50.0,
        cpu_pct: 66.7,
        io_pct: 33.3,
        disk_read_bytes: 10_000_000_000,
        ..Default::default()
    });
    summary.chunks = Some(ChunkSummary {
        count: 2,
        duration_min: 6.0,
        duration_avg: 8.0,
        duration_max: 10.0,
        events_total: 2500,
        events_per_chunk_avg: 1250.0,
        bytes_read_total: 10_000,
        ..Default::default()
    });
    summary.sections = vec![SectionSummary {
        name: "jet_selection".to_string(),
        count: 2,
        total_seconds: 12.0,
        avg_seconds: 6.0,
    }];
    let rows = summary_rows(&summary);
    assert!(rows.iter().any(|r| r.section == "fine" && r.metric == "disk read"));
    assert!(rows
        .iter()
        .any(|r| r.section == "chunks" && r.value.contains("6.0s / 8.0s / 10.0s")));
    assert!(rows
        .iter()
        .any(|r| r.section == "sections" && r.value.starts_with("jet_selection")));
    // Zero-valued optional fine rows stay hidden.
    assert!(!rows.iter().any(|r| r.metric == "disk write"));
}

#[test]
fn test_print_summary_fixed() {
    let mut out = Vec::new();
    print_summary(&mut out, &sample_summary(), None).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("section"));
    assert!(text.contains("data rate"));
    assert!(text.contains("1.60 Gbps"));
    assert!(text.contains("wall time"));
    assert!(text.contains("50.0s"));
}

#[test]
fn test_print_summary_csv() {
    let mut out = Vec::new();
    print_summary(&mut out, &sample_summary(), Some("metric,value,csv")).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.lines().next().unwrap() == "data rate,1.60 Gbps (200.0 MB/s)");
}

#[test]
fn test_print_summary_bad_spec() {
    let mut out = Vec::new();
    assert!(print_summary(&mut out, &sample_summary(), Some("nonsense")).is_err());
}
