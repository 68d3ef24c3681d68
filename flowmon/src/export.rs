/// Save and load benchmark measurements for later reanalysis.
///
/// A measurement is a directory:
///
///   <output_dir>/<name>/
///     metrics.json        - summary plus raw telemetry
///     start_end_time.txt  - "t0,t1" in seconds
///     metadata.json       - format version, timestamp, wall seconds
///     config.json         - caller-supplied run configuration, if any
///
/// The name defaults to a timestamp, so repeated runs into the same output directory line up
/// chronologically.
///
/// metrics.json is built by explicit JSON construction rather than blanket derive: the raw
/// telemetry carries interned names and tuple keys that need a defined wire shape.  Span keys
/// are joined with '/' and series points become [seconds, value] pairs.
use crate::metrics::{Metrics, RawData};

use anyhow::{anyhow, Context, Result};
use flowlog::{measurement_stamp, now, unix_seconds, SpanMetrics, Timestamp, TrackingData};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use ustr::Ustr;

/// Version of the on-disk measurement layout.
pub const MEASUREMENT_FORMAT: u32 = 1;

pub fn save_measurement(
    metrics: &Metrics,
    t0: f64,
    t1: f64,
    output_dir: &Path,
    name: Option<&str>,
    config: Option<&HashMap<String, String>>,
) -> Result<PathBuf> {
    let name = match name {
        Some(n) => n.to_string(),
        None => measurement_stamp(now()),
    };
    let dir = output_dir.join(&name);
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create measurement directory {}", dir.display()))?;

    let doc = json!({
        "summary": serde_json::to_value(&metrics.summary)?,
        "raw": raw_to_json(&metrics.raw),
    });
    fs::write(dir.join("metrics.json"), serde_json::to_string_pretty(&doc)?)
        .with_context(|| "Failed to write metrics.json")?;

    fs::write(dir.join("start_end_time.txt"), format!("{t0},{t1}"))
        .with_context(|| "Failed to write start_end_time.txt")?;

    let metadata = json!({
        "format": MEASUREMENT_FORMAT,
        "timestamp": now().to_rfc3339(),
        "wall_seconds": t1 - t0,
    });
    fs::write(
        dir.join("metadata.json"),
        serde_json::to_string_pretty(&metadata)?,
    )
    .with_context(|| "Failed to write metadata.json")?;

    if let Some(config) = config {
        fs::write(
            dir.join("config.json"),
            serde_json::to_string_pretty(&json!(config))?,
        )
        .with_context(|| "Failed to write config.json")?;
    }

    Ok(dir)
}

/// Read back a saved measurement: the metrics document and the (t0, t1) pair.

pub fn load_measurement(path: &Path) -> Result<(Value, f64, f64)> {
    if !path.is_dir() {
        return Err(anyhow!("No measurement at {}", path.display()));
    }
    let metrics_text = fs::read_to_string(path.join("metrics.json"))
        .with_context(|| format!("Measurement {} has no metrics.json", path.display()))?;
    let metrics: Value = serde_json::from_str(&metrics_text)
        .with_context(|| "Malformed metrics.json")?;

    let timing = fs::read_to_string(path.join("start_end_time.txt"))
        .with_context(|| format!("Measurement {} has no start_end_time.txt", path.display()))?;
    let (t0, t1) = parse_timing(timing.trim())?;

    Ok((metrics, t0, t1))
}

fn parse_timing(s: &str) -> Result<(f64, f64)> {
    let mut parts = s.split(',');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) => Ok((
            a.trim().parse::<f64>().with_context(|| "Bad t0 in timing file")?,
            b.trim().parse::<f64>().with_context(|| "Bad t1 in timing file")?,
        )),
        _ => Err(anyhow!("Timing file must contain exactly 't0,t1'")),
    }
}

fn raw_to_json(raw: &RawData) -> Value {
    json!({
        "workers": raw.workers.as_ref().map(tracking_to_json),
        "tasks": raw.tasks.as_ref().map(spans_to_json),
        "chunks": raw.chunks.iter().map(chunk_to_json).collect::<Vec<Value>>(),
        "sections": raw.sections.iter().map(section_to_json).collect::<Vec<Value>>(),
    })
}

fn tracking_to_json(data: &TrackingData) -> Value {
    json!({
        "worker_counts": data
            .worker_counts
            .iter()
            .map(|&(t, n)| json!([unix_seconds(t), n]))
            .collect::<Vec<Value>>(),
        "worker_memory": f64_series_to_json(&data.worker_memory),
        "worker_memory_limit": f64_series_to_json(&data.worker_memory_limit),
        "worker_active_tasks": u32_series_to_json(&data.worker_active_tasks),
        "worker_cores": u32_series_to_json(&data.worker_cores),
    })
}

// Worker maps serialize with sorted keys so that saved measurements diff cleanly.

fn f64_series_to_json(series: &HashMap<Ustr, Vec<(Timestamp, f64)>>) -> Value {
    let mut m = Map::new();
    let mut ids = series.keys().collect::<Vec<&Ustr>>();
    ids.sort();
    for id in ids {
        let points = series[id]
            .iter()
            .map(|&(t, v)| json!([unix_seconds(t), v]))
            .collect::<Vec<Value>>();
        m.insert(id.to_string(), Value::Array(points));
    }
    Value::Object(m)
}

fn u32_series_to_json(series: &HashMap<Ustr, Vec<(Timestamp, u32)>>) -> Value {
    let mut m = Map::new();
    let mut ids = series.keys().collect::<Vec<&Ustr>>();
    ids.sort();
    for id in ids {
        let points = series[id]
            .iter()
            .map(|&(t, v)| json!([unix_seconds(t), v]))
            .collect::<Vec<Value>>();
        m.insert(id.to_string(), Value::Array(points));
    }
    Value::Object(m)
}

fn spans_to_json(spans: &SpanMetrics) -> Value {
    let mut entries = spans
        .iter()
        .map(|(k, &v)| {
            (
                format!("{}/{}/{}/{}", k.activity, k.task, k.metric, k.unit),
                v,
            )
        })
        .collect::<Vec<(String, f64)>>();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let mut m = Map::new();
    for (key, v) in entries {
        m.insert(key, json!(v));
    }
    Value::Object(m)
}

fn chunk_to_json(c: &flowlog::ChunkRecord) -> Value {
    json!({
        "dataset": c.dataset.map(|d| d.to_string()),
        "file": c.file.map(|f| f.to_string()),
        "entry_start": c.entry_start,
        "entry_stop": c.entry_stop,
        "t_start": c.t_start,
        "t_end": c.t_end,
        "duration": c.duration,
        "num_events": c.num_events,
        "bytes_read": c.bytes_read,
        "mem_before_mb": c.mem_before_mb,
        "mem_after_mb": c.mem_after_mb,
        "mem_delta_mb": c.mem_delta_mb,
    })
}

fn section_to_json(s: &flowlog::SectionRecord) -> Value {
    let mut metadata = Map::new();
    for (k, v) in &s.metadata {
        metadata.insert(k.clone(), json!(v));
    }
    json!({
        "name": s.name.to_string(),
        "type": s.kind.as_str(),
        "t_start": s.t_start,
        "t_end": s.t_end,
        "duration": s.duration,
        "mem_before_mb": s.mem_before_mb,
        "mem_after_mb": s.mem_after_mb,
        "mem_delta_mb": s.mem_delta_mb,
        "metadata": Value::Object(metadata),
    })
}

#[cfg(test)]
use crate::metrics::{
    EfficiencySummary, EventSummary, ResourceSummary, Summary, ThroughputSummary, TimingSummary,
};

#[cfg(test)]
fn sample_metrics() -> Metrics {
    Metrics {
        raw: RawData::default(),
        summary: Summary {
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
                rate_core_hz: None,
            },
            timing: TimingSummary {
                wall_seconds: 50.0,
                cpu_seconds: 100.0,
                num_chunks: 50,
                cpu_seconds_per_chunk: 2.0,
            },
            resources: ResourceSummary::default(),
            efficiency: EfficiencySummary::default(),
            fine: None,
            chunks: None,
            sections: vec![],
        },
    }
}

#[cfg(test)]
fn test_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("flowmon-export-{}-{}", tag, std::process::id()))
}

#[test]
fn test_save_creates_measurement_files() {
    let out = test_dir("files");
    let dir = save_measurement(&sample_metrics(), 0.0, 50.0, &out, Some("run1"), None).unwrap();
    assert!(dir.ends_with("run1"));
    assert!(dir.join("metrics.json").is_file());
    assert!(dir.join("start_end_time.txt").is_file());
    assert!(dir.join("metadata.json").is_file());
    assert!(!dir.join("config.json").exists());

    let timing = fs::read_to_string(dir.join("start_end_time.txt")).unwrap();
    assert!(timing == "0,50");

    let metadata: Value =
        serde_json::from_str(&fs::read_to_string(dir.join("metadata.json")).unwrap()).unwrap();
    assert!(metadata["format"] == json!(MEASUREMENT_FORMAT));
    assert!(metadata["wall_seconds"] == json!(50.0));

    fs::remove_dir_all(&out).unwrap();
}

#[test]
fn test_save_with_config() {
    let out = test_dir("config");
    let mut config = HashMap::new();
    config.insert("dataset".to_string(), "ttbar".to_string());
    let dir =
        save_measurement(&sample_metrics(), 0.0, 1.0, &out, Some("run"), Some(&config)).unwrap();
    let saved: Value =
        serde_json::from_str(&fs::read_to_string(dir.join("config.json")).unwrap()).unwrap();
    assert!(saved["dataset"] == json!("ttbar"));
    fs::remove_dir_all(&out).unwrap();
}

#[test]
fn test_save_default_name_is_timestamped() {
    let out = test_dir("stamp");
    let dir = save_measurement(&sample_metrics(), 0.0, 1.0, &out, None, None).unwrap();
    let name = dir.file_name().unwrap().to_str().unwrap();
    // YYYY-MM-DD_HH-MM-SS
    assert!(name.len() == 19);
    assert!(name.as_bytes()[10] == b'_');
    fs::remove_dir_all(&out).unwrap();
}

#[test]
fn test_roundtrip() {
    let out = test_dir("roundtrip");
    let dir =
        save_measurement(&sample_metrics(), 10.5, 60.5, &out, Some("roundtrip"), None).unwrap();
    let (doc, t0, t1) = load_measurement(&dir).unwrap();
    assert!(t0 == 10.5 && t1 == 60.5);
    assert!(doc["summary"]["timing"]["wall_seconds"] == json!(50.0));
    assert!(doc["summary"]["events"]["total"] == json!(1_000_000));
    // Absent optional sources serialize as null/absent, not zero.
    assert!(doc["summary"]["resources"]["workers_avg"].is_null());
    assert!(doc["summary"].get("fine").is_none());
    assert!(doc["raw"]["workers"].is_null());
    fs::remove_dir_all(&out).unwrap();
}

#[test]
fn test_load_errors() {
    let out = test_dir("errors");
    assert!(load_measurement(&out.join("nonexistent")).is_err());

    let incomplete = out.join("incomplete");
    fs::create_dir_all(&incomplete).unwrap();
    assert!(load_measurement(&incomplete).is_err());

    fs::write(incomplete.join("metrics.json"), "{}").unwrap();
    // Still no timing file.
    assert!(load_measurement(&incomplete).is_err());
    fs::remove_dir_all(&out).unwrap();
}

#[test]
fn test_raw_telemetry_wire_shape() {
    use flowlog::{ClusterSnapshot, SpanMetricKey, WorkerState, METRIC_THREAD_CPU};

    let mut tracking = TrackingData::new();
    tracking.ingest(&ClusterSnapshot {
        timestamp: flowlog::epoch() + chrono::Duration::seconds(5),
        workers: vec![WorkerState {
            id: Ustr::from("w1"),
            memory_bytes: 1e9,
            memory_limit_bytes: 4e9,
            active_tasks: 2,
            cores: 4,
        }],
    });
    let mut spans = SpanMetrics::new();
    spans.add(SpanMetricKey::execute("process-x", METRIC_THREAD_CPU), 3.5);

    let mut metrics = sample_metrics();
    metrics.raw.workers = Some(tracking);
    metrics.raw.tasks = Some(spans);

    let doc = raw_to_json(&metrics.raw);
    assert!(doc["workers"]["worker_counts"] == json!([[5.0, 1]]));
    assert!(doc["workers"]["worker_memory"]["w1"] == json!([[5.0, 1e9]]));
    assert!(doc["tasks"]["execute/process-x/thread-cpu/seconds"] == json!(3.5));
}
