/// The aggregated metrics structure: raw telemetry preserved verbatim plus a typed summary.
///
/// The summary is what gets reported and compared across runs; the raw section keeps the
/// unreduced telemetry so a saved measurement can be reanalyzed later without rerunning the
/// workflow.
///
/// Quantities that depend on an optional telemetry source are Option and None when the source
/// was absent; they are never zero-filled, so a missing source cannot be mistaken for an idle
/// cluster.  All field names carry their unit.
use flowlog::{ChunkRecord, SectionRecord, SpanMetrics, TrackingData};

use serde::Serialize;

#[derive(Debug, Clone)]
pub struct Metrics {
    pub raw: RawData,
    pub summary: Summary,
}

/// Unreduced telemetry inputs, exactly as collected.
#[derive(Debug, Clone, Default)]
pub struct RawData {
    pub workers: Option<TrackingData>,
    pub tasks: Option<SpanMetrics>,
    pub chunks: Vec<ChunkRecord>,
    pub sections: Vec<SectionRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub throughput: ThroughputSummary,
    pub events: EventSummary,
    pub timing: TimingSummary,
    pub resources: ResourceSummary,
    pub efficiency: EfficiencySummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fine: Option<FineSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<ChunkSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<SectionSummary>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ThroughputSummary {
    pub data_rate_gbps: f64,
    pub data_rate_mbps: f64,
    /// Bytes read as stored.
    pub bytes_compressed: u64,
    /// Bytes after decompression, known only when span metrics observed disk traffic.
    pub bytes_uncompressed: Option<u64>,
    pub compression_ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EventSummary {
    pub total: u64,
    /// Events per wall-clock second, in kHz.
    pub rate_wall_khz: f64,
    /// Events per aggregate CPU second, in kHz.
    pub rate_agg_khz: f64,
    /// Events per core-second of capacity, in Hz; needs worker data.
    pub rate_core_hz: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TimingSummary {
    pub wall_seconds: f64,
    /// Aggregate CPU seconds across all task invocations.
    pub cpu_seconds: f64,
    pub num_chunks: u64,
    pub cpu_seconds_per_chunk: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceSummary {
    pub workers_avg: Option<f64>,
    pub workers_peak: Option<usize>,
    pub cores_per_worker: Option<f64>,
    pub cores_total: Option<f64>,
    pub memory_peak_bytes: Option<f64>,
    pub memory_avg_per_worker_bytes: Option<f64>,
    pub active_tasks_avg: Option<f64>,
    pub active_tasks_peak: Option<u32>,
    /// Mean fraction of core capacity occupied by executing tasks.
    pub occupancy_avg: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EfficiencySummary {
    /// CPU seconds consumed over CPU seconds available (cores x wall time).
    pub core_efficiency: Option<f64>,
    /// Aggregate CPU time over wall time.
    pub speedup: Option<f64>,
    /// Speedup per time-averaged worker.
    pub parallel_efficiency: Option<f64>,
}

/// Fine-grained breakdown from span metrics.  Present only when a span produced readings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FineSummary {
    pub cpu_seconds: f64,
    pub io_seconds: f64,
    pub cpu_pct: f64,
    pub io_pct: f64,
    pub disk_read_bytes: u64,
    pub disk_write_bytes: u64,
    pub compress_seconds: f64,
    pub decompress_seconds: f64,
    pub compression_overhead_seconds: f64,
    pub serialize_seconds: f64,
    pub deserialize_seconds: f64,
    pub serialization_overhead_seconds: f64,
    /// CPU seconds in tasks matching the configured processor label, and everything else.
    /// None when no label was configured, in which case the split is unknowable.
    pub processor_cpu_seconds: Option<f64>,
    pub overhead_cpu_seconds: Option<f64>,
}

/// Statistics over instrumented chunks.  Present only when chunks were recorded.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChunkSummary {
    pub count: u64,
    pub duration_min: f64,
    pub duration_avg: f64,
    pub duration_max: f64,
    pub events_total: u64,
    pub events_per_chunk_avg: f64,
    pub bytes_read_total: u64,
    pub mem_delta_mb_avg: f64,
    pub mem_delta_mb_max: f64,
}

/// Rollup of one instrumented section name.
#[derive(Debug, Clone, Serialize)]
pub struct SectionSummary {
    pub name: String,
    pub count: u64,
    pub total_seconds: f64,
    pub avg_seconds: f64,
}
