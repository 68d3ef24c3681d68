/// Telemetry records for distributed batch-processing workflows.
///
/// A monitored run produces several heterogeneous, partially-overlapping telemetry sources:
///
/// - *Worker samples*: the scheduler-side sampling hook reports the resource state of every
///   worker (memory, active tasks, cores) at a fixed interval.  Accumulated into per-worker
///   time series as `TrackingData`.
///
/// - *Span metrics*: while a metrics span is open, the scheduler reports cumulative fine-grained
///   counters (CPU vs non-CPU thread time, disk traffic, compression and serialization time)
///   keyed by activity/task/metric/unit.  Accumulated as `SpanMetrics`.
///
/// - *Chunk and section records*: instrumentation wrapped around task bodies and named regions
///   inside them produces per-invocation timing/memory records.
///
/// - *Workflow report*: job-level totals (bytes, events, CPU seconds, chunks) counted by the
///   host framework, optionally broken down per dataset.
///
/// This crate defines those record types and the stream utilities over them (time-weighted
/// statistics, fixed-interval folding).  Everything stateful - sampling hooks, the collection
/// lifecycle, aggregation into summaries, persistence and reporting - lives in the `flowmon`
/// crate.
///
/// All series obey one invariant: timestamps within a series are strictly ascending.  The
/// statistics in `stream` rely on it.
mod chunk;
mod dates;
mod report;
mod sample;
mod span;
mod stream;

// Types and utilities for manipulating timestamps.

pub use dates::epoch;
pub use dates::measurement_stamp;
pub use dates::now;
pub use dates::truncate_to_interval;
pub use dates::unix_seconds;
pub use dates::Timestamp;

// Worker resource samples and the tracking series accumulated from them.

pub use sample::ClusterSnapshot;
pub use sample::TrackingData;
pub use sample::WorkerState;

// Time-weighted average of a series, None for an empty series.

pub use stream::time_weighted_avg;

// Largest value in a series, None for an empty series.

pub use stream::peak;

// Bucket a series by a fixed interval and average each bucket.

pub use stream::fold_series;

// Cumulative fine-grained metrics from a scheduler span.

pub use span::SpanMetricKey;
pub use span::SpanMetrics;

// Metric names the aggregation layer knows about.

pub use span::METRIC_COMPRESS;
pub use span::METRIC_DECOMPRESS;
pub use span::METRIC_DESERIALIZE;
pub use span::METRIC_DISK_READ;
pub use span::METRIC_DISK_WRITE;
pub use span::METRIC_SERIALIZE;
pub use span::METRIC_THREAD_CPU;
pub use span::METRIC_THREAD_NONCPU;

// Per-chunk and per-section instrumentation records.

pub use chunk::ChunkRecord;
pub use chunk::SectionKind;
pub use chunk::SectionRecord;

// Chunk timing index for throughput analysis.

pub use chunk::build_chunk_info;
pub use chunk::ChunkInfo;

// Job-level throughput reports from the host framework.

pub use report::DatasetReport;
pub use report::DatasetReports;
pub use report::WorkflowReport;
