/// Collect, aggregate and report performance telemetry for distributed batch workflows.
///
/// The `flowlog` crate defines the telemetry records; this crate does everything with them:
///
/// - The *backend* is the seam to the host distributed-computing framework.  The framework owns
///   all sampling loops; its scheduler hooks push worker snapshots and span counters into the
///   backend, which only accumulates.
///
/// - The *collector* brackets one monitored run: it anchors the clock, drives the backend's
///   tracking and span lifecycle, sinks chunk/section instrumentation records, takes the
///   workflow report, and on finish hands everything to the aggregator.
///
/// - The *aggregation pipeline* is a set of pure functions merging the heterogeneous, optional,
///   partially-overlapping telemetry sources into one `Metrics` value: raw data preserved
///   verbatim plus a typed summary (throughput, events, timing, resources, efficiency, fine
///   CPU/I-O breakdown, chunk and section statistics).  Quantities whose telemetry source was
///   absent are None, never zero-filled, and derived ratios never divide by zero.
///
/// - *Export* persists a measurement as a directory of JSON files; *prsummary* renders the
///   summary as fixed-width, csv or json tables.
mod aggregate;
mod backend;
mod chunks;
mod collector;
mod efficiency;
mod export;
mod fine;
mod format;
mod metrics;
mod procmem;
mod prsummary;
mod workers;
mod workflow;

// The seam to the host framework: sampling and span hooks.

pub use backend::MetricsBackend;
pub use backend::SchedulerHook;

// The collector bracketing one monitored run.

pub use collector::ChunkMeta;
pub use collector::CollectorOptions;
pub use collector::MetricsCollector;

// The aggregated result and its summary sections.

pub use metrics::ChunkSummary;
pub use metrics::EfficiencySummary;
pub use metrics::EventSummary;
pub use metrics::FineSummary;
pub use metrics::Metrics;
pub use metrics::RawData;
pub use metrics::ResourceSummary;
pub use metrics::SectionSummary;
pub use metrics::Summary;
pub use metrics::ThroughputSummary;
pub use metrics::TimingSummary;

// The combining aggregator, for driving the pipeline without a collector.

pub use aggregate::AggregationInputs;
pub use aggregate::MetricsAggregator;

// The individual aggregation stages, for reanalysis of saved raw telemetry.

pub use chunks::aggregate_chunk_metrics;
pub use chunks::aggregate_section_metrics;
pub use efficiency::calculate_efficiency_metrics;
pub use efficiency::EfficiencyMetrics;
pub use fine::compression_from_spans;
pub use fine::parse_fine_metrics;
pub use workers::parse_tracking_data;
pub use workflow::aggregate_workflow_metrics;
pub use workflow::WorkflowMetrics;

// Measurement persistence.

pub use export::load_measurement;
pub use export::save_measurement;
pub use export::MEASUREMENT_FORMAT;

// Summary rendering and its value helpers.

pub use prsummary::format_bytes;
pub use prsummary::format_count;
pub use prsummary::format_duration;
pub use prsummary::print_summary;

// The process-memory probe used by the instrumentation wrappers.

pub use procmem::process_rss_mb;
