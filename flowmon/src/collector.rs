/// The metrics collector: orchestrates one monitored workflow run.
///
/// The collector brackets the run.  `start` anchors the clock, starts worker tracking and opens
/// the fine-metrics span; `finish` closes both, collects what they produced, and aggregates it
/// together with the workflow report into `Metrics`.  In between, the host framework's hooks
/// reach the backend through `backend_mut`, and the instrumentation wrappers deliver chunk and
/// section records.
///
/// Typical shape of a run:
///
///   let mut collector = MetricsCollector::new(SchedulerHook::new());
///   collector.start()?;
///   // ... execute the workflow; scheduler hooks feed collector.backend_mut() ...
///   collector.set_report(report);
///   collector.finish()?;
///   collector.print_summary(&mut io::stdout().lock(), None)?;
///
/// The run's `t_start`/`t_end` are wall-clock unix seconds, with the end derived from a
/// monotonic anchor so the wall time cannot go backwards.  Chunk and section records carry
/// seconds since `start` on the monotonic clock: small, stable offsets suited to timeline
/// analysis of the run.
use crate::aggregate::{AggregationInputs, MetricsAggregator};
use crate::backend::MetricsBackend;
use crate::export::save_measurement;
use crate::metrics::Metrics;
use crate::procmem::process_rss_mb;
use crate::prsummary::print_summary;

use anyhow::{bail, Result};
use flowlog::{
    unix_seconds, ChunkRecord, DatasetReports, SectionKind, SectionRecord, SpanMetrics,
    TrackingData, WorkflowReport,
};
use log::{debug, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use ustr::Ustr;

pub struct CollectorOptions {
    /// Accumulate worker samples delivered by the scheduler hook.
    pub track_workers: bool,
    /// Name for the fine-metrics span.
    pub span_name: String,
    /// Label identifying the analysis code's own tasks in span keys; enables the
    /// processor-vs-overhead CPU split.
    pub processor_label: Option<String>,
}

impl Default for CollectorOptions {
    fn default() -> CollectorOptions {
        CollectorOptions {
            track_workers: true,
            span_name: "workflow-processing".to_string(),
            processor_label: None,
        }
    }
}

/// Provenance for one instrumented chunk, supplied by the caller of `track_chunk`.
#[derive(Debug, Clone, Default)]
pub struct ChunkMeta {
    pub dataset: Option<Ustr>,
    pub file: Option<Ustr>,
    pub entry_start: Option<u64>,
    pub entry_stop: Option<u64>,
    pub num_events: u64,
    pub bytes_read: u64,
}

pub struct MetricsCollector<B: MetricsBackend> {
    backend: B,
    options: CollectorOptions,
    anchor: Option<Instant>,
    t_start: Option<f64>,
    t_end: Option<f64>,
    span_open: bool,
    report: Option<WorkflowReport>,
    datasets: Option<DatasetReports>,
    tracking: Option<TrackingData>,
    span_metrics: Option<SpanMetrics>,
    chunks: Vec<ChunkRecord>,
    sections: Vec<SectionRecord>,
    metrics: Option<Metrics>,
}

impl<B: MetricsBackend> MetricsCollector<B> {
    pub fn new(backend: B) -> MetricsCollector<B> {
        MetricsCollector::with_options(backend, CollectorOptions::default())
    }

    pub fn with_options(backend: B, options: CollectorOptions) -> MetricsCollector<B> {
        MetricsCollector {
            backend,
            options,
            anchor: None,
            t_start: None,
            t_end: None,
            span_open: false,
            report: None,
            datasets: None,
            tracking: None,
            span_metrics: None,
            chunks: vec![],
            sections: vec![],
            metrics: None,
        }
    }

    /// The backend, for wiring up the host framework's sampling and span hooks.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Begin the run: anchor the clock, start tracking, open the span.
    pub fn start(&mut self) -> Result<()> {
        if self.anchor.is_some() {
            bail!("Collector already started");
        }
        self.anchor = Some(Instant::now());
        self.t_start = Some(unix_seconds(flowlog::now()));

        if self.options.track_workers {
            self.backend.start_tracking()?;
        }
        if self.backend.supports_fine_metrics() {
            self.backend.open_span(&self.options.span_name)?;
            self.span_open = true;
        }
        debug!("collection started");
        Ok(())
    }

    /// Seconds since `start` on the monotonic clock.
    pub fn elapsed(&self) -> Option<f64> {
        self.anchor.map(|a| a.elapsed().as_secs_f64())
    }

    /// Hand over the job-level throughput report.
    pub fn set_report(&mut self, report: WorkflowReport) {
        self.report = Some(report);
    }

    /// Optional per-dataset breakdown; when set it overrides the report's totals.
    pub fn set_dataset_reports(&mut self, datasets: DatasetReports) {
        self.datasets = Some(datasets);
    }

    pub fn record_chunk(&mut self, chunk: ChunkRecord) {
        self.chunks.push(chunk);
    }

    pub fn record_section(&mut self, section: SectionRecord) {
        self.sections.push(section);
    }

    /// Instrument one chunk-processing closure: timing, RSS delta and the caller's provenance.
    ///
    /// Before `start` the closure runs uninstrumented; the original records nothing when no
    /// collection is active, and so does this.
    pub fn track_chunk<T, F>(&mut self, meta: ChunkMeta, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let anchor = match self.anchor {
            Some(a) => a,
            None => {
                debug!("chunk instrumentation outside a collection run, not recording");
                return f();
            }
        };
        let mem_before = process_rss_mb().unwrap_or(0.0);
        let t_start = anchor.elapsed().as_secs_f64();
        let result = f();
        let t_end = anchor.elapsed().as_secs_f64();
        let mem_after = process_rss_mb().unwrap_or(0.0);
        self.chunks.push(ChunkRecord {
            dataset: meta.dataset,
            file: meta.file,
            entry_start: meta.entry_start,
            entry_stop: meta.entry_stop,
            t_start,
            t_end,
            duration: t_end - t_start,
            num_events: meta.num_events,
            bytes_read: meta.bytes_read,
            mem_before_mb: mem_before,
            mem_after_mb: mem_after,
            mem_delta_mb: mem_after - mem_before,
        });
        result
    }

    /// Instrument a named region's wall time.
    pub fn time_section<T, F>(&mut self, name: &str, metadata: &[(&str, &str)], f: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.section(name, SectionKind::Time, metadata, f)
    }

    /// Instrument a named region's wall time and RSS delta.
    pub fn memory_section<T, F>(&mut self, name: &str, metadata: &[(&str, &str)], f: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.section(name, SectionKind::Memory, metadata, f)
    }

    fn section<T, F>(&mut self, name: &str, kind: SectionKind, metadata: &[(&str, &str)], f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let anchor = match self.anchor {
            Some(a) => a,
            None => {
                debug!("section instrumentation outside a collection run, not recording");
                return f();
            }
        };
        let mem_before = match kind {
            SectionKind::Memory => Some(process_rss_mb().unwrap_or(0.0)),
            SectionKind::Time => None,
        };
        let t_start = anchor.elapsed().as_secs_f64();
        let result = f();
        let t_end = anchor.elapsed().as_secs_f64();
        let mem_after = match kind {
            SectionKind::Memory => Some(process_rss_mb().unwrap_or(0.0)),
            SectionKind::Time => None,
        };
        self.sections.push(SectionRecord {
            name: Ustr::from(name),
            kind,
            t_start,
            t_end,
            duration: t_end - t_start,
            mem_before_mb: mem_before,
            mem_after_mb: mem_after,
            mem_delta_mb: match (mem_before, mem_after) {
                (Some(b), Some(a)) => Some(a - b),
                _ => None,
            },
            metadata: metadata
                .iter()
                .map(|&(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        result
    }

    /// End the run: close the span, stop tracking, aggregate.
    ///
    /// Aggregation needs the workflow report; finishing without one collects and keeps the raw
    /// telemetry but leaves `metrics` unavailable until a report arrives via
    /// `aggregate_with_report`.
    pub fn finish(&mut self) -> Result<()> {
        let anchor = match self.anchor {
            Some(a) => a,
            None => bail!("Collector finished before it was started"),
        };
        if self.t_end.is_some() {
            bail!("Collector already finished");
        }
        let t_start = self.t_start.unwrap_or(0.0);
        self.t_end = Some(t_start + anchor.elapsed().as_secs_f64());

        if self.span_open {
            self.span_metrics = self.backend.close_span();
            self.span_open = false;
        }
        if self.options.track_workers {
            self.tracking = self.backend.stop_tracking();
        }
        debug!("collection finished");

        if self.report.is_some() {
            self.aggregate()?;
        } else {
            warn!("no workflow report was set; metrics remain unaggregated");
        }
        Ok(())
    }

    fn aggregate(&mut self) -> Result<()> {
        let (t_start, t_end) = match (self.t_start, self.t_end) {
            (Some(a), Some(b)) => (a, b),
            _ => bail!("Timing not available - finish the collection run first"),
        };
        let report = match self.report.clone() {
            Some(r) => r,
            None => bail!("Workflow report not set - call set_report() first"),
        };
        if self.span_metrics.as_ref().is_some_and(|s| !s.is_empty())
            && self.options.processor_label.is_none()
        {
            warn!(
                "fine metrics aggregate over all task activities including framework overhead; \
                 set processor_label to split them"
            );
        }
        let aggregator = MetricsAggregator::new(self.backend.name())?;
        self.metrics = Some(aggregator.aggregate(AggregationInputs {
            report,
            datasets: self.datasets.clone(),
            tracking: self.tracking.take(),
            spans: self.span_metrics.take(),
            chunks: std::mem::take(&mut self.chunks),
            sections: std::mem::take(&mut self.sections),
            t_start,
            t_end,
            processor_label: self.options.processor_label.clone(),
        }));
        Ok(())
    }

    /// Set the report after the fact and aggregate.  For hosts that produce the report only
    /// once the run is already finished.
    pub fn aggregate_with_report(&mut self, report: WorkflowReport) -> Result<()> {
        self.report = Some(report);
        self.aggregate()
    }

    /// The aggregated metrics.  An error before `finish` has aggregated them.
    pub fn metrics(&self) -> Result<&Metrics> {
        match self.metrics.as_ref() {
            Some(m) => Ok(m),
            None => bail!("Metrics not aggregated - finish the collection run first"),
        }
    }

    pub fn take_metrics(&mut self) -> Result<Metrics> {
        match self.metrics.take() {
            Some(m) => Ok(m),
            None => bail!("Metrics not aggregated - finish the collection run first"),
        }
    }

    /// Save the aggregated metrics as a measurement directory.
    pub fn save_measurement(&self, output_dir: &Path, name: Option<&str>) -> Result<PathBuf> {
        let metrics = self.metrics()?;
        let (t0, t1) = (self.t_start.unwrap_or(0.0), self.t_end.unwrap_or(0.0));
        save_measurement(metrics, t0, t1, output_dir, name, None)
    }

    /// Render the summary tables.  `fmt` selects fields/modes as in `format::parse_fields`.
    pub fn print_summary(&self, output: &mut dyn io::Write, fmt: Option<&str>) -> Result<()> {
        print_summary(output, &self.metrics()?.summary, fmt)
    }
}

#[cfg(test)]
use crate::backend::SchedulerHook;

#[cfg(test)]
fn sample_report() -> WorkflowReport {
    WorkflowReport {
        bytes_read: 1_000_000,
        entries: 10_000,
        process_time: 2.0,
        chunks: 4,
    }
}

#[test]
fn test_lifecycle_misuse_is_an_error() {
    let mut collector = MetricsCollector::new(SchedulerHook::new());
    assert!(collector.finish().is_err());
    assert!(collector.metrics().is_err());
    collector.start().unwrap();
    assert!(collector.start().is_err());
    collector.set_report(sample_report());
    collector.finish().unwrap();
    assert!(collector.finish().is_err());
    assert!(collector.metrics().is_ok());
}

#[test]
fn test_instrumentation_outside_run_records_nothing() {
    let mut collector = MetricsCollector::new(SchedulerHook::new());
    let r = collector.track_chunk(ChunkMeta::default(), || 41 + 1);
    assert!(r == 42);
    let r = collector.time_section("setup", &[], || "ok");
    assert!(r == "ok");
    assert!(collector.chunks.is_empty());
    assert!(collector.sections.is_empty());
}

#[test]
fn test_full_run_aggregates_instrumentation() {
    use flowlog::{ClusterSnapshot, WorkerState};

    let mut collector = MetricsCollector::new(SchedulerHook::new());
    collector.start().unwrap();

    // The host framework's sampling hook.
    for i in 0..2 {
        let snap = ClusterSnapshot {
            timestamp: flowlog::now() + chrono::Duration::seconds(i),
            workers: vec![WorkerState {
                id: Ustr::from("w1"),
                memory_bytes: 1e9,
                memory_limit_bytes: 4e9,
                active_tasks: 1,
                cores: 4,
            }],
        };
        collector.backend_mut().record_snapshot(&snap);
    }

    let meta = ChunkMeta {
        dataset: Some(Ustr::from("ttbar")),
        num_events: 5000,
        bytes_read: 500_000,
        ..Default::default()
    };
    collector.track_chunk(meta, || {});
    collector.time_section("histogram_fill", &[("step", "1")], || {});

    collector.set_report(sample_report());
    collector.finish().unwrap();

    let metrics = collector.metrics().unwrap();
    assert!(metrics.summary.events.total == 10_000);
    assert!(metrics.summary.resources.workers_peak == Some(1));
    let chunks = metrics.summary.chunks.as_ref().unwrap();
    assert!(chunks.count == 1);
    assert!(chunks.events_total == 5000);
    assert!(metrics.summary.sections.len() == 1);
    assert!(metrics.summary.sections[0].name == "histogram_fill");
    assert!(metrics.raw.workers.as_ref().unwrap().num_samples() == 2);
}

#[test]
fn test_chunk_times_are_run_relative() {
    let mut collector = MetricsCollector::new(SchedulerHook::new());
    collector.start().unwrap();
    collector.track_chunk(ChunkMeta::default(), || {
        std::thread::sleep(std::time::Duration::from_millis(5));
    });
    let chunk = collector.chunks[0].clone();
    assert!(chunk.duration >= 0.005);
    assert!(chunk.t_end > chunk.t_start);
    assert!(chunk.t_start >= 0.0);
    assert!(chunk.t_end <= collector.elapsed().unwrap());
}

#[test]
fn test_report_after_finish() {
    let mut collector = MetricsCollector::new(SchedulerHook::new());
    collector.start().unwrap();
    collector.finish().unwrap();
    // No report yet: raw telemetry is kept, metrics are not available.
    assert!(collector.metrics().is_err());
    collector.aggregate_with_report(sample_report()).unwrap();
    let metrics = collector.metrics().unwrap();
    assert!(metrics.summary.timing.cpu_seconds == 2.0);
}
