/// Workflow throughput reports.
///
/// At the end of a run the host framework hands over a job-level report with the totals it
/// counted while executing: bytes fetched from storage (compressed, as stored), events
/// processed, aggregate CPU seconds across all tasks, and the number of chunks.  Optionally it
/// also provides a per-dataset breakdown of the same counters; when present, the breakdown is
/// the authoritative source for the totals.
use std::collections::HashMap;
use ustr::Ustr;

#[derive(Debug, Clone, Default)]
pub struct WorkflowReport {
    /// Bytes read from storage, as stored (compressed).
    pub bytes_read: u64,
    /// Events processed.
    pub entries: u64,
    /// Aggregate CPU seconds summed across all task invocations.
    pub process_time: f64,
    /// Number of chunks processed.
    pub chunks: u64,
}

/// Per-dataset counters.  `duration` is the dataset's share of aggregate CPU seconds.
#[derive(Debug, Clone, Default)]
pub struct DatasetReport {
    pub entries: u64,
    pub duration: f64,
    pub bytes_read: u64,
}

pub type DatasetReports = HashMap<Ustr, DatasetReport>;
