/// Fine-grained span metrics.
///
/// A span is a metrics-collection scope provided by the distributed scheduler.  While a span is
/// open, workers report cumulative counters keyed by a four-atom tuple: the activity being
/// measured ("execute", "gather", ...), the task prefix the reading belongs to, the metric name,
/// and the unit.  For example:
///
///   ("execute", "process-abc", "thread-cpu", "seconds") -> 100.0
///
/// Counters are cumulative across all tasks that shared a key, so ingestion adds rather than
/// overwrites.  The atoms repeat across very many keys; they are interned.
use std::collections::HashMap;
use ustr::Ustr;

// Metric names reported by the scheduler that the aggregation layer knows about.

pub const METRIC_THREAD_CPU: &str = "thread-cpu";
pub const METRIC_THREAD_NONCPU: &str = "thread-noncpu";
pub const METRIC_DISK_READ: &str = "disk-read";
pub const METRIC_DISK_WRITE: &str = "disk-write";
pub const METRIC_COMPRESS: &str = "compress";
pub const METRIC_DECOMPRESS: &str = "decompress";
pub const METRIC_SERIALIZE: &str = "serialize";
pub const METRIC_DESERIALIZE: &str = "deserialize";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanMetricKey {
    pub activity: Ustr,
    pub task: Ustr,
    pub metric: Ustr,
    pub unit: Ustr,
}

impl SpanMetricKey {
    pub fn new(activity: &str, task: &str, metric: &str, unit: &str) -> SpanMetricKey {
        SpanMetricKey {
            activity: Ustr::from(activity),
            task: Ustr::from(task),
            metric: Ustr::from(metric),
            unit: Ustr::from(unit),
        }
    }

    /// Key for the common case: an "execute" activity reading in the metric's natural unit.
    pub fn execute(task: &str, metric: &str) -> SpanMetricKey {
        let unit = match metric {
            METRIC_DISK_READ | METRIC_DISK_WRITE => "bytes",
            _ => "seconds",
        };
        SpanMetricKey::new("execute", task, metric, unit)
    }
}

/// The cumulative counters extracted from one span.
#[derive(Debug, Clone, Default)]
pub struct SpanMetrics {
    values: HashMap<SpanMetricKey, f64>,
}

impl SpanMetrics {
    pub fn new() -> SpanMetrics {
        SpanMetrics::default()
    }

    /// Accumulate a reading.  Workers report deltas against the same key over time.
    pub fn add(&mut self, key: SpanMetricKey, value: f64) {
        *self.values.entry(key).or_insert(0.0) += value;
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SpanMetricKey, &f64)> {
        self.values.iter()
    }

    /// Sum of all readings with the given metric name, across activities and tasks.  Missing
    /// metrics sum to zero.
    pub fn sum_metric(&self, metric: &str) -> f64 {
        self.sum_metric_where(metric, |_| true)
    }

    /// As `sum_metric`, restricted to keys accepted by `pred`.
    pub fn sum_metric_where<F>(&self, metric: &str, pred: F) -> f64
    where
        F: Fn(&SpanMetricKey) -> bool,
    {
        self.values
            .iter()
            .filter(|(k, _)| k.metric.as_str() == metric && pred(k))
            .map(|(_, v)| v)
            .sum()
    }

    /// True if any reading with the given metric name is present, regardless of value.
    pub fn has_metric(&self, metric: &str) -> bool {
        self.values.keys().any(|k| k.metric.as_str() == metric)
    }
}

#[test]
fn test_add_accumulates_per_key() {
    let mut spans = SpanMetrics::new();
    let key = SpanMetricKey::execute("process-abc", METRIC_THREAD_CPU);
    spans.add(key, 10.0);
    spans.add(key, 2.5);
    spans.add(SpanMetricKey::execute("other", METRIC_THREAD_CPU), 1.0);
    assert!(spans.len() == 2);
    assert!(spans.sum_metric(METRIC_THREAD_CPU) == 13.5);
}

#[test]
fn test_sum_metric_missing_is_zero() {
    let spans = SpanMetrics::new();
    assert!(spans.sum_metric(METRIC_DISK_READ) == 0.0);
    assert!(!spans.has_metric(METRIC_DISK_READ));
}

#[test]
fn test_sum_metric_where_filters_on_task() {
    let mut spans = SpanMetrics::new();
    spans.add(SpanMetricKey::execute("process-abc", METRIC_THREAD_CPU), 100.0);
    spans.add(SpanMetricKey::execute("shuffle-1", METRIC_THREAD_CPU), 30.0);
    let processor = spans.sum_metric_where(METRIC_THREAD_CPU, |k| k.task.contains("process"));
    assert!(processor == 100.0);
}

#[test]
fn test_execute_key_units() {
    assert!(SpanMetricKey::execute("t", METRIC_DISK_READ).unit.as_str() == "bytes");
    assert!(SpanMetricKey::execute("t", METRIC_COMPRESS).unit.as_str() == "seconds");
}
