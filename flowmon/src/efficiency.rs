/// Efficiency ratios combining workflow and worker metrics.
///
/// Core efficiency is CPU seconds consumed over CPU seconds available (total cores x wall
/// time).  Speedup is aggregate CPU time over wall time - how many cores' worth of work the
/// cluster sustained.  Parallel efficiency normalizes speedup by the time-averaged worker
/// count.  Everything that needs worker data is None without it.
use crate::metrics::{EfficiencySummary, ResourceSummary};
use crate::workflow::WorkflowMetrics;

pub struct EfficiencyMetrics {
    pub summary: EfficiencySummary,
    /// Events per core-second of capacity, reported under the event summary.
    pub rate_core_hz: Option<f64>,
}

pub fn calculate_efficiency_metrics(
    workflow: &WorkflowMetrics,
    resources: &ResourceSummary,
) -> EfficiencyMetrics {
    let wall = workflow.wall_seconds;

    let speedup = if wall > 0.0 {
        Some(workflow.cpu_seconds / wall)
    } else {
        None
    };

    let capacity = match resources.cores_total {
        Some(cores) if cores > 0.0 && wall > 0.0 => Some(cores * wall),
        _ => None,
    };

    let core_efficiency = capacity.map(|cap| workflow.cpu_seconds / cap);
    let rate_core_hz = capacity.map(|cap| workflow.total_events as f64 / cap);

    let parallel_efficiency = match (speedup, resources.workers_avg) {
        (Some(s), Some(w)) if w > 0.0 => Some(s / w),
        _ => None,
    };

    EfficiencyMetrics {
        summary: EfficiencySummary {
            core_efficiency,
            speedup,
            parallel_efficiency,
        },
        rate_core_hz,
    }
}

#[cfg(test)]
fn sample_workflow() -> WorkflowMetrics {
    WorkflowMetrics {
        wall_seconds: 25.0,
        cpu_seconds: 100.0,
        total_events: 500_000,
        ..Default::default()
    }
}

#[cfg(test)]
fn sample_resources() -> ResourceSummary {
    ResourceSummary {
        workers_avg: Some(2.0),
        cores_total: Some(8.0),
        ..Default::default()
    }
}

#[cfg(test)]
fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_ratios_with_worker_data() {
    let e = calculate_efficiency_metrics(&sample_workflow(), &sample_resources());
    // 100 s CPU over 25 s wall on 8 cores.
    assert!(approx(e.summary.speedup.unwrap(), 4.0));
    assert!(approx(e.summary.core_efficiency.unwrap(), 0.5));
    assert!(approx(e.summary.parallel_efficiency.unwrap(), 2.0));
    // 500k events over 200 core-seconds.
    assert!(approx(e.rate_core_hz.unwrap(), 2500.0));
}

#[test]
fn test_without_worker_data() {
    let e = calculate_efficiency_metrics(&sample_workflow(), &ResourceSummary::default());
    assert!(e.summary.speedup == Some(4.0));
    assert!(e.summary.core_efficiency.is_none());
    assert!(e.summary.parallel_efficiency.is_none());
    assert!(e.rate_core_hz.is_none());
}

#[test]
fn test_zero_wall_time() {
    let workflow = WorkflowMetrics {
        wall_seconds: 0.0,
        cpu_seconds: 10.0,
        ..Default::default()
    };
    let e = calculate_efficiency_metrics(&workflow, &sample_resources());
    assert!(e.summary.speedup.is_none());
    assert!(e.summary.core_efficiency.is_none());
    assert!(e.rate_core_hz.is_none());
}
