/// Statistics over instrumented chunks and sections.
use crate::metrics::{ChunkSummary, SectionSummary};

use flowlog::{ChunkRecord, SectionRecord};
use itertools::Itertools;
use ustr::Ustr;

/// Duration/event/byte/memory statistics across all recorded chunks, None when there are none.

pub fn aggregate_chunk_metrics(chunks: &[ChunkRecord]) -> Option<ChunkSummary> {
    if chunks.is_empty() {
        return None;
    }
    let count = chunks.len() as u64;
    let mut duration_min = f64::INFINITY;
    let mut duration_max = f64::NEG_INFINITY;
    let mut duration_sum = 0.0;
    let mut events_total = 0u64;
    let mut bytes_read_total = 0u64;
    let mut mem_delta_sum = 0.0;
    let mut mem_delta_max = f64::NEG_INFINITY;
    for c in chunks {
        duration_min = f64::min(duration_min, c.duration);
        duration_max = f64::max(duration_max, c.duration);
        duration_sum += c.duration;
        events_total += c.num_events;
        bytes_read_total += c.bytes_read;
        mem_delta_sum += c.mem_delta_mb;
        mem_delta_max = f64::max(mem_delta_max, c.mem_delta_mb);
    }
    Some(ChunkSummary {
        count,
        duration_min,
        duration_avg: duration_sum / count as f64,
        duration_max,
        events_total,
        events_per_chunk_avg: events_total as f64 / count as f64,
        bytes_read_total,
        mem_delta_mb_avg: mem_delta_sum / count as f64,
        mem_delta_mb_max: mem_delta_max,
    })
}

/// Roll sections up by name, ordered by first appearance in the record stream.

pub fn aggregate_section_metrics(sections: &[SectionRecord]) -> Vec<SectionSummary> {
    let mut order: Vec<Ustr> = vec![];
    for s in sections {
        if !order.contains(&s.name) {
            order.push(s.name);
        }
    }
    let by_name = sections.iter().into_group_map_by(|s| s.name);
    order
        .iter()
        .map(|name| {
            let group = &by_name[name];
            let total: f64 = group.iter().map(|s| s.duration).sum();
            SectionSummary {
                name: name.to_string(),
                count: group.len() as u64,
                total_seconds: total,
                avg_seconds: total / group.len() as f64,
            }
        })
        .collect()
}

#[cfg(test)]
use flowlog::SectionKind;

#[cfg(test)]
fn chunk(duration: f64, events: u64, bytes: u64, mem_delta: f64) -> ChunkRecord {
    ChunkRecord {
        t_start: 0.0,
        t_end: duration,
        duration,
        num_events: events,
        bytes_read: bytes,
        mem_delta_mb: mem_delta,
        ..Default::default()
    }
}

#[cfg(test)]
fn section(name: &str, duration: f64) -> SectionRecord {
    SectionRecord {
        name: Ustr::from(name),
        kind: SectionKind::Time,
        t_start: 0.0,
        t_end: duration,
        duration,
        mem_before_mb: None,
        mem_after_mb: None,
        mem_delta_mb: None,
        metadata: vec![],
    }
}

#[test]
fn test_empty_chunks_is_none() {
    assert!(aggregate_chunk_metrics(&[]).is_none());
}

#[test]
fn test_chunk_statistics() {
    let chunks = vec![
        chunk(10.0, 1000, 4000, 12.0),
        chunk(6.0, 1500, 6000, 4.0),
    ];
    let s = aggregate_chunk_metrics(&chunks).unwrap();
    assert!(s.count == 2);
    assert!(s.duration_min == 6.0);
    assert!(s.duration_max == 10.0);
    assert!(s.duration_avg == 8.0);
    assert!(s.events_total == 2500);
    assert!(s.events_per_chunk_avg == 1250.0);
    assert!(s.bytes_read_total == 10_000);
    assert!(s.mem_delta_mb_avg == 8.0);
    assert!(s.mem_delta_mb_max == 12.0);
}

#[test]
fn test_single_chunk() {
    let s = aggregate_chunk_metrics(&[chunk(3.0, 10, 100, 0.0)]).unwrap();
    assert!(s.duration_min == 3.0 && s.duration_avg == 3.0 && s.duration_max == 3.0);
}

#[test]
fn test_section_rollup_keeps_first_appearance_order() {
    let sections = vec![
        section("jet_selection", 5.0),
        section("histogram_fill", 3.0),
        section("jet_selection", 7.0),
    ];
    let s = aggregate_section_metrics(&sections);
    assert!(s.len() == 2);
    assert!(s[0].name == "jet_selection");
    assert!(s[0].count == 2);
    assert!(s[0].total_seconds == 12.0);
    assert!(s[0].avg_seconds == 6.0);
    assert!(s[1].name == "histogram_fill");
    assert!(s[1].count == 1);
    assert!(s[1].total_seconds == 3.0);
}

#[test]
fn test_no_sections() {
    assert!(aggregate_section_metrics(&[]).is_empty());
}
