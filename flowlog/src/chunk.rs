/// Per-chunk and per-section instrumentation records.
///
/// A chunk is one task invocation over a contiguous slice of an input file.  Chunk records come
/// from instrumentation wrapped around the task body and carry timing, throughput and
/// process-memory readings.  Section records come from instrumentation wrapped around arbitrary
/// named regions inside the task body.
///
/// Times are seconds on the collecting run's clock (shared with the run's start/end times), not
/// wall-clock timestamps.
use std::collections::HashMap;
use ustr::Ustr;

/// One instrumented task invocation.
///
/// `dataset`, `file` and the entry range are None when the host framework did not provide chunk
/// provenance.  Memory readings are MiB and zero when the process-memory probe is unavailable.
#[derive(Debug, Clone, Default)]
pub struct ChunkRecord {
    pub dataset: Option<Ustr>,
    pub file: Option<Ustr>,
    pub entry_start: Option<u64>,
    pub entry_stop: Option<u64>,
    pub t_start: f64,
    pub t_end: f64,
    pub duration: f64,
    pub num_events: u64,
    pub bytes_read: u64,
    pub mem_before_mb: f64,
    pub mem_after_mb: f64,
    pub mem_delta_mb: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Time,
    Memory,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Time => "time",
            SectionKind::Memory => "memory",
        }
    }
}

/// One instrumented named region.  The memory triple is present for `Memory` sections only.
#[derive(Debug, Clone)]
pub struct SectionRecord {
    pub name: Ustr,
    pub kind: SectionKind,
    pub t_start: f64,
    pub t_end: f64,
    pub duration: f64,
    pub mem_before_mb: Option<f64>,
    pub mem_after_mb: Option<f64>,
    pub mem_delta_mb: Option<f64>,
    pub metadata: Vec<(String, String)>,
}

/// Chunk timing index for throughput analysis: (file, entry_start, entry_stop) ->
/// (t_start, t_end, bytes_read).
pub type ChunkInfo = HashMap<(Ustr, u64, u64), (f64, f64, u64)>;

/// Build the chunk timing index from raw chunk records.
///
/// Records without file/entry provenance cannot be keyed and are skipped.  Later records win on
/// key collision; the host framework retries chunks and the last attempt is the one that counts.

pub fn build_chunk_info(chunks: &[ChunkRecord]) -> ChunkInfo {
    let mut info = ChunkInfo::new();
    for c in chunks {
        let (file, start, stop) = match (c.file, c.entry_start, c.entry_stop) {
            (Some(f), Some(a), Some(b)) => (f, a, b),
            _ => continue,
        };
        info.insert((file, start, stop), (c.t_start, c.t_end, c.bytes_read));
    }
    info
}

#[test]
fn test_build_chunk_info() {
    let chunks = vec![
        ChunkRecord {
            file: Some(Ustr::from("data.root")),
            entry_start: Some(0),
            entry_stop: Some(1000),
            t_start: 1.0,
            t_end: 2.5,
            bytes_read: 50_000,
            ..Default::default()
        },
        // No provenance, skipped.
        ChunkRecord {
            t_start: 2.0,
            t_end: 3.0,
            bytes_read: 10_000,
            ..Default::default()
        },
    ];
    let info = build_chunk_info(&chunks);
    assert!(info.len() == 1);
    let v = info[&(Ustr::from("data.root"), 0, 1000)];
    assert!(v == (1.0, 2.5, 50_000));
}

#[test]
fn test_build_chunk_info_last_attempt_wins() {
    let mk = |t_start: f64, bytes: u64| ChunkRecord {
        file: Some(Ustr::from("f.root")),
        entry_start: Some(0),
        entry_stop: Some(500),
        t_start,
        t_end: t_start + 1.0,
        bytes_read: bytes,
        ..Default::default()
    };
    let info = build_chunk_info(&[mk(1.0, 100), mk(5.0, 200)]);
    assert!(info.len() == 1);
    assert!(info[&(Ustr::from("f.root"), 0, 500)].2 == 200);
}
