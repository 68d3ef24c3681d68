/// Process-memory probe for the instrumentation wrappers.
///
/// Reads the resident set size of the current process.  Only implemented for Linux, where the
/// batch workers run; elsewhere the probe reports None and the instrumentation records zeros.
use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(target_os = "linux")] {
        /// Current RSS in MiB, None if /proc is unreadable.
        pub fn process_rss_mb() -> Option<f64> {
            let status = std::fs::read_to_string("/proc/self/status").ok()?;
            for line in status.lines() {
                if let Some(rest) = line.strip_prefix("VmRSS:") {
                    let kb = rest.trim_end_matches("kB").trim().parse::<f64>().ok()?;
                    return Some(kb / 1024.0);
                }
            }
            None
        }
    } else {
        /// Current RSS in MiB; not available on this platform.
        pub fn process_rss_mb() -> Option<f64> {
            None
        }
    }
}

#[cfg(target_os = "linux")]
#[test]
fn test_probe_reports_positive_rss() {
    let rss = process_rss_mb().unwrap();
    assert!(rss > 0.0);
}
