// crates/genloss-core/src/helpers/time.rs
//
// Human-readable durations for log lines and CLI output.

/// Format a duration in seconds as a compact human-readable string.
///
/// | Range         | Format       | Example   |
/// |---------------|--------------|-----------|
/// | ≥ 3600 s      | `H:MM:SS`    | `1:04:35` |
/// | ≥ 60 s        | `M:SS`       | `3:07`    |
/// | < 60 s        | `S.Xs`       | `4.2s`    |
///
/// ```
/// use genloss_core::helpers::time::format_duration;
/// assert_eq!(format_duration(4.2),    "4.2s");
/// assert_eq!(format_duration(187.0),  "3:07");
/// assert_eq!(format_duration(3875.0), "1:04:35");
/// ```
pub fn format_duration(secs: f64) -> String {
    let secs = secs.max(0.0);
    if secs >= 3600.0 {
        format!(
            "{}:{:02}:{:02}",
            secs as u64 / 3600,
            (secs as u64 % 3600) / 60,
            secs as u64 % 60,
        )
    } else if secs >= 60.0 {
        format!("{}:{:02}", secs as u64 / 60, secs as u64 % 60)
    } else {
        format!("{secs:.1}s")
    }
}

/// Whole seconds → sample count at `rate`, rounded down.
pub fn secs_to_samples(secs: f64, rate: u32) -> usize {
    if secs <= 0.0 { 0 } else { (secs * rate as f64) as usize }
}
