// Duration formatting for stage dwell times

/// Format seconds as a compact duration, e.g. `2d3h`, `4h12m`, `35s`
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if days > 0 {
        format!("{}d{}h", days, hours)
    } else if hours > 0 {
        format!("{}h{}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(35), "35s");
        assert_eq!(format_duration(600), "10m0s");
        assert_eq!(format_duration(5400), "1h30m");
        assert_eq!(format_duration(2 * 86400 + 3 * 3600 + 59), "2d3h");
        assert_eq!(format_duration(-5), "0s");
    }
}
