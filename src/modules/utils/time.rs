use chrono::{DateTime, Utc};

/// Format a timestamp for CLI listings
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Format an age in seconds as a coarse human readable string
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    if seconds < 60 {
        format!("{} seconds", seconds)
    } else if seconds < 3600 {
        format!("{} minutes", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hours", seconds / 3600)
    } else {
        format!("{} days", seconds / 86400)
    }
}

/// How long ago `timestamp` was
pub fn format_age(timestamp: &DateTime<Utc>) -> String {
    format_duration((Utc::now() - *timestamp).num_seconds())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_timestamp_formatting() {
        let timestamp = Utc.timestamp_opt(1609459200, 0).unwrap(); // 2021-01-01 00:00:00
        assert_eq!(format_timestamp(&timestamp), "2021-01-01 00:00:00");
    }

    #[test]
    fn test_duration_formatting() {
        assert_eq!(format_duration(30), "30 seconds");
        assert_eq!(format_duration(90), "1 minutes");
        assert_eq!(format_duration(3600), "1 hours");
        assert_eq!(format_duration(86400), "1 days");
        assert_eq!(format_duration(-5), "0 seconds");
    }

    #[test]
    fn test_age() {
        let two_hours_ago = Utc::now() - Duration::hours(2);
        assert_eq!(format_age(&two_hours_ago), "2 hours");
    }
}
