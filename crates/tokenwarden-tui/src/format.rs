use chrono::{DateTime, Local, Utc};

/// Local wall-clock time, e.g. "14:05:09"
pub fn clock_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

/// Optional timestamp, with a placeholder when unknown
pub fn optional_time(at: Option<DateTime<Utc>>) -> String {
    at.map(clock_time).unwrap_or_else(|| "-".to_string())
}

/// Human-readable span until `at`, e.g. "4m 05s" or "overdue"
pub fn countdown(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (at - now).num_seconds();
    if secs <= 0 {
        return "overdue".to_string();
    }
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_countdown() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(countdown(now + Duration::seconds(45), now), "45s");
        assert_eq!(countdown(now + Duration::seconds(245), now), "4m 05s");
        assert_eq!(countdown(now + Duration::seconds(3900), now), "1h 05m");
        assert_eq!(countdown(now, now), "overdue");
        assert_eq!(countdown(now - Duration::seconds(10), now), "overdue");
    }

    #[test]
    fn test_optional_time_placeholder() {
        assert_eq!(optional_time(None), "-");
        assert_eq!(optional_time(Some(Utc::now())).len(), 8);
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("Hello", 10), "Hello");
        assert_eq!(truncate_string("Hello World", 8), "Hello...");
        assert_eq!(truncate_string("Hi", 2), "Hi");
    }
}
