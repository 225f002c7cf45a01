use chrono::Utc;

/// RFC3339 timestamp in UTC (for persisted records).
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

/// Milliseconds since the Unix epoch.
pub fn unix_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Truncate to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_chars_respects_code_points() {
        assert_eq!(truncate_chars("привет", 3), "при");
        assert_eq!(truncate_chars("hi", 10), "hi");
        assert_eq!(truncate_chars("", 0), "");
    }
}
