//! Parsing of moderator-supplied sanction durations like "1d12h" or "30m"

use chrono::Duration;
use regex::Regex;

/// Parse a compact duration string into a `Duration`.
///
/// Accepts any combination of `d`, `h`, `m`, `s` segments; returns `None`
/// when no segment matches or the total is zero.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let re = Regex::new(r"(\d+)([dhms])").ok()?;
    let mut total_seconds = 0i64;
    let mut found = false;

    for cap in re.captures_iter(s) {
        found = true;
        let value: i64 = cap[1].parse().ok()?;
        let unit = &cap[2];

        total_seconds += match unit {
            "d" => value * 24 * 3600,
            "h" => value * 3600,
            "m" => value * 60,
            "s" => value,
            _ => 0,
        };
    }

    if found && total_seconds > 0 {
        Some(Duration::seconds(total_seconds))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10m30s"), Some(Duration::seconds(630)));
        assert_eq!(parse_duration("1h30m"), Some(Duration::seconds(5400)));
        assert_eq!(parse_duration("1d"), Some(Duration::seconds(86400)));
        assert_eq!(parse_duration("invalid"), None);
    }

    #[test]
    fn test_zero_duration_is_rejected() {
        assert_eq!(parse_duration("0s"), None);
        assert_eq!(parse_duration("0m0s"), None);
    }

    #[test]
    fn test_segments_in_any_order() {
        assert_eq!(parse_duration("30m1h"), Some(Duration::seconds(5400)));
    }
}
