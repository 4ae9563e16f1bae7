use std::str::FromStr;
use tokio::time::Duration;

/// Parses a duration string in the format "250ms", "30s", "10m", "5h", "3d".
///
/// Supported units:
/// - `ns` for nanoseconds
/// - `us` for microseconds
/// - `ms` for milliseconds
/// - `s` for seconds
/// - `m` for minutes
/// - `h` for hours
/// - `d` for days
pub fn parse_duration_string(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration string cannot be empty".to_string());
    }

    let split_at = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (value_str, unit) = s.split_at(split_at);

    let value = match u64::from_str(value_str) {
        Ok(v) => v,
        Err(_) => {
            return Err(format!(
                "Invalid numeric value in duration: '{}'",
                value_str
            ))
        }
    };

    let overflow = || format!("Duration '{}' is too large", s);

    match unit {
        "ns" => Ok(Duration::from_nanos(value)),
        "us" => Ok(Duration::from_micros(value)),
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => value
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(overflow),
        "h" => value
            .checked_mul(60 * 60)
            .map(Duration::from_secs)
            .ok_or_else(overflow),
        "d" => value
            .checked_mul(24 * 60 * 60)
            .map(Duration::from_secs)
            .ok_or_else(overflow),
        "" => Err(format!(
            "Missing duration unit in '{}'. Use 'ns', 'us', 'ms', 's', 'm', 'h', or 'd'.",
            s
        )),
        _ => Err(format!(
            "Unknown duration unit: '{}'. Use 'ns', 'us', 'ms', 's', 'm', 'h', or 'd'.",
            unit
        )),
    }
}

/// Formats a duration using the largest unit that represents it exactly,
/// so that `parse_duration_string(&format_duration(d)) == d`.
pub fn format_duration(d: Duration) -> String {
    const UNITS: [(&str, u128); 7] = [
        ("d", 86_400_000_000_000),
        ("h", 3_600_000_000_000),
        ("m", 60_000_000_000),
        ("s", 1_000_000_000),
        ("ms", 1_000_000),
        ("us", 1_000),
        ("ns", 1),
    ];

    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }

    for (unit, size) in UNITS {
        if nanos % size == 0 {
            return format!("{}{}", nanos / size, unit);
        }
    }

    format!("{}ns", nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    mod duration {
        use super::*;

        #[test]
        fn parse_milliseconds() {
            assert_eq!(
                parse_duration_string("10ms").unwrap(),
                Duration::from_millis(10)
            );
        }

        #[test]
        fn parse_micro_and_nano() {
            assert_eq!(
                parse_duration_string("250us").unwrap(),
                Duration::from_micros(250)
            );
            assert_eq!(
                parse_duration_string("7ns").unwrap(),
                Duration::from_nanos(7)
            );
        }

        #[test]
        fn parse_seconds() {
            assert_eq!(
                parse_duration_string("30s").unwrap(),
                Duration::from_secs(30)
            );
        }

        #[test]
        fn parse_minutes() {
            assert_eq!(
                parse_duration_string("10m").unwrap(),
                Duration::from_secs(600)
            );
        }

        #[test]
        fn parse_hours_and_days() {
            assert_eq!(
                parse_duration_string("5h").unwrap(),
                Duration::from_secs(18000)
            );
            assert_eq!(
                parse_duration_string("3d").unwrap(),
                Duration::from_secs(259200)
            );
        }

        #[test]
        fn parse_zero() {
            assert_eq!(parse_duration_string("0ms").unwrap(), Duration::ZERO);
        }

        #[test]
        fn trims_whitespace() {
            assert_eq!(
                parse_duration_string("  1s  ").unwrap(),
                Duration::from_secs(1)
            );
        }

        #[test]
        fn empty_string_errors() {
            let err = parse_duration_string("   ").unwrap_err();
            assert!(err.contains("empty"), "error was: {}", err);
        }

        #[test]
        fn no_suffix_errors() {
            let err = parse_duration_string("10").unwrap_err();
            assert!(err.contains("Missing duration unit"), "error was: {}", err);
        }

        #[test]
        fn unknown_suffix_errors() {
            let err = parse_duration_string("10x").unwrap_err();
            assert!(err.contains("Unknown duration unit"), "error was: {}", err);
        }

        #[test]
        fn no_number_errors() {
            let err = parse_duration_string("ms").unwrap_err();
            assert!(err.contains("Invalid numeric"), "error was: {}", err);
        }

        #[test]
        fn fractional_and_negative_error() {
            assert!(parse_duration_string("1.5s").is_err());
            let err = parse_duration_string("-5ms").unwrap_err();
            assert!(err.contains("Invalid numeric"), "error was: {}", err);
        }

        #[test]
        fn huge_day_count_overflows() {
            let err = parse_duration_string(&format!("{}d", u64::MAX)).unwrap_err();
            assert!(err.contains("too large"), "error was: {}", err);
        }
    }

    mod format {
        use super::*;

        #[test]
        fn picks_largest_exact_unit() {
            assert_eq!(format_duration(Duration::from_millis(10)), "10ms");
            assert_eq!(format_duration(Duration::from_secs(1)), "1s");
            assert_eq!(format_duration(Duration::from_secs(90)), "90s");
            assert_eq!(format_duration(Duration::from_secs(120)), "2m");
            assert_eq!(format_duration(Duration::from_micros(1500)), "1500us");
            assert_eq!(format_duration(Duration::ZERO), "0s");
        }

        #[test]
        fn formatted_output_parses_back() {
            for d in [
                Duration::from_nanos(3),
                Duration::from_millis(250),
                Duration::from_secs(3600),
            ] {
                assert_eq!(parse_duration_string(&format_duration(d)).unwrap(), d);
            }
        }
    }
}
