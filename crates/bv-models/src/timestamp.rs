//! Clock-style formatting of report durations.
//!
//! Report durations and timestamps are shown as `m:ss` (or `h:mm:ss` past
//! one hour) in exported tables and the CLI summary.

use thiserror::Error;

/// Format seconds as `m:ss`, or `h:mm:ss` when at least one hour.
///
/// Fractions are truncated; negative and non-finite inputs format as `0:00`.
///
/// # Examples
/// ```
/// use bv_models::timestamp::format_clock;
/// assert_eq!(format_clock(0.0), "0:00");
/// assert_eq!(format_clock(65.7), "1:05");
/// assert_eq!(format_clock(3725.0), "1:02:05");
/// ```
pub fn format_clock(total_secs: f64) -> String {
    let total = if total_secs.is_finite() && total_secs > 0.0 {
        total_secs.floor() as u64
    } else {
        0
    };

    let hours = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}

/// Parse `ss`, `m:ss` or `h:mm:ss` (seconds may carry a fraction).
pub fn parse_clock(s: &str) -> Result<f64, ClockError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ClockError::Empty);
    }

    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() > 3 {
        return Err(ClockError::InvalidFormat(s.to_string()));
    }

    let mut total = 0.0;
    for (i, part) in parts.iter().enumerate() {
        let value: f64 = part
            .parse()
            .map_err(|_| ClockError::InvalidValue(part.to_string()))?;
        if value < 0.0 || !value.is_finite() {
            return Err(ClockError::Negative);
        }
        // Every component but the first is bounded by its unit
        if i > 0 && value >= 60.0 {
            return Err(ClockError::InvalidValue(part.to_string()));
        }
        total = total * 60.0 + value;
    }

    Ok(total)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClockError {
    #[error("Clock value cannot be empty")]
    Empty,

    #[error("Clock value cannot be negative")]
    Negative,

    #[error("Invalid clock component: {0}")]
    InvalidValue(String),

    #[error("Invalid clock format '{0}'. Use ss, m:ss or h:mm:ss")]
    InvalidFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0.0), "0:00");
        assert_eq!(format_clock(9.9), "0:09");
        assert_eq!(format_clock(90.0), "1:30");
        assert_eq!(format_clock(3599.0), "59:59");
        assert_eq!(format_clock(3600.0), "1:00:00");
        assert_eq!(format_clock(-4.0), "0:00");
        assert_eq!(format_clock(f64::NAN), "0:00");
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(parse_clock("90").unwrap(), 90.0);
        assert_eq!(parse_clock("1:30").unwrap(), 90.0);
        assert_eq!(parse_clock("1:02:05").unwrap(), 3725.0);
        assert!((parse_clock("0:30.5").unwrap() - 30.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_clock_errors() {
        assert_eq!(parse_clock(" "), Err(ClockError::Empty));
        assert!(matches!(parse_clock("1:75"), Err(ClockError::InvalidValue(_))));
        assert!(matches!(parse_clock("x:10"), Err(ClockError::InvalidValue(_))));
        assert!(matches!(parse_clock("1:2:3:4"), Err(ClockError::InvalidFormat(_))));
    }

    #[test]
    fn test_format_parse_agree_on_whole_seconds() {
        for secs in [0.0, 59.0, 61.0, 3600.0, 7322.0] {
            assert_eq!(parse_clock(&format_clock(secs)).unwrap(), secs);
        }
    }
}
