//! Playhead formatting and parsing.
//!
//! Positions are carried as `f64` seconds everywhere in the crate; these
//! helpers only convert them for log lines and for user input such as
//! `--seek 01:02:03.5`.

use crate::errors::ControlError;

/// Formats a playhead as `HH:MM:SS`, rounding down to the second.
///
/// Negative and non-finite values are shown as `00:00:00`.
pub fn format_playhead(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// `position / duration`, with `--:--:--` for an unknown duration.
pub fn format_progress(position_seconds: f64, duration_seconds: Option<f64>) -> String {
    let duration = match duration_seconds {
        Some(d) if d.is_finite() && d >= 0.0 => format_playhead(d),
        _ => "--:--:--".to_string(),
    };
    format!("{} / {}", format_playhead(position_seconds), duration)
}

/// Parses `HH:MM:SS`, `MM:SS` or `SS`, the last component may carry a
/// fractional part (`01:02.250`).
pub fn parse_playhead(input: &str) -> Result<f64, ControlError> {
    let input = input.trim();
    let parts: Vec<&str> = input.split(':').collect();

    if input.is_empty() || parts.len() > 3 {
        return Err(ControlError::InvalidTime(format!(
            "'{}': expected HH:MM:SS, MM:SS or SS",
            input
        )));
    }

    let (last, leading) = parts.split_last().ok_or_else(|| {
        ControlError::InvalidTime(format!("'{}': empty time string", input))
    })?;

    let mut total = 0u64;
    for (i, part) in leading.iter().enumerate() {
        let value = part.parse::<u64>().map_err(|_| {
            ControlError::InvalidTime(format!("invalid component '{}' in '{}'", part, input))
        })?;
        if i > 0 && value >= 60 {
            return Err(ControlError::InvalidTime(format!(
                "'{}': minutes must be < 60",
                input
            )));
        }
        total = total
            .checked_mul(60)
            .and_then(|t| t.checked_add(value))
            .ok_or_else(|| ControlError::InvalidTime(format!("'{}': value too large", input)))?;
    }

    let seconds = last.parse::<f64>().map_err(|_| {
        ControlError::InvalidTime(format!("invalid seconds '{}' in '{}'", last, input))
    })?;
    if !seconds.is_finite() || seconds < 0.0 || (!leading.is_empty() && seconds >= 60.0) {
        return Err(ControlError::InvalidTime(format!(
            "'{}': seconds out of range",
            input
        )));
    }

    Ok(total as f64 * 60.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_playhead() {
        assert_eq!(format_playhead(0.0), "00:00:00");
        assert_eq!(format_playhead(61.9), "00:01:01");
        assert_eq!(format_playhead(3661.0), "01:01:01");
        assert_eq!(format_playhead(-5.0), "00:00:00");
        assert_eq!(format_playhead(f64::NAN), "00:00:00");
    }

    #[test]
    fn test_format_progress() {
        assert_eq!(format_progress(12.0, Some(888.0)), "00:00:12 / 00:14:48");
        assert_eq!(format_progress(12.0, None), "00:00:12 / --:--:--");
    }

    #[test]
    fn test_parse_playhead() {
        assert_eq!(parse_playhead("01:02:03").unwrap(), 3723.0);
        assert_eq!(parse_playhead("02:03").unwrap(), 123.0);
        assert_eq!(parse_playhead("42").unwrap(), 42.0);
        assert_eq!(parse_playhead(" 00:01.5 ").unwrap(), 1.5);
        assert_eq!(parse_playhead("90").unwrap(), 90.0);

        assert!(parse_playhead("").is_err());
        assert!(parse_playhead("1:2:3:4").is_err());
        assert!(parse_playhead("abc").is_err());
        assert!(parse_playhead("00:61").is_err());
        assert!(parse_playhead("00:61:00").is_err());
        assert!(parse_playhead("01:61:00").is_err());
        assert!(parse_playhead("00:00:60").is_err());
        assert!(parse_playhead("-3").is_err());
    }

    #[test]
    fn test_parse_playhead_overflow() {
        let err = parse_playhead("18446744073709551615:00:00").unwrap_err();
        assert!(matches!(err, ControlError::InvalidTime(_)));
        assert_eq!(parse_playhead("1000:00:00").unwrap(), 3_600_000.0);
    }
}
