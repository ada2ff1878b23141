//! Storage size normalization.
//!
//! Backends report their footprint in different shapes: raw byte counts, or
//! human-readable strings such as PostgreSQL's `pg_size_pretty` output
//! (`"12 MB"`). Everything is normalized to whole kilobytes using binary
//! (1024) scaling.

use thiserror::Error;

/// Failure to parse a human-readable size string.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SizeParseError {
    /// Not exactly `<number> <unit>`.
    #[error("invalid size format: {0:?}")]
    Format(String),

    /// The numeric token is not a finite, non-negative number.
    #[error("invalid numeric value: {0:?}")]
    Number(String),

    /// Unit other than kb, mb, gb or tb.
    #[error("unknown unit: {0:?}")]
    Unit(String),
}

/// Parse `"<number> <unit>"` into kilobytes.
///
/// Units are `kb`, `mb`, `gb` and `tb`, case-insensitive. Fractions are
/// truncated after scaling, so `"12.5 MB"` is `12800`.
pub fn parse_size_kb(input: &str) -> Result<u64, SizeParseError> {
    let mut parts = input.split_whitespace();
    let (number, unit) = match (parts.next(), parts.next(), parts.next()) {
        (Some(number), Some(unit), None) => (number, unit),
        _ => return Err(SizeParseError::Format(input.to_string())),
    };

    let value: f64 = number
        .parse()
        .map_err(|_| SizeParseError::Number(number.to_string()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(SizeParseError::Number(number.to_string()));
    }

    let factor: f64 = match unit.to_ascii_lowercase().as_str() {
        "kb" => 1.0,
        "mb" => 1024.0,
        "gb" => 1024.0 * 1024.0,
        "tb" => 1024.0 * 1024.0 * 1024.0,
        _ => return Err(SizeParseError::Unit(unit.to_string())),
    };

    Ok((value * factor) as u64)
}

/// Convert a byte count to whole kilobytes. Negative counts clamp to zero.
pub fn bytes_to_kb(bytes: i64) -> u64 {
    (bytes.max(0) / 1024) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_size_kb("12.5 MB"), Ok(12_800));
        assert_eq!(parse_size_kb("1 GB"), Ok(1_048_576));
        assert_eq!(parse_size_kb("500 kb"), Ok(500));
        assert_eq!(parse_size_kb("2 tb"), Ok(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_size_kb("  48 kB \n"), Ok(48));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(parse_size_kb("bogus"), Err(SizeParseError::Format(_))));
        assert!(matches!(parse_size_kb("10 XB"), Err(SizeParseError::Unit(_))));
        assert!(matches!(parse_size_kb("8192 bytes"), Err(SizeParseError::Unit(_))));
        assert!(matches!(parse_size_kb("1 2 MB"), Err(SizeParseError::Format(_))));
        assert!(matches!(parse_size_kb("x MB"), Err(SizeParseError::Number(_))));
        assert!(matches!(parse_size_kb("-3 MB"), Err(SizeParseError::Number(_))));
        assert!(matches!(parse_size_kb(""), Err(SizeParseError::Format(_))));
    }

    #[test]
    fn test_bytes_to_kb() {
        assert_eq!(bytes_to_kb(0), 0);
        assert_eq!(bytes_to_kb(1023), 0);
        assert_eq!(bytes_to_kb(16_384), 16);
        assert_eq!(bytes_to_kb(-1), 0);
    }
}
