//! # Frame Decoder
//!
//! Validates a raw notification payload and turns it into a [`Sample`].

use std::sync::OnceLock;

use regex::Regex;
use tokio::time::Instant;

use super::frame::{Sample, SampleKind, FRAME_PATTERN};
use crate::error::DecodeError;

fn frame_regex() -> &'static Regex {
    static FRAME_REGEX: OnceLock<Regex> = OnceLock::new();
    FRAME_REGEX.get_or_init(|| Regex::new(FRAME_PATTERN).expect("frame pattern is a valid regex"))
}

/// Decode one notification payload
///
/// # Arguments
///
/// * `frame` - Raw bytes of a single notification
/// * `received_at` - Timestamp stored on the resulting sample
///
/// # Returns
///
/// * `Result<Sample, DecodeError>` - Decoded sample, or the reason it was rejected
///
/// # Errors
///
/// Returns error if:
/// - The payload is not UTF-8
/// - The text does not match the frame grammar
/// - A number does not parse to a finite value
///
/// # Examples
///
/// ```
/// use telemetry_receiver::protocol::{decode_frame, SampleKind};
/// use tokio::time::Instant;
///
/// let sample = decode_frame(b"B1.000000,1.005000", Instant::now()).unwrap();
/// assert_eq!(sample.kind, SampleKind::Baseline);
/// assert_eq!(sample.primary, 1.0);
/// assert_eq!(sample.secondary, 1.005);
/// ```
pub fn decode_frame(frame: &[u8], received_at: Instant) -> Result<Sample, DecodeError> {
    let text = std::str::from_utf8(frame).map_err(|_| DecodeError::NotUtf8)?;

    let captures = frame_regex()
        .captures(text)
        .ok_or_else(|| DecodeError::Malformed(text.to_string()))?;

    let kind = captures[1]
        .chars()
        .next()
        .and_then(SampleKind::from_tag)
        .ok_or_else(|| DecodeError::Malformed(text.to_string()))?;

    let primary = parse_finite(&captures[2])?;
    let secondary = parse_finite(&captures[3])?;

    Ok(Sample {
        kind,
        primary,
        secondary,
        received_at,
    })
}

fn parse_finite(token: &str) -> Result<f64, DecodeError> {
    let value: f64 = token
        .parse()
        .map_err(|_| DecodeError::Malformed(token.to_string()))?;

    if !value.is_finite() {
        return Err(DecodeError::NonFinite(token.to_string()));
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(frame: &str) -> Result<Sample, DecodeError> {
        decode_frame(frame.as_bytes(), Instant::now())
    }

    #[test]
    fn test_decode_baseline_frame() {
        let sample = decode("B1.000000,1.005000").unwrap();
        assert_eq!(sample.kind, SampleKind::Baseline);
        assert_eq!(sample.primary, 1.0);
        assert_eq!(sample.secondary, 1.005);
    }

    #[test]
    fn test_decode_reference_frame() {
        let sample = decode("V0.500000,1.005000").unwrap();
        assert_eq!(sample.kind, SampleKind::Reference);
        assert_eq!(sample.primary, 0.5);
        assert_eq!(sample.secondary, 1.005);
    }

    #[test]
    fn test_decode_negative_and_integer_values() {
        let sample = decode("B-0.25,3").unwrap();
        assert_eq!(sample.primary, -0.25);
        assert_eq!(sample.secondary, 3.0);
    }

    #[test]
    fn test_decode_keeps_timestamp() {
        let now = Instant::now();
        let sample = decode_frame(b"V1,2", now).unwrap();
        assert_eq!(sample.received_at, now);
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        assert!(matches!(decode("X1,2"), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_missing_second_number() {
        assert!(matches!(decode("B1"), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_non_numeric_value() {
        assert!(matches!(decode("B1,abc"), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_comma_after_tag() {
        assert!(decode("B,1.0,2.0").is_err());
    }

    #[test]
    fn test_decode_rejects_surrounding_garbage() {
        assert!(decode(" B1,2").is_err());
        assert!(decode("B1,2\n").is_err());
        assert!(decode("B1,2,3").is_err());
        assert!(decode("B1.,2").is_err());
        assert!(decode("B+1,2").is_err());
        assert!(decode("").is_err());
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let result = decode_frame(&[b'B', 0xFF, b',', b'1'], Instant::now());
        assert_eq!(result, Err(DecodeError::NotUtf8));
    }

    #[test]
    fn test_decode_rejects_overflowing_number() {
        let huge = "9".repeat(400);
        let frame = format!("B{},1.0", huge);
        assert!(matches!(decode(&frame), Err(DecodeError::NonFinite(_))));
    }
}
