//! # Frame Constants and Types
//!
//! Core definitions shared by the decoder and encoder.

use tokio::time::Instant;

/// Tag of a frame carrying a new baseline
pub const TAG_BASELINE: char = 'B';

/// Tag of a frame carrying a new reference voltage
pub const TAG_REFERENCE: char = 'V';

/// Frame grammar: tag, first number, comma, second number.
///
/// There is no separator between the tag and the first number.
pub const FRAME_PATTERN: &str = r"^([BV])(-?[0-9]+(?:\.[0-9]+)?),(-?[0-9]+(?:\.[0-9]+)?)$";

/// Decimal places the transmitter uses for every value
pub const FRAME_DECIMALS: usize = 6;

/// Calibration quantity carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    /// `B` frame: primary value is the baseline
    Baseline,
    /// `V` frame: primary value is the reference voltage (Vref)
    Reference,
}

impl SampleKind {
    /// Map a tag character to its kind
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            TAG_BASELINE => Some(SampleKind::Baseline),
            TAG_REFERENCE => Some(SampleKind::Reference),
            _ => None,
        }
    }

    /// Tag character written on the wire
    pub fn tag(self) -> char {
        match self {
            SampleKind::Baseline => TAG_BASELINE,
            SampleKind::Reference => TAG_REFERENCE,
        }
    }
}

/// One successfully decoded frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Which calibration value `primary` updates
    pub kind: SampleKind,

    /// Baseline or reference voltage, depending on `kind`
    pub primary: f64,

    /// Raw reading voltage
    pub secondary: f64,

    /// When the frame was decoded
    pub received_at: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_mapping() {
        assert_eq!(SampleKind::from_tag('B'), Some(SampleKind::Baseline));
        assert_eq!(SampleKind::from_tag('V'), Some(SampleKind::Reference));
        assert_eq!(SampleKind::from_tag('b'), None);
        assert_eq!(SampleKind::from_tag('X'), None);
    }

    #[test]
    fn test_tag_is_inverse_of_from_tag() {
        for kind in [SampleKind::Baseline, SampleKind::Reference] {
            assert_eq!(SampleKind::from_tag(kind.tag()), Some(kind));
        }
    }
}
