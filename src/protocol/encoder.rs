//! # Frame Encoder
//!
//! Builds wire frames the way the transmitter formats them.

use bytes::Bytes;

use super::frame::{SampleKind, FRAME_DECIMALS};

/// Encode a frame
///
/// # Arguments
///
/// * `kind` - Frame tag
/// * `primary` - Baseline or reference voltage
/// * `secondary` - Reading voltage
///
/// # Returns
///
/// * `Bytes` - ASCII payload such as `B1.000000,1.005000`
///
/// # Examples
///
/// ```
/// use telemetry_receiver::protocol::{encode_frame, SampleKind};
///
/// let frame = encode_frame(SampleKind::Baseline, 1.0, 1.005);
/// assert_eq!(&frame[..], b"B1.000000,1.005000");
/// ```
pub fn encode_frame(kind: SampleKind, primary: f64, secondary: f64) -> Bytes {
    Bytes::from(format!(
        "{}{:.prec$},{:.prec$}",
        kind.tag(),
        primary,
        secondary,
        prec = FRAME_DECIMALS
    ))
}
