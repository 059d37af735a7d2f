//! Arithmetic and formatting helpers shared by the dispense and reporting paths.

use std::time::Duration;

/// Round seconds to the nearest centisecond.
#[inline]
pub fn round_centis(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}

/// Integer volume reported for a dispense: `floor(duration * flow)`.
/// Negative or non-finite products report 0.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn reported_volume(duration_s: f64, flow_ml_per_s: f64) -> u64 {
    let v = (duration_s * flow_ml_per_s).floor();
    if v.is_finite() && v > 0.0 { v as u64 } else { 0 }
}

/// Seconds to a `Duration`, clamping negative and non-finite values to zero.
#[inline]
pub fn clamp_secs(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

/// Percent-encode one URL path segment. `:` and `@` are kept (valid in paths).
pub fn encode_path_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b':' | b'@' => {
                out.push(char::from(b));
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
