//! PCM16 wire codec: normalized f32 samples to/from 16-bit little-endian.
//!
//! The wire format is headerless mono PCM: each frame is just `2 * n` bytes
//! of consecutive little-endian `i16` samples. Message boundaries come from
//! the transport's own framing.

/// Positive full scale. `+1.0` maps to `i16::MAX` exactly.
const SCALE_POS: f32 = 32_767.0;
/// Negative full scale. `-1.0` maps to `i16::MIN` exactly.
const SCALE_NEG: f32 = 32_768.0;

/// Converts one normalized sample to a wire sample.
///
/// Input is clamped to `[-1.0, 1.0]`. Positive and negative halves use
/// distinct scale factors so both boundaries hit their integer extremes
/// without introducing a DC bias.
#[inline]
#[must_use]
pub fn sample_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped >= 0.0 {
        (clamped * SCALE_POS) as i16
    } else {
        (clamped * SCALE_NEG) as i16
    }
}

/// Converts one wire sample back to a normalized sample in `[-1.0, 1.0]`.
#[inline]
#[must_use]
pub fn i16_to_sample(value: i16) -> f32 {
    if value >= 0 {
        f32::from(value) / SCALE_POS
    } else {
        f32::from(value) / SCALE_NEG
    }
}

/// Encodes a block of normalized samples into little-endian PCM16 bytes.
#[must_use]
pub fn encode_frame(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&sample_to_i16(sample).to_le_bytes());
    }
    bytes
}

/// Decodes little-endian PCM16 bytes into normalized samples.
///
/// Returns `None` for an odd-length payload - a torn frame is dropped whole
/// rather than truncated to the nearest sample.
#[must_use]
pub fn decode_frame(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(2)
            .map(|pair| i16_to_sample(i16::from_le_bytes([pair[0], pair[1]])))
            .collect(),
    )
}
