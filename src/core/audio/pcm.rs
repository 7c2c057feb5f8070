//! Linear PCM 16-bit codec.
//!
//! Converts normalized floating-point samples into 16-bit signed little-endian
//! PCM, the `pcm16` wire format expected by the realtime service.
//!
//! Negative samples scale by 32768 and non-negative samples by 32767 so that
//! both ends of the `[-1.0, 1.0]` range map onto the full `i16` range.

/// Scale factor applied to negative samples.
pub const PCM16_NEGATIVE_SCALE: f32 = 32768.0;

/// Scale factor applied to non-negative samples.
pub const PCM16_POSITIVE_SCALE: f32 = 32767.0;

/// One quantization step of the encoding, in normalized units.
pub const PCM16_QUANTIZATION_STEP: f32 = 1.0 / 32768.0;

/// Bytes per encoded sample.
pub const PCM16_BYTES_PER_SAMPLE: usize = 2;

/// Convert a single normalized sample to a 16-bit integer.
///
/// NaN maps to silence. Values outside `[-1.0, 1.0]` are clamped before
/// scaling, and the scaled value is truncated toward zero.
#[inline]
pub fn float_to_pcm16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * PCM16_NEGATIVE_SCALE) as i16
    } else {
        (s * PCM16_POSITIVE_SCALE) as i16
    }
}

/// Convert a single 16-bit sample back to the normalized range.
#[inline]
pub fn pcm16_to_float(sample: i16) -> f32 {
    if sample < 0 {
        sample as f32 / PCM16_NEGATIVE_SCALE
    } else {
        sample as f32 / PCM16_POSITIVE_SCALE
    }
}

/// Encode samples into `out`, replacing its contents.
///
/// `out` keeps its capacity between calls so a capture loop can reuse a single
/// buffer for every frame.
pub fn encode_pcm16_into(samples: &[f32], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(samples.len() * PCM16_BYTES_PER_SAMPLE);
    for &sample in samples {
        out.extend_from_slice(&float_to_pcm16(sample).to_le_bytes());
    }
}

/// Encode samples into a freshly allocated little-endian PCM16 buffer.
pub fn floats_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * PCM16_BYTES_PER_SAMPLE);
    encode_pcm16_into(samples, &mut out);
    out
}

/// Decode little-endian PCM16 bytes into normalized samples.
///
/// A trailing odd byte is ignored.
pub fn pcm16_to_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(PCM16_BYTES_PER_SAMPLE)
        .map(|pair| pcm16_to_float(i16::from_le_bytes([pair[0], pair[1]])))
        .collect()
}
