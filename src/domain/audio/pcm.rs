//! Linear PCM sample helpers
//!
//! Wire PCM is always 16-bit little-endian. Float audio is clamped to
//! `[-1.0, 1.0]` before scaling so out-of-range input saturates instead of
//! wrapping.

/// Decode little-endian 16-bit samples. A trailing odd byte is ignored.
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Encode samples as little-endian 16-bit bytes
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// Scale a float sample to the signed 16-bit range
pub fn float_to_i16(sample: f32) -> i16 {
    let clamped = if sample.is_nan() {
        0.0
    } else {
        sample.clamp(-1.0, 1.0)
    };
    (clamped * i16::MAX as f32) as i16
}

/// Average interleaved stereo pairs into mono
pub fn downmix_stereo(interleaved: &[f32]) -> Vec<f32> {
    interleaved
        .chunks_exact(2)
        .map(|pair| (pair[0] + pair[1]) / 2.0)
        .collect()
}

/// Convert float audio to PCM16 bytes sample by sample. Interleaving is kept.
pub fn float_to_pcm16_bytes(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        out.extend_from_slice(&float_to_i16(*sample).to_le_bytes());
    }
    out
}

/// Decode little-endian 32-bit float samples. Trailing partial samples are ignored.
pub fn bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|quad| f32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]))
        .collect()
}
