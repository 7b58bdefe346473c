//! PCM transport codec and sample-rate conversion
//!
//! The wire carries little-endian 16-bit signed PCM as base64 text; samples
//! in memory are `f32` in [-1.0, 1.0]. Resampling is block-average
//! decimation, a latency/simplicity tradeoff rather than a filtering choice.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::{Error, Result};

/// Decode base64 transport text into `f32` samples
///
/// # Errors
///
/// Returns [`Error::Decode`] if the input is not valid base64 or the decoded
/// byte count is odd.
pub fn decode_audio(transport: &str) -> Result<Vec<f32>> {
    let bytes = BASE64
        .decode(transport)
        .map_err(|e| Error::Decode(e.to_string()))?;

    if bytes.len() % 2 != 0 {
        return Err(Error::Decode(format!(
            "odd PCM byte count: {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
        .collect())
}

/// Encode `f32` samples as base64 little-endian 16-bit PCM
///
/// Samples are clamped to [-1.0, 1.0]. Positive values scale by 32767 and
/// negative values by 32768, matching the asymmetric i16 range, so the
/// result round-trips through [`decode_audio`] within one quantization step.
#[must_use]
pub fn encode_audio(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let s = sample.clamp(-1.0, 1.0);
        let scaled = if s < 0.0 { s * 32768.0 } else { s * 32767.0 };
        #[allow(clippy::cast_possible_truncation)]
        bytes.extend_from_slice(&(scaled.round() as i16).to_le_bytes());
    }
    BASE64.encode(bytes)
}

/// Convert `samples` from `from_rate` to `to_rate`
///
/// No-op when the rates are equal. Otherwise each output sample is the
/// arithmetic mean of its input window; upsampling degrades to single-sample
/// windows (≈ nearest neighbor).
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let out_len = (samples.len() as f64 / ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);

    let mut window_start = 0usize;
    for i in 0..out_len {
        let window_end = (((i + 1) as f64) * ratio).round() as usize;
        let lo = window_start.min(samples.len());
        let hi = window_end.min(samples.len());

        let value = if lo < hi {
            samples[lo..hi].iter().sum::<f32>() / (hi - lo) as f32
        } else {
            // Upsampling window collapsed to zero width: take the nearest
            // input sample
            samples[lo.min(samples.len() - 1)]
        };

        out.push(value);
        window_start = window_end;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_odd_byte_count() {
        // Three raw bytes is valid base64 but not whole i16 samples
        let transport = BASE64.encode([0u8, 1, 2]);
        let err = decode_audio(&transport).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        assert!(decode_audio("not base64!!").is_err());
    }

    #[test]
    fn round_trip_within_one_quantization_step() {
        let original: Vec<f32> = vec![0.0, 0.5, -0.5, 1.0, -1.0, 0.25, -0.125, 0.375];
        let decoded = decode_audio(&encode_audio(&original)).unwrap();

        assert_eq!(decoded.len(), original.len());
        for (a, b) in original.iter().zip(&decoded) {
            assert!((a - b).abs() <= 1.0 / 32768.0, "{a} vs {b}");
        }
    }

    #[test]
    fn encode_clamps_out_of_range_samples() {
        let decoded = decode_audio(&encode_audio(&[2.0, -2.0])).unwrap();
        assert!((decoded[0] - 1.0).abs() <= 1.0 / 32768.0);
        assert!((decoded[1] + 1.0).abs() <= 1.0 / 32768.0);
    }

    #[test]
    fn full_scale_negative_is_exact() {
        let decoded = decode_audio(&encode_audio(&[-1.0])).unwrap();
        assert!((decoded[0] + 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn resample_equal_rates_is_identity() {
        let buffer: Vec<f32> = (0..480).map(|i| (i as f32).sin()).collect();
        assert_eq!(resample(&buffer, 16000, 16000), buffer);
        assert_eq!(resample(&buffer, 48000, 48000), buffer);
    }

    #[test]
    fn downsample_averages_windows() {
        // 48k -> 16k: each output sample averages three inputs
        let buffer = vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.5, 0.5, 0.5];
        let out = resample(&buffer, 48000, 16000);
        assert_eq!(out.len(), 3);
        assert!((out[0] - 1.0).abs() < f32::EPSILON);
        assert!(out[1].abs() < f32::EPSILON);
        assert!((out[2] - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn downsample_output_length_rounds() {
        let buffer = vec![0.0; 441];
        let out = resample(&buffer, 44100, 16000);
        let expected = (441.0_f64 / (44100.0 / 16000.0)).round() as usize;
        assert_eq!(out.len(), expected);
    }

    #[test]
    fn upsample_approximates_nearest_neighbor() {
        let buffer = vec![0.25, 0.75];
        let out = resample(&buffer, 8000, 16000);
        assert_eq!(out.len(), 4);
        for sample in out {
            assert!(sample == 0.25 || sample == 0.75);
        }
    }
}
