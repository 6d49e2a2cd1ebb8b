//! Speed/pitch change
//!
//! Resamples the buffer by `factor` and keeps the original sample rate,
//! so playback is faster and higher (factor > 1) or slower and lower
//! (factor < 1). Duration scales by `1 / factor`.

use crate::dsp::AudioBuffer;
use crate::engine::buffer::{checked_frame_count, try_zeroed};
use crate::error::{MoodshiftError, Result};

pub fn validate(factor: f64) -> Result<()> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err(MoodshiftError::invalid_params(
            "speed_pitch",
            format!("speed factor must be positive, got {}", factor),
        ));
    }
    Ok(())
}

/// Resample every channel by `factor`
///
/// Fails with `Internal` when the stretched output would exceed
/// [`MAX_FRAMES`](crate::engine::MAX_FRAMES), which tiny factors reach quickly.
pub fn process(buffer: AudioBuffer, factor: f64) -> Result<AudioBuffer> {
    if factor == 1.0 || validate(factor).is_err() {
        return Ok(buffer);
    }

    let samples = buffer
        .samples
        .iter()
        .map(|channel| resample_linear(channel, factor))
        .collect::<Result<Vec<_>>>()?;

    Ok(AudioBuffer {
        samples,
        sample_rate: buffer.sample_rate,
    })
}

/// Linear interpolation read of `samples` at a step of `factor` frames
fn resample_linear(samples: &[f32], factor: f64) -> Result<Vec<f32>> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let source_len = samples.len();
    let target_len = checked_frame_count(((source_len as f64) / factor).ceil())?;
    let mut output = try_zeroed(target_len)?;

    for (i, out) in output.iter_mut().enumerate() {
        let src_pos = i as f64 * factor;
        let src_idx = src_pos.floor() as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        *out = if src_idx + 1 < source_len {
            samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac
        } else if src_idx < source_len {
            samples[src_idx]
        } else {
            0.0
        };
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::generate_test_tone;
    use approx::assert_relative_eq;

    /// Count upward zero crossings as a frequency estimate
    fn zero_crossings(channel: &[f32]) -> usize {
        channel
            .windows(2)
            .filter(|w| w[0] <= 0.0 && w[1] > 0.0)
            .count()
    }

    #[test]
    fn test_unity_factor_is_identity() {
        let buffer = generate_test_tone(440.0, 0.5, 0.5, 44100);
        assert_eq!(process(buffer.clone(), 1.0).unwrap(), buffer);
    }

    #[test]
    fn test_double_speed_halves_duration() {
        let buffer = generate_test_tone(440.0, 0.5, 2.0, 44100);
        let processed = process(buffer, 2.0).unwrap();
        assert_relative_eq!(processed.duration_secs(), 1.0, epsilon = 1e-3);
        assert_eq!(processed.sample_rate, 44100);
    }

    #[test]
    fn test_half_speed_doubles_duration_and_lowers_pitch() {
        let buffer = generate_test_tone(880.0, 0.5, 1.0, 44100);
        let crossings_before = zero_crossings(buffer.channel(0));

        let processed = process(buffer, 0.5).unwrap();
        assert_relative_eq!(processed.duration_secs(), 2.0, epsilon = 1e-3);

        // Same number of cycles spread over twice the time
        let crossings_after = zero_crossings(processed.channel(0));
        assert!((crossings_after as i64 - crossings_before as i64).abs() <= 2);
    }

    #[test]
    fn test_non_positive_factor_is_noop() {
        let buffer = generate_test_tone(440.0, 0.5, 0.1, 8000);
        assert_eq!(process(buffer.clone(), 0.0).unwrap(), buffer);
        assert_eq!(process(buffer.clone(), -1.5).unwrap(), buffer);
        assert!(validate(0.0).is_err());
    }

    #[test]
    fn test_resample_interpolates() {
        let resampled = resample_linear(&[0.0, 1.0, 0.0], 0.5).unwrap();
        assert_eq!(resampled.len(), 6);
        assert_relative_eq!(resampled[1], 0.5);
    }

    #[test]
    fn test_tiny_factor_fails_instead_of_allocating() {
        let buffer = generate_test_tone(440.0, 0.5, 0.1, 8000);
        for factor in [1e-300, 1e-6] {
            let err = process(buffer.clone(), factor).unwrap_err();
            assert_eq!(err.error_code(), "INTERNAL_ERROR");
            assert!(err.is_fatal());
        }
    }
}
