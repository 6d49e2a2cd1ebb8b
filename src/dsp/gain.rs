//! Gain Effect
//!
//! Logarithmic volume change: every sample is scaled by `10^(gain_db/20)`.

use crate::dsp::AudioBuffer;
use crate::error::{MoodshiftError, Result};

/// Any finite dB value is accepted
pub fn validate(gain_db: f64) -> Result<()> {
    if !gain_db.is_finite() {
        return Err(MoodshiftError::invalid_params(
            "gain",
            format!("gain_db must be a finite number, got {}", gain_db),
        ));
    }
    Ok(())
}

/// Apply `gain_db` decibels to the whole buffer
pub fn process(mut buffer: AudioBuffer, gain_db: f64) -> AudioBuffer {
    if validate(gain_db).is_err() {
        return buffer;
    }

    // Unity gain
    if gain_db == 0.0 {
        return buffer;
    }

    buffer.apply_gain_db(gain_db);
    buffer
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::db_to_linear;
    use approx::assert_relative_eq;
    use test_case::test_case;

    /// Helper to create a test buffer with known values
    fn create_test_buffer(value: f32, num_samples: usize) -> AudioBuffer {
        AudioBuffer::from_channels(vec![vec![value; num_samples]; 2], 44100).unwrap()
    }

    #[test_case(-6.0 ; "attenuate")]
    #[test_case(6.0 ; "boost")]
    #[test_case(-20.0 ; "ten times quieter")]
    #[test_case(12.5 ; "fractional")]
    fn test_gain_scales_by_db(gain_db: f64) {
        let buffer = create_test_buffer(0.25, 64);
        let processed = process(buffer, gain_db);
        let expected = 0.25 * db_to_linear(gain_db) as f32;

        for ch in 0..processed.num_channels() {
            for &sample in processed.channel(ch) {
                assert_relative_eq!(sample, expected, max_relative = 1e-5);
            }
        }
    }

    #[test]
    fn test_zero_gain_is_identity() {
        let buffer = create_test_buffer(0.5, 100);
        let processed = process(buffer.clone(), 0.0);
        assert_eq!(processed, buffer);
    }

    #[test]
    fn test_six_db_roughly_doubles() {
        let buffer = create_test_buffer(0.4, 10);
        let processed = process(buffer, 6.0);
        assert_relative_eq!(processed.peak(), 0.4 * 1.995262, epsilon = 1e-4);
    }

    #[test]
    fn test_non_finite_is_rejected() {
        assert!(validate(f64::NAN).is_err());
        assert!(validate(f64::INFINITY).is_err());

        let buffer = create_test_buffer(0.5, 10);
        assert_eq!(process(buffer.clone(), f64::NAN), buffer);
    }

    #[test]
    fn test_preserves_format() {
        let buffer = create_test_buffer(0.1, 32);
        let processed = process(buffer, -3.0);
        assert_eq!(processed.sample_rate, 44100);
        assert_eq!(processed.num_channels(), 2);
        assert_eq!(processed.len(), 32);
    }
}
