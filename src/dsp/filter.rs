//! High-pass and low-pass filters
//!
//! Second-order Butterworth sections using the Audio EQ Cookbook formulas.
//! Cutoffs must be positive and strictly below Nyquist.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

use crate::dsp::AudioBuffer;
use crate::error::{MoodshiftError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassBand {
    LowPass,
    HighPass,
}

/// Biquad filter coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (a0 + a1*z^-1 + a2*z^-2)
/// Normalized: all coefficients divided by a0
#[derive(Debug, Clone, Copy, Default)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    /// Reference: https://www.w3.org/2011/audio/audio-eq-cookbook.html
    fn calculate(band: PassBand, sample_rate: f64, frequency: f64) -> Self {
        let w0 = 2.0 * PI * frequency / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * FRAC_1_SQRT_2);

        let (b0, b1, b2) = match band {
            PassBand::LowPass => ((1.0 - cos_w0) / 2.0, 1.0 - cos_w0, (1.0 - cos_w0) / 2.0),
            PassBand::HighPass => ((1.0 + cos_w0) / 2.0, -(1.0 + cos_w0), (1.0 + cos_w0) / 2.0),
        };
        let a0 = 1.0 + alpha;

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }
}

/// Biquad filter state for one channel
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    /// Direct Form I
    fn process(&mut self, input: f64, coeffs: &BiquadCoeffs) -> f64 {
        let output = coeffs.b0 * input + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }
}

/// Check a cutoff against the buffer's sample rate
pub fn validate(effect: &str, cutoff_hz: f64, sample_rate: u32) -> Result<()> {
    if !cutoff_hz.is_finite() || cutoff_hz <= 0.0 {
        return Err(MoodshiftError::invalid_params(
            effect,
            format!("cutoff_hz must be positive, got {}", cutoff_hz),
        ));
    }
    let nyquist = sample_rate as f64 / 2.0;
    if cutoff_hz >= nyquist {
        return Err(MoodshiftError::invalid_params(
            effect,
            format!(
                "cutoff {}Hz is too high for sample rate {}Hz",
                cutoff_hz, sample_rate
            ),
        ));
    }
    Ok(())
}

/// Attenuate content below `cutoff_hz`
pub fn high_pass(buffer: AudioBuffer, cutoff_hz: f64) -> AudioBuffer {
    if validate("high_pass_filter", cutoff_hz, buffer.sample_rate).is_err() {
        return buffer;
    }
    run(buffer, PassBand::HighPass, cutoff_hz)
}

/// Attenuate content above `cutoff_hz`
pub fn low_pass(buffer: AudioBuffer, cutoff_hz: f64) -> AudioBuffer {
    if validate("low_pass_filter", cutoff_hz, buffer.sample_rate).is_err() {
        return buffer;
    }
    run(buffer, PassBand::LowPass, cutoff_hz)
}

fn run(mut buffer: AudioBuffer, band: PassBand, cutoff_hz: f64) -> AudioBuffer {
    let coeffs = BiquadCoeffs::calculate(band, buffer.sample_rate as f64, cutoff_hz);
    for channel in &mut buffer.samples {
        let mut state = BiquadState::default();
        for sample in channel.iter_mut() {
            *sample = state.process(*sample as f64, &coeffs) as f32;
        }
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::generate_test_tone;
    use test_case::test_case;

    /// RMS over the second half, after the filter has settled
    fn settled_rms(buffer: &AudioBuffer) -> f64 {
        let channel = buffer.channel(0);
        let tail = &channel[channel.len() / 2..];
        let sum: f64 = tail.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / tail.len() as f64).sqrt()
    }

    #[test]
    fn test_low_pass_keeps_low_removes_high() {
        let low = generate_test_tone(100.0, 0.5, 0.5, 44100);
        let high = generate_test_tone(10_000.0, 0.5, 0.5, 44100);

        let low_ratio = settled_rms(&low_pass(low.clone(), 1000.0)) / settled_rms(&low);
        let high_ratio = settled_rms(&low_pass(high.clone(), 1000.0)) / settled_rms(&high);

        assert!(low_ratio > 0.95, "passband attenuated: {}", low_ratio);
        assert!(high_ratio < 0.05, "stopband leaked: {}", high_ratio);
    }

    #[test]
    fn test_high_pass_keeps_high_removes_low() {
        let low = generate_test_tone(50.0, 0.5, 0.5, 44100);
        let high = generate_test_tone(8_000.0, 0.5, 0.5, 44100);

        let low_ratio = settled_rms(&high_pass(low.clone(), 2000.0)) / settled_rms(&low);
        let high_ratio = settled_rms(&high_pass(high.clone(), 2000.0)) / settled_rms(&high);

        assert!(low_ratio < 0.01, "stopband leaked: {}", low_ratio);
        assert!(high_ratio > 0.95, "passband attenuated: {}", high_ratio);
    }

    #[test_case(0.0 ; "zero")]
    #[test_case(-100.0 ; "negative")]
    #[test_case(22050.0 ; "at nyquist")]
    #[test_case(30000.0 ; "above nyquist")]
    fn test_invalid_cutoff_is_noop(cutoff_hz: f64) {
        let buffer = generate_test_tone(440.0, 0.5, 0.1, 44100);
        assert!(validate("low_pass_filter", cutoff_hz, 44100).is_err());
        assert_eq!(low_pass(buffer.clone(), cutoff_hz), buffer);
        assert_eq!(high_pass(buffer.clone(), cutoff_hz), buffer);
    }

    #[test]
    fn test_preserves_length_and_channels() {
        let buffer = crate::engine::generate_stereo_test_tone(200.0, 300.0, 0.5, 0.2, 22050);
        let filtered = high_pass(buffer.clone(), 80.0);
        assert_eq!(filtered.len(), buffer.len());
        assert_eq!(filtered.num_channels(), 2);
        assert_eq!(filtered.sample_rate, 22050);
    }
}
