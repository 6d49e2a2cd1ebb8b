//! Echo Effect
//!
//! A single repeat: the whole signal, attenuated by `decay_factor` and
//! preceded by `delay_ms` of silence, is overlaid on the original. The
//! output is `delay_ms` longer than the input.

use tracing::warn;

use crate::dsp::AudioBuffer;
use crate::engine::buffer::linear_to_db;
use crate::error::{MoodshiftError, Result};

pub fn validate(delay_ms: f64, decay_factor: f64) -> Result<()> {
    if !delay_ms.is_finite() || delay_ms <= 0.0 {
        return Err(MoodshiftError::invalid_params(
            "echo",
            format!("delay_ms must be positive, got {}", delay_ms),
        ));
    }
    if !(decay_factor > 0.0 && decay_factor < 1.0) {
        return Err(MoodshiftError::invalid_params(
            "echo",
            format!(
                "decay_factor must be between 0 and 1 (exclusive), got {}",
                decay_factor
            ),
        ));
    }
    Ok(())
}

pub fn process(buffer: AudioBuffer, delay_ms: f64, decay_factor: f64) -> Result<AudioBuffer> {
    if validate(delay_ms, decay_factor).is_err() {
        return Ok(buffer);
    }
    if buffer.is_empty() {
        warn!("cannot apply echo to empty audio");
        return Ok(buffer);
    }

    let echo = buffer
        .with_gain_db(linear_to_db(decay_factor))
        .delayed(delay_ms)?;

    let mut output = buffer;
    output.overlay(&echo);
    Ok(output)
}
