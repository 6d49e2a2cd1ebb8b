//! Reverb effect
//!
//! A multi-tap echo reverb:
//! - 8 delayed, attenuated copies of the dry signal form the wet tail
//! - `room_size` stretches the tap delays and slows their decay
//! - `wet_level` sets the dry/wet balance
//!
//! Overlay extends the output by the longest tap delay.

use tracing::{debug, warn};

use crate::dsp::AudioBuffer;
use crate::engine::buffer::linear_to_db;
use crate::error::{MoodshiftError, Result};

// ============================================================================
// Tap Constants
// ============================================================================

/// Tap delays at `room_size == 1/3` (scale factor 1.0)
const BASE_DELAYS_MS: [u32; 8] = [23, 37, 53, 71, 97, 131, 173, 223];

/// Tap decays at `room_size == 0`
const BASE_DECAYS: [f64; 8] = [0.70, 0.65, 0.60, 0.55, 0.50, 0.45, 0.40, 0.35];

/// Lowest linear tap decay
const MIN_TAP_DECAY: f64 = 0.01;

/// Added before taking a logarithm of the mix ratios
const MIX_EPSILON: f64 = 1e-6;

/// Dry gain when the mix is fully wet
const SILENT_DB: f64 = -120.0;

/// One delayed copy of the dry signal
#[derive(Debug, Clone, Copy, PartialEq)]
struct Tap {
    delay_ms: u32,
    decay: f64,
}

fn taps(room_size: f64) -> impl Iterator<Item = Tap> {
    let delay_scale = 0.5 + 1.5 * room_size;
    let decay_scale = 1.0 - 0.5 * room_size;
    BASE_DELAYS_MS
        .iter()
        .zip(BASE_DECAYS.iter())
        .map(move |(&base_delay, &base_decay)| Tap {
            // Whole milliseconds
            delay_ms: (base_delay as f64 * delay_scale) as u32,
            decay: (base_decay * decay_scale).max(MIN_TAP_DECAY),
        })
}

pub fn validate(wet_level: f64, room_size: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&wet_level) {
        return Err(MoodshiftError::invalid_params(
            "reverb",
            format!("wet_level must be in [0, 1], got {}", wet_level),
        ));
    }
    if !(0.0..=1.0).contains(&room_size) {
        return Err(MoodshiftError::invalid_params(
            "reverb",
            format!("room_size must be in [0, 1], got {}", room_size),
        ));
    }
    Ok(())
}

pub fn process(buffer: AudioBuffer, wet_level: f64, room_size: f64) -> Result<AudioBuffer> {
    if validate(wet_level, room_size).is_err() {
        return Ok(buffer);
    }
    if wet_level == 0.0 {
        debug!("reverb wet_level is 0, returning dry signal");
        return Ok(buffer);
    }
    if buffer.is_empty() {
        warn!("cannot apply reverb to empty audio");
        return Ok(buffer);
    }

    let mut wet = AudioBuffer::new(buffer.len(), buffer.num_channels(), buffer.sample_rate);
    for tap in taps(room_size).filter(|tap| tap.delay_ms > 0) {
        let copy = buffer
            .with_gain_db(linear_to_db(tap.decay))
            .delayed(tap.delay_ms as f64)?;
        wet.overlay(&copy);
    }

    let dry_gain_db = if wet_level < 1.0 {
        linear_to_db(1.0 - wet_level + MIX_EPSILON)
    } else {
        SILENT_DB
    };
    let wet_gain_db = linear_to_db(wet_level + MIX_EPSILON);

    let mut output = buffer;
    output.apply_gain_db(dry_gain_db);
    wet.apply_gain_db(wet_gain_db);
    output.overlay(&wet);
    Ok(output)
}

// ============================================================================
// Tests
// ============================================================================
