//! Effect lookup and dispatch
//!
//! Every supported operator is one variant of [`Effect`]; names that match
//! none of them become [`Effect::Unknown`] and are skipped by the engine.

use serde_json::Value;

use super::{echo, filter, gain, reverb, speed, AudioBuffer, EffectSpec};
use crate::error::{MoodshiftError, Result};

// Defaults used when a parameter is omitted
const DEFAULT_GAIN_DB: f64 = 0.0;
const DEFAULT_HIGH_PASS_HZ: f64 = 80.0;
const DEFAULT_LOW_PASS_HZ: f64 = 5000.0;
const DEFAULT_SPEED_FACTOR: f64 = 1.0;
const DEFAULT_ECHO_DELAY_MS: f64 = 500.0;
const DEFAULT_ECHO_DECAY: f64 = 0.5;
const DEFAULT_REVERB_WET: f64 = 0.3;
const DEFAULT_REVERB_ROOM: f64 = 0.5;

/// A resolved effect with typed parameters
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Gain { gain_db: f64 },
    HighPassFilter { cutoff_hz: f64 },
    LowPassFilter { cutoff_hz: f64 },
    SpeedPitch { factor: f64 },
    Echo { delay_ms: f64, decay_factor: f64 },
    Reverb { wet_level: f64, room_size: f64 },
    Unknown { name: String },
}

/// Result of applying one effect of a chain
#[derive(Debug)]
pub enum EffectOutcome {
    /// The operator ran and produced this buffer
    Applied(AudioBuffer),
    /// The effect was rejected; the buffer is the unchanged input
    Skipped {
        buffer: AudioBuffer,
        reason: MoodshiftError,
    },
}

impl EffectOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EffectOutcome::Applied(_))
    }

    pub fn buffer(&self) -> &AudioBuffer {
        match self {
            EffectOutcome::Applied(buffer) => buffer,
            EffectOutcome::Skipped { buffer, .. } => buffer,
        }
    }

    pub fn into_buffer(self) -> AudioBuffer {
        match self {
            EffectOutcome::Applied(buffer) => buffer,
            EffectOutcome::Skipped { buffer, .. } => buffer,
        }
    }
}

impl Effect {
    /// Resolve a spec into a typed effect
    ///
    /// Unrecognized names yield `Effect::Unknown`. A parameter that is
    /// present but not a number fails with `ParameterValidation`.
    pub fn from_spec(spec: &EffectSpec) -> Result<Self> {
        let effect = match spec.name.as_str() {
            "gain" => Effect::Gain {
                gain_db: number(spec, "gain_db", DEFAULT_GAIN_DB)?,
            },
            "high_pass_filter" => Effect::HighPassFilter {
                cutoff_hz: number(spec, "cutoff_hz", DEFAULT_HIGH_PASS_HZ)?,
            },
            "low_pass_filter" => Effect::LowPassFilter {
                cutoff_hz: number(spec, "cutoff_hz", DEFAULT_LOW_PASS_HZ)?,
            },
            "speed_pitch" => Effect::SpeedPitch {
                factor: number(spec, "factor", DEFAULT_SPEED_FACTOR)?,
            },
            "echo" => Effect::Echo {
                delay_ms: number(spec, "delay_ms", DEFAULT_ECHO_DELAY_MS)?,
                decay_factor: number(spec, "decay_factor", DEFAULT_ECHO_DECAY)?,
            },
            "reverb" => Effect::Reverb {
                wet_level: number(spec, "wet_level", DEFAULT_REVERB_WET)?,
                room_size: number(spec, "room_size", DEFAULT_REVERB_ROOM)?,
            },
            other => Effect::Unknown {
                name: other.to_string(),
            },
        };
        Ok(effect)
    }

    /// Effect identifier as submitted
    pub fn name(&self) -> &str {
        match self {
            Effect::Gain { .. } => "gain",
            Effect::HighPassFilter { .. } => "high_pass_filter",
            Effect::LowPassFilter { .. } => "low_pass_filter",
            Effect::SpeedPitch { .. } => "speed_pitch",
            Effect::Echo { .. } => "echo",
            Effect::Reverb { .. } => "reverb",
            Effect::Unknown { name } => name.as_str(),
        }
    }

    /// Human-readable label, e.g. "High Pass Filter"
    pub fn display_name(&self) -> String {
        title_case(self.name())
    }

    /// Check parameters against the operator's domain for this buffer
    pub fn validate(&self, buffer: &AudioBuffer) -> Result<()> {
        match self {
            Effect::Gain { gain_db } => gain::validate(*gain_db),
            Effect::HighPassFilter { cutoff_hz } => {
                filter::validate("high_pass_filter", *cutoff_hz, buffer.sample_rate)
            }
            Effect::LowPassFilter { cutoff_hz } => {
                filter::validate("low_pass_filter", *cutoff_hz, buffer.sample_rate)
            }
            Effect::SpeedPitch { factor } => speed::validate(*factor),
            Effect::Echo {
                delay_ms,
                decay_factor,
            } => echo::validate(*delay_ms, *decay_factor),
            Effect::Reverb {
                wet_level,
                room_size,
            } => reverb::validate(*wet_level, *room_size),
            Effect::Unknown { name } => Err(MoodshiftError::UnsupportedEffect { name: name.clone() }),
        }
    }

    /// Validate, then run the operator
    ///
    /// A parameter outside the operator's domain is a `Skipped` outcome.
    /// `Err` means the operator could not produce its output at all, e.g.
    /// a stretch or delay past the frame limit, and is fatal to the job.
    pub fn apply(&self, buffer: AudioBuffer) -> Result<EffectOutcome> {
        if let Err(reason) = self.validate(&buffer) {
            return Ok(EffectOutcome::Skipped { buffer, reason });
        }

        let processed = match self {
            Effect::Gain { gain_db } => gain::process(buffer, *gain_db),
            Effect::HighPassFilter { cutoff_hz } => filter::high_pass(buffer, *cutoff_hz),
            Effect::LowPassFilter { cutoff_hz } => filter::low_pass(buffer, *cutoff_hz),
            Effect::SpeedPitch { factor } => speed::process(buffer, *factor)?,
            Effect::Echo {
                delay_ms,
                decay_factor,
            } => echo::process(buffer, *delay_ms, *decay_factor)?,
            Effect::Reverb {
                wet_level,
                room_size,
            } => reverb::process(buffer, *wet_level, *room_size)?,
            Effect::Unknown { .. } => buffer,
        };
        Ok(EffectOutcome::Applied(processed))
    }
}

fn number(spec: &EffectSpec, key: &str, default: f64) -> Result<f64> {
    match spec.param(key) {
        None => Ok(default),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| {
            MoodshiftError::invalid_params(&spec.name, format!("{} is out of range", key))
        }),
        Some(other) => Err(MoodshiftError::invalid_params(
            &spec.name,
            format!("{} must be a number, got {}", key, other),
        )),
    }
}

fn title_case(name: &str) -> String {
    name.split(|c: char| c == '_' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
