//! DSP Effects Library
//!
//! Stateless operators applied to a whole [`AudioBuffer`] in chain order.
//! Each operator module exposes `validate` for its parameter domain and
//! `process`, which returns the input unchanged when the domain check fails.

mod chain;
mod effect;
pub mod echo;
pub mod filter;
pub mod gain;
pub mod reverb;
pub mod speed;

pub use crate::engine::AudioBuffer;
pub use chain::{EffectChain, EffectSpec};
pub use effect::{Effect, EffectOutcome};
