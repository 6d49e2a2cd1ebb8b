//! Moodshift - Audio Effect Chain Processing
//!
//! Applies an ordered chain of effects (gain, filters, speed/pitch, echo,
//! reverb) to an uploaded audio file and exports the result, tracking each
//! request as a job with observable progress.
//!
//! # Architecture
//!
//! - `dsp`: effect specs and the pure operators
//! - `engine`: audio buffer, codec boundary and the chain engine
//! - `jobs`: lifecycle state machine, shared store, worker pool, retention
//! - `cli`: command-line front end

pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod jobs;

pub use config::Config;
pub use error::{MoodshiftError, Result};
