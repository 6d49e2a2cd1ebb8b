//! Audio Engine Module
//!
//! Core audio processing engine including:
//! - Audio buffer management
//! - File I/O behind the codec boundary
//! - The effect chain engine

pub mod buffer;
pub mod io;
pub mod processor;

pub use buffer::{db_to_linear, frames_for_ms, linear_to_db, AudioBuffer, MAX_FRAMES};
pub use io::{
    generate_stereo_test_tone, generate_test_tone, AudioCodec, DefaultCodec, OutputFormat,
};
pub use processor::{
    effect_progress, ChainOutput, EffectChainEngine, NullSink, ProgressSink, RunReport,
    SkippedEffect, STATUS_DONE, STATUS_EXPORTING, STATUS_LOADING,
};
