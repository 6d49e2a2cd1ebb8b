//! Effect chain engine
//!
//! Loads one input file, applies an [`EffectChain`] strictly in order and
//! exports the result. Progress is pushed to a [`ProgressSink`] at fixed
//! checkpoints:
//!
//! | Step                 | Progress            | Status                     |
//! |----------------------|---------------------|----------------------------|
//! | load                 | 5                   | `Loading audio...`         |
//! | effect `i` of `N`    | `10 + i * 70 / N`   | `Applying: <Display Name>` |
//! | export               | 90                  | `Exporting file...`        |
//! | done                 | 100 (terminal)      | `Effects applied!`         |
//!
//! The per-effect event is emitted just before that effect runs.

use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::dsp::{AudioBuffer, Effect, EffectChain, EffectOutcome};
use crate::engine::io::{AudioCodec, OutputFormat};
use crate::error::{MoodshiftError, Result};

pub const STATUS_LOADING: &str = "Loading audio...";
pub const STATUS_EXPORTING: &str = "Exporting file...";
pub const STATUS_DONE: &str = "Effects applied!";

const PROGRESS_LOADED: u8 = 5;
const PROGRESS_CHAIN_START: f64 = 10.0;
const PROGRESS_CHAIN_END: f64 = 80.0;
const PROGRESS_EXPORTING: u8 = 90;

// ============================================================================
// Progress Sink
// ============================================================================

/// Receiver of a job's progress and terminal events
pub trait ProgressSink: Send + Sync {
    /// Non-terminal progress update
    fn report(&self, progress: u8, status: &str);

    /// The output artifact `result_ref` is complete
    fn succeed(&self, result_ref: &str);

    /// The job aborted; `status` is the caller-facing message
    fn fail(&self, error: &MoodshiftError, status: &str);
}

/// Sink that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&self, _progress: u8, _status: &str) {}
    fn succeed(&self, _result_ref: &str) {}
    fn fail(&self, _error: &MoodshiftError, _status: &str) {}
}

/// Progress for the effect at `index` (0-based) of a chain of `total`
pub fn effect_progress(index: usize, total: usize) -> u8 {
    if total == 0 {
        return PROGRESS_CHAIN_START as u8;
    }
    let step = (PROGRESS_CHAIN_END - PROGRESS_CHAIN_START) / total as f64;
    (PROGRESS_CHAIN_START + index as f64 * step) as u8
}

// ============================================================================
// Run Report
// ============================================================================

/// An effect that was skipped without aborting the chain
#[derive(Debug)]
pub struct SkippedEffect {
    pub index: usize,
    pub name: String,
    pub reason: MoodshiftError,
}

/// Summary of a successful run
#[derive(Debug)]
pub struct RunReport {
    /// File name of the output artifact
    pub result_ref: String,
    /// Names of the effects that ran, in order
    pub applied: Vec<String>,
    pub skipped: Vec<SkippedEffect>,
}

/// In-memory result of applying a chain
#[derive(Debug)]
pub struct ChainOutput {
    pub buffer: AudioBuffer,
    pub applied: Vec<String>,
    pub skipped: Vec<SkippedEffect>,
}

// ============================================================================
// Engine
// ============================================================================

/// Synchronous per-job engine; one instance may serve many workers
#[derive(Clone)]
pub struct EffectChainEngine {
    codec: Arc<dyn AudioCodec>,
}

impl EffectChainEngine {
    pub fn new(codec: Arc<dyn AudioCodec>) -> Self {
        Self { codec }
    }

    /// Load, process and export one file
    ///
    /// On any fatal error a partially written `output` is removed and the
    /// sink receives `fail` before the error is returned. A panic inside
    /// the codec or an operator is reported the same way, as `Internal`.
    pub fn run(
        &self,
        input: &Path,
        output: &Path,
        format: OutputFormat,
        chain: &EffectChain,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport> {
        info!(
            input = %input.display(),
            output = %output.display(),
            %format,
            effects = chain.len(),
            "effects processing started"
        );

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_inner(input, output, format, chain, sink)
        }))
        .unwrap_or_else(|payload| {
            Err(MoodshiftError::Internal {
                reason: panic_reason(payload.as_ref()),
            })
        });

        match outcome {
            Ok(report) => {
                info!(
                    result = %report.result_ref,
                    applied = report.applied.len(),
                    skipped = report.skipped.len(),
                    "effects processing complete"
                );
                sink.succeed(&report.result_ref);
                Ok(report)
            }
            Err(err) => {
                error!(
                    input = %input.display(),
                    code = err.error_code(),
                    "effects processing failed: {}",
                    err
                );
                remove_partial(output);
                sink.fail(&err, &err.status_message());
                Err(err)
            }
        }
    }

    fn run_inner(
        &self,
        input: &Path,
        output: &Path,
        format: OutputFormat,
        chain: &EffectChain,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport> {
        sink.report(PROGRESS_LOADED, STATUS_LOADING);
        let buffer = self.codec.load(input)?;
        let processed = self.process_buffer(buffer, chain, sink)?;

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        sink.report(PROGRESS_EXPORTING, STATUS_EXPORTING);
        self.codec.export(&processed.buffer, output, format)?;

        let result_ref = output
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| MoodshiftError::Internal {
                reason: format!("output path has no file name: {}", output.display()),
            })?;

        Ok(RunReport {
            result_ref,
            applied: processed.applied,
            skipped: processed.skipped,
        })
    }

    /// Apply `chain` to an in-memory buffer
    ///
    /// Validation failures and unknown effects are recorded as skips; the
    /// working buffer is left as it was before that effect. An operator
    /// that cannot produce its output aborts the chain.
    pub fn process_buffer(
        &self,
        buffer: AudioBuffer,
        chain: &EffectChain,
        sink: &dyn ProgressSink,
    ) -> Result<ChainOutput> {
        let total = chain.len();
        let mut working = buffer;
        let mut applied = Vec::new();
        let mut skipped = Vec::new();
        // Specs without a name do not advance the progress position
        let mut position = 0;

        for (index, spec) in chain.iter().enumerate() {
            if spec.name.is_empty() {
                warn!(index, "skipping effect with missing name");
                skipped.push(SkippedEffect {
                    index,
                    name: String::new(),
                    reason: MoodshiftError::invalid_params("", "missing effect name"),
                });
                continue;
            }

            let progress = effect_progress(position, total);
            position += 1;

            let effect = match Effect::from_spec(spec) {
                Ok(effect) => effect,
                Err(reason) => {
                    sink.report(progress, &applying_status(&Effect::Unknown {
                        name: spec.name.clone(),
                    }));
                    warn!(index, effect = %spec.name, "skipping effect: {}", reason);
                    skipped.push(SkippedEffect {
                        index,
                        name: spec.name.clone(),
                        reason,
                    });
                    continue;
                }
            };

            debug!(index, effect = effect.name(), progress, "applying effect");
            sink.report(progress, &applying_status(&effect));

            match effect.apply(working)? {
                EffectOutcome::Applied(buffer) => {
                    working = buffer;
                    applied.push(effect.name().to_string());
                }
                EffectOutcome::Skipped { buffer, reason } => {
                    warn!(index, effect = effect.name(), "skipping effect: {}", reason);
                    working = buffer;
                    skipped.push(SkippedEffect {
                        index,
                        name: effect.name().to_string(),
                        reason,
                    });
                }
            }
        }

        Ok(ChainOutput {
            buffer: working,
            applied,
            skipped,
        })
    }
}

fn applying_status(effect: &Effect) -> String {
    format!("Applying: {}", effect.display_name())
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "effects processing panicked".to_string())
}

fn remove_partial(output: &Path) {
    if !output.exists() {
        return;
    }
    match fs::remove_file(output) {
        Ok(()) => debug!(path = %output.display(), "removed partial output"),
        Err(e) => error!(path = %output.display(), "could not remove partial output: {}", e),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::EffectSpec;
    use crate::engine::io::{generate_test_tone, DefaultCodec};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq)]
    enum Recorded {
        Progress(u8, String),
        Succeeded(String),
        Failed(String),
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<Recorded>>,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<Recorded> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ProgressSink for RecordingSink {
        fn report(&self, progress: u8, status: &str) {
            self.events
                .lock()
                .unwrap()
                .push(Recorded::Progress(progress, status.to_string()));
        }

        fn succeed(&self, result_ref: &str) {
            self.events
                .lock()
                .unwrap()
                .push(Recorded::Succeeded(result_ref.to_string()));
        }

        fn fail(&self, error: &MoodshiftError, _status: &str) {
            self.events
                .lock()
                .unwrap()
                .push(Recorded::Failed(error.error_code().to_string()));
        }
    }

    fn engine() -> EffectChainEngine {
        EffectChainEngine::new(Arc::new(DefaultCodec::default()))
    }

    #[test]
    fn test_effect_progress_checkpoints() {
        assert_eq!(effect_progress(0, 1), 10);
        assert_eq!(effect_progress(0, 2), 10);
        assert_eq!(effect_progress(1, 2), 45);
        assert_eq!(effect_progress(1, 3), 33);
        assert_eq!(effect_progress(2, 3), 56);
    }

    #[test]
    fn test_process_buffer_reports_each_effect() {
        let chain = EffectChain::new(vec![
            EffectSpec::new("gain").with_param("gain_db", -6.0),
            EffectSpec::new("high_pass_filter").with_param("cutoff_hz", 100.0),
        ]);
        let sink = RecordingSink::default();
        let buffer = generate_test_tone(440.0, 0.5, 0.2, 44100);

        let output = engine().process_buffer(buffer, &chain, &sink).unwrap();

        assert_eq!(output.applied, vec!["gain", "high_pass_filter"]);
        assert!(output.skipped.is_empty());
        assert_eq!(
            sink.events(),
            vec![
                Recorded::Progress(10, "Applying: Gain".to_string()),
                Recorded::Progress(45, "Applying: High Pass Filter".to_string()),
            ]
        );
    }

    #[test]
    fn test_unknown_and_invalid_effects_are_skipped() {
        let chain = EffectChain::new(vec![
            EffectSpec::new("unknown_effect"),
            EffectSpec::new("echo").with_param("decay_factor", 1.0),
            EffectSpec::new("gain").with_param("gain_db", 6.0),
        ]);
        let sink = RecordingSink::default();
        let buffer = generate_test_tone(440.0, 0.25, 0.1, 8000);

        let output = engine().process_buffer(buffer.clone(), &chain, &sink).unwrap();

        assert_eq!(output.applied, vec!["gain"]);
        assert_eq!(output.skipped.len(), 2);
        assert_eq!(output.skipped[0].reason.error_code(), "UNSUPPORTED_EFFECT");
        assert_eq!(output.skipped[1].reason.error_code(), "PARAMETER_VALIDATION");
        assert_eq!(output.buffer.len(), buffer.len());
        assert!(output.buffer.peak() > buffer.peak());

        let progress: Vec<u8> = sink
            .events()
            .into_iter()
            .filter_map(|event| match event {
                Recorded::Progress(p, _) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![10, 33, 56]);
    }

    #[test]
    fn test_missing_name_is_skipped_silently() {
        let chain = EffectChain::new(vec![
            EffectSpec::new(""),
            EffectSpec::new("gain").with_param("gain_db", -3.0),
        ]);
        let sink = RecordingSink::default();
        let buffer = generate_test_tone(440.0, 0.25, 0.1, 8000);

        let output = engine().process_buffer(buffer, &chain, &sink).unwrap();

        assert_eq!(output.skipped.len(), 1);
        assert_eq!(
            sink.events(),
            vec![Recorded::Progress(10, "Applying: Gain".to_string())]
        );
    }

    #[test]
    fn test_run_emits_full_sequence() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out").join("effects_x_in.wav");
        let codec = DefaultCodec::default();
        codec
            .export(&generate_test_tone(440.0, 0.5, 0.2, 22050), &input, OutputFormat::Wav)
            .unwrap();

        let chain = EffectChain::new(vec![EffectSpec::new("gain").with_param("gain_db", -6.0)]);
        let sink = RecordingSink::default();
        let report = engine()
            .run(&input, &output, OutputFormat::Wav, &chain, &sink)
            .unwrap();

        assert_eq!(report.result_ref, "effects_x_in.wav");
        assert!(output.exists());
        assert_eq!(
            sink.events(),
            vec![
                Recorded::Progress(5, STATUS_LOADING.to_string()),
                Recorded::Progress(10, "Applying: Gain".to_string()),
                Recorded::Progress(90, STATUS_EXPORTING.to_string()),
                Recorded::Succeeded("effects_x_in.wav".to_string()),
            ]
        );
    }

    #[test]
    fn test_run_decode_failure() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("broken.wav");
        fs::write(&input, b"definitely not audio").unwrap();
        let output = dir.path().join("out.wav");

        let sink = RecordingSink::default();
        let err = engine()
            .run(&input, &output, OutputFormat::Wav, &EffectChain::default(), &sink)
            .unwrap_err();

        assert_eq!(err.error_code(), "DECODE_ERROR");
        assert!(!output.exists());
        assert_eq!(
            sink.events(),
            vec![
                Recorded::Progress(5, STATUS_LOADING.to_string()),
                Recorded::Failed("DECODE_ERROR".to_string()),
            ]
        );
    }

    #[test]
    fn test_run_removes_partial_output_on_encode_failure() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.mp3");
        DefaultCodec::default()
            .export(&generate_test_tone(440.0, 0.5, 0.1, 8000), &input, OutputFormat::Wav)
            .unwrap();
        // Stale file at the destination
        fs::write(&output, b"partial").unwrap();

        let engine = EffectChainEngine::new(Arc::new(DefaultCodec::new(
            dir.path().join("no-such-ffmpeg"),
        )));
        let sink = RecordingSink::default();
        let err = engine
            .run(&input, &output, OutputFormat::Mp3, &EffectChain::default(), &sink)
            .unwrap_err();

        assert_eq!(err.error_code(), "ENCODE_ERROR");
        assert!(!output.exists());
        assert_eq!(
            sink.events().last(),
            Some(&Recorded::Failed("ENCODE_ERROR".to_string()))
        );
    }

    #[test]
    fn test_oversized_effect_aborts_run() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");
        DefaultCodec::default()
            .export(&generate_test_tone(440.0, 0.5, 0.1, 8000), &input, OutputFormat::Wav)
            .unwrap();

        let chain = EffectChain::new(vec![
            EffectSpec::new("speed_pitch").with_param("factor", 1e-300),
            EffectSpec::new("gain").with_param("gain_db", 3.0),
        ]);
        let sink = RecordingSink::default();
        let err = engine()
            .run(&input, &output, OutputFormat::Wav, &chain, &sink)
            .unwrap_err();

        assert_eq!(err.error_code(), "INTERNAL_ERROR");
        assert!(!output.exists());
        assert_eq!(
            sink.events(),
            vec![
                Recorded::Progress(5, STATUS_LOADING.to_string()),
                Recorded::Progress(10, "Applying: Speed Pitch".to_string()),
                Recorded::Failed("INTERNAL_ERROR".to_string()),
            ]
        );
    }

    /// Writes a partial file, then panics mid-export
    struct CrashingCodec;

    impl AudioCodec for CrashingCodec {
        fn load(&self, _path: &Path) -> Result<AudioBuffer> {
            Ok(generate_test_tone(440.0, 0.5, 0.1, 8000))
        }

        fn export(&self, _buffer: &AudioBuffer, path: &Path, _format: OutputFormat) -> Result<()> {
            fs::write(path, b"partial").unwrap();
            panic!("encoder crashed");
        }
    }

    #[test]
    fn test_codec_panic_becomes_internal_failure() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out.wav");
        let engine = EffectChainEngine::new(Arc::new(CrashingCodec));
        let sink = RecordingSink::default();

        let err = engine
            .run(
                &dir.path().join("in.wav"),
                &output,
                OutputFormat::Wav,
                &EffectChain::default(),
                &sink,
            )
            .unwrap_err();

        match &err {
            MoodshiftError::Internal { reason } => assert_eq!(reason, "encoder crashed"),
            other => panic!("expected Internal, got {:?}", other),
        }
        assert!(!output.exists());
        assert_eq!(
            sink.events().last(),
            Some(&Recorded::Failed("INTERNAL_ERROR".to_string()))
        );
    }
}
