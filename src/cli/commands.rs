//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::Config;
use crate::dsp::EffectChain;
use crate::engine::{DefaultCodec, OutputFormat};
use crate::error::{MoodshiftError, Result};
use crate::jobs::{self, Dispatcher, JobPhase, JobStatus, Submission, SweepReport};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Load the config file if given, otherwise read the environment
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            info!("Loading config: {}", path.display());
            Config::from_file(path)
        }
        None => Ok(Config::from_env()),
    }
}

/// Parse `--chain`: inline JSON, or `@path` to a JSON file
pub fn parse_chain_arg(arg: &str) -> Result<EffectChain> {
    match arg.strip_prefix('@') {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|e| MoodshiftError::InvalidChain {
                reason: format!("cannot read {}: {}", path, e),
            })?;
            EffectChain::from_json(&content)
        }
        None => EffectChain::from_json(arg),
    }
}

/// Stage, submit and follow one file until it finishes
pub fn process(
    mut config: Config,
    input: &Path,
    format: &str,
    chain_arg: &str,
    out_dir: Option<&Path>,
    timeout: Duration,
) -> Result<JobStatus> {
    let chain = parse_chain_arg(chain_arg)?;
    let output_format = OutputFormat::parse_or_default(format);
    if output_format.extension() != format.to_ascii_lowercase() {
        warn!("Unknown output format '{}', using {}", format, output_format);
    }

    if let Some(dir) = out_dir {
        config.processed_dir = dir.to_path_buf();
    }
    config.worker_count = 1;

    let original_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| MoodshiftError::FileNotFound {
            path: input.to_path_buf(),
        })?;

    let effect_count = chain.len();
    let codec = Arc::new(DefaultCodec::new(config.ffmpeg_binary.clone()));
    let dispatcher = Dispatcher::new(config, codec)?;
    let staged = dispatcher.stage_upload(input, &original_name)?;

    let job_id = dispatcher.submit(Submission {
        input_path: staged,
        original_name,
        output_format,
        chain,
    })?;
    println!("Job {} submitted ({} effects)", job_id, effect_count);

    let deadline = Instant::now() + timeout;
    let mut last_seen: Option<(u8, String)> = None;
    loop {
        let status = dispatcher.get_status(job_id)?;
        let current = (status.progress, status.status_message.clone());
        if last_seen.as_ref() != Some(&current) {
            println!("[{:>3}%] {}", status.progress, status.status_message);
            last_seen = Some(current);
        }

        if status.state.is_terminal() {
            println!("{}", serde_json::to_string_pretty(&status)?);
            if let Some(result_ref) = &status.result_ref {
                let path = dispatcher.config().processed_dir.join(result_ref);
                println!("Output: {}", path.display());
            }
            return Ok(status);
        }
        if Instant::now() >= deadline {
            return Err(MoodshiftError::Internal {
                reason: format!("job {} did not finish within {:?}", job_id, timeout),
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// One-shot retention sweep over the configured folders
pub fn sweep(mut config: Config, max_age_days: Option<u64>) -> Result<SweepReport> {
    if let Some(days) = max_age_days {
        config.cleanup_max_age_days = days;
    }
    let report = jobs::sweep_config(&config, None);
    println!(
        "Cleaned up {} files older than {} days.",
        report.deleted_count(),
        config.cleanup_max_age_days
    );
    if report.errors > 0 {
        println!("{} files could not be removed.", report.errors);
    }
    Ok(report)
}

/// A supported effect and the domain of its parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectInfo {
    pub name: &'static str,
    pub params: &'static [(&'static str, &'static str)],
}

pub fn effect_catalog() -> &'static [EffectInfo] {
    &[
        EffectInfo {
            name: "gain",
            params: &[("gain_db", "any number, default 0")],
        },
        EffectInfo {
            name: "high_pass_filter",
            params: &[("cutoff_hz", "0 < hz < nyquist, default 80")],
        },
        EffectInfo {
            name: "low_pass_filter",
            params: &[("cutoff_hz", "0 < hz < nyquist, default 5000")],
        },
        EffectInfo {
            name: "speed_pitch",
            params: &[("factor", "> 0, default 1.0")],
        },
        EffectInfo {
            name: "echo",
            params: &[
                ("delay_ms", "> 0, default 500"),
                ("decay_factor", "0 < d < 1, default 0.5"),
            ],
        },
        EffectInfo {
            name: "reverb",
            params: &[
                ("wet_level", "0..=1, default 0.3"),
                ("room_size", "0..=1, default 0.5"),
            ],
        },
    ]
}

pub fn list_effects() -> Result<()> {
    println!("Supported effects:");
    println!("{:-<60}", "");
    for effect in effect_catalog() {
        println!("{}", effect.name);
        for (param, domain) in effect.params {
            println!("    {:<14} {}", param, domain);
        }
    }
    println!();
    println!(
        "Output formats: {}",
        OutputFormat::ALL
            .iter()
            .map(|f| f.extension())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}

/// Exit status for a finished job
pub fn succeeded(status: &JobStatus) -> bool {
    status.state == JobPhase::Succeeded
}
