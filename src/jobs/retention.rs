//! Retention sweep
//!
//! Removes stored uploads and outputs whose modification time is older
//! than a configured age. Only the top level of each folder is visited.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::Result;
use crate::jobs::store::JobStore;

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: Vec<PathBuf>,
    /// Files or folders that could not be inspected or removed
    pub errors: usize,
}

impl SweepReport {
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }
}

/// Delete regular files in `dirs` last modified more than `max_age` ago
///
/// Missing folders are skipped with a warning. Per-file failures are
/// logged and counted.
pub fn sweep<P: AsRef<Path>>(dirs: &[P], max_age: Duration) -> SweepReport {
    let now = SystemTime::now();
    let cutoff = now.checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);
    info!(max_age_secs = max_age.as_secs(), "running retention sweep");

    let mut report = SweepReport::default();
    for dir in dirs {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            warn!(folder = %dir.display(), "retention: folder does not exist, skipping");
            continue;
        }

        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    error!(folder = %dir.display(), "retention: could not list entry: {}", e);
                    report.errors += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let modified = match entry.metadata().map(|m| m.modified()) {
                Ok(Ok(modified)) => modified,
                Ok(Err(e)) => {
                    error!(path = %path.display(), "retention: no modification time: {}", e);
                    report.errors += 1;
                    continue;
                }
                Err(e) => {
                    error!(path = %path.display(), "retention: could not stat: {}", e);
                    report.errors += 1;
                    continue;
                }
            };
            if modified >= cutoff {
                continue;
            }

            match fs::remove_file(path) {
                Ok(()) => {
                    info!(path = %path.display(), "retention: deleted old file");
                    report.deleted.push(path.to_path_buf());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(path = %path.display(), "retention: file vanished before deletion");
                }
                Err(e) => {
                    error!(path = %path.display(), "retention: could not delete: {}", e);
                    report.errors += 1;
                }
            }
        }
    }

    info!(
        deleted = report.deleted_count(),
        errors = report.errors,
        "retention sweep finished"
    );
    report
}

/// Sweep the folders of `config` and drop job records of deleted outputs
pub fn sweep_config(config: &Config, store: Option<&JobStore>) -> SweepReport {
    let report = sweep(
        &[&config.upload_dir, &config.processed_dir],
        config.cleanup_max_age(),
    );

    if let Some(store) = store {
        for path in &report.deleted {
            if !path.starts_with(&config.processed_dir) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                let forgotten = store.forget_result(name);
                if forgotten > 0 {
                    debug!(result = name, forgotten, "retention: dropped job records");
                }
            }
        }
    }
    report
}

/// Background thread running [`sweep_config`] every `cleanup_interval`
pub struct RetentionSweeper {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RetentionSweeper {
    pub fn spawn(config: Config, store: Option<JobStore>) -> Result<Self> {
        config.validate()?;
        let (stop, stop_rx) = channel::bounded::<()>(1);
        let interval = config.cleanup_interval();

        let handle = thread::Builder::new()
            .name("moodshift-retention".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        sweep_config(&config, store.as_ref());
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        info!(interval_secs = interval.as_secs(), "retention sweeper started");
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("retention sweeper panicked");
            }
        }
    }
}

impl Drop for RetentionSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
