//! Job dispatcher
//!
//! A fixed pool of worker threads consumes submitted jobs from a crossbeam
//! channel. Each job runs to a terminal state on exactly one worker; the
//! uploaded input is removed afterwards whatever the outcome.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::dsp::EffectChain;
use crate::engine::io::{AudioCodec, OutputFormat};
use crate::engine::processor::{EffectChainEngine, ProgressSink};
use crate::error::{MoodshiftError, Result};
use crate::jobs::state::{JobEvent, JobStatus};
use crate::jobs::store::{JobProgressSink, JobStore};
use crate::jobs::JobId;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Fallback stem when an upload name sanitizes to nothing
const DEFAULT_STEM: &str = "audio";

/// A request to process one staged upload
#[derive(Debug, Clone)]
pub struct Submission {
    /// Staged input file, owned by the job from now on
    pub input_path: PathBuf,
    /// Client-side file name, used to name the output
    pub original_name: String,
    pub output_format: OutputFormat,
    pub chain: EffectChain,
}

struct QueuedJob {
    job_id: JobId,
    input_path: PathBuf,
    output_path: PathBuf,
    format: OutputFormat,
    chain: EffectChain,
}

pub struct Dispatcher {
    config: Config,
    store: JobStore,
    sender: Option<Sender<QueuedJob>>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Start `config.worker_count` workers sharing one engine
    pub fn new(config: Config, codec: Arc<dyn AudioCodec>) -> Result<Self> {
        Self::with_store(config, codec, JobStore::new())
    }

    pub fn with_store(config: Config, codec: Arc<dyn AudioCodec>, store: JobStore) -> Result<Self> {
        config.validate()?;
        config.ensure_dirs()?;

        let engine = EffectChainEngine::new(codec);
        let (sender, receiver) = channel::unbounded::<QueuedJob>();

        let mut workers = Vec::with_capacity(config.worker_count);
        for index in 0..config.worker_count {
            let receiver = receiver.clone();
            let store = store.clone();
            let engine = engine.clone();
            let handle = thread::Builder::new()
                .name(format!("moodshift-worker-{}", index))
                .spawn(move || worker_loop(index, receiver, store, engine))?;
            workers.push(handle);
        }

        info!(workers = workers.len(), "dispatcher started");
        Ok(Self {
            config,
            store,
            sender: Some(sender),
            workers,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Copy a client file into the upload folder as `{uuid}_input.{ext}`
    ///
    /// The extension must be allowed, the size within limits and the
    /// header must look like a supported audio container.
    pub fn stage_upload(&self, source: &Path, original_name: &str) -> Result<PathBuf> {
        let name = sanitize_filename(original_name);
        let ext = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .filter(|e| self.config.is_allowed_extension(e))
            .ok_or_else(|| MoodshiftError::InvalidUpload {
                reason: "File extension not allowed.".to_string(),
            })?;

        let metadata = fs::metadata(source).map_err(|_| MoodshiftError::FileNotFound {
            path: source.to_path_buf(),
        })?;
        if metadata.len() > self.config.max_content_length {
            return Err(MoodshiftError::InvalidUpload {
                reason: format!(
                    "File is {} bytes, limit is {} bytes.",
                    metadata.len(),
                    self.config.max_content_length
                ),
            });
        }

        let mut header = Vec::with_capacity(HEADER_LEN);
        File::open(source)?
            .take(HEADER_LEN as u64)
            .read_to_end(&mut header)?;
        if !looks_like_audio(&header) {
            warn!(name = %name, "upload rejected: unrecognized content");
            return Err(MoodshiftError::InvalidUpload {
                reason: "File content type not allowed.".to_string(),
            });
        }

        let staged = self
            .config
            .upload_dir
            .join(format!("{}_input.{}", Uuid::new_v4().simple(), ext));
        fs::copy(source, &staged)?;
        info!(original = %name, staged = %staged.display(), "upload staged");
        Ok(staged)
    }

    /// Register a job and queue it for the worker pool
    pub fn submit(&self, submission: Submission) -> Result<JobId> {
        let sender = self.sender.as_ref().ok_or(MoodshiftError::QueueClosed)?;

        let job_id = self.store.create();
        let output_path = self
            .config
            .processed_dir
            .join(output_file_name(job_id, &submission.original_name, submission.output_format));

        let job = QueuedJob {
            job_id,
            input_path: submission.input_path,
            output_path,
            format: submission.output_format,
            chain: submission.chain,
        };

        if sender.send(job).is_err() {
            self.store.remove(job_id);
            return Err(MoodshiftError::QueueClosed);
        }

        info!(
            %job_id,
            original = %submission.original_name,
            format = %submission.output_format,
            "job submitted"
        );
        Ok(job_id)
    }

    pub fn get_status(&self, job_id: JobId) -> Result<JobStatus> {
        self.store.status(job_id)
    }

    /// Open a finished output artifact by its result reference
    pub fn download(&self, result_ref: &str) -> Result<File> {
        if !is_plain_file_name(result_ref) {
            warn!(result_ref, "download rejected: not a plain file name");
            return Err(MoodshiftError::FileNotFound {
                path: PathBuf::from(result_ref),
            });
        }

        let path = self.config.processed_dir.join(result_ref);
        File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MoodshiftError::FileNotFound { path },
            _ => MoodshiftError::Io(e),
        })
    }

    /// Poll until the job is terminal or `timeout` elapses
    ///
    /// Returns the latest snapshot either way.
    pub fn wait(&self, job_id: JobId, timeout: Duration) -> Result<JobStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.store.status(job_id)?;
            if status.state.is_terminal() || Instant::now() >= deadline {
                return Ok(status);
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    /// Close the queue and join the workers after they drain it
    pub fn shutdown(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }
        info!("dispatcher stopped");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Worker
// ============================================================================

fn worker_loop(index: usize, receiver: Receiver<QueuedJob>, store: JobStore, engine: EffectChainEngine) {
    debug!(worker = index, "worker started");
    for job in receiver.iter() {
        run_job(&store, &engine, job);
    }
    debug!(worker = index, "worker stopped");
}

fn run_job(store: &JobStore, engine: &EffectChainEngine, job: QueuedJob) {
    let job_id = job.job_id;
    info!(%job_id, "job started");
    if let Err(e) = store.apply(job_id, JobEvent::Started) {
        warn!(%job_id, "could not mark job running: {}", e);
    }

    // The engine turns panics into an `Internal` failure and removes any
    // partial output itself
    let sink = WorkerSink::new(store.sink(job_id));
    match engine.run(&job.input_path, &job.output_path, job.format, &job.chain, &sink) {
        Ok(report) => info!(%job_id, result = %report.result_ref, "job succeeded"),
        Err(e) => warn!(%job_id, code = e.error_code(), "job failed"),
    }

    remove_input(job_id, &job.input_path);
    sink.publish_terminal();
}

/// Forwards progress immediately and holds the terminal event until the
/// worker has cleaned up the job's input
struct WorkerSink {
    inner: JobProgressSink,
    terminal: Mutex<Option<JobEvent>>,
}

impl WorkerSink {
    fn new(inner: JobProgressSink) -> Self {
        Self {
            inner,
            terminal: Mutex::new(None),
        }
    }

    fn hold(&self, event: JobEvent) {
        let mut slot = self.terminal.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_none() {
            *slot = Some(event);
        }
    }

    fn publish_terminal(&self) {
        let event = self.terminal.lock().unwrap_or_else(|p| p.into_inner()).take();
        match event {
            Some(JobEvent::Succeeded { result_ref }) => self.inner.succeed(&result_ref),
            Some(JobEvent::Failed { error, status }) => self.inner.fail_with(error, status),
            Some(other) => warn!(job_id = %self.inner.job_id(), "unexpected held event: {:?}", other),
            None => {}
        }
    }
}

impl ProgressSink for WorkerSink {
    fn report(&self, progress: u8, status: &str) {
        self.inner.report(progress, status);
    }

    fn succeed(&self, result_ref: &str) {
        self.hold(JobEvent::Succeeded {
            result_ref: result_ref.to_string(),
        });
    }

    fn fail(&self, error: &MoodshiftError, status: &str) {
        self.hold(JobEvent::Failed {
            error: error.to_string(),
            status: status.to_string(),
        });
    }
}

fn remove_input(job_id: JobId, path: &Path) {
    if !path.exists() {
        return;
    }
    match fs::remove_file(path) {
        Ok(()) => debug!(%job_id, path = %path.display(), "removed uploaded input"),
        Err(e) => error!(%job_id, path = %path.display(), "could not remove uploaded input: {}", e),
    }
}

// ============================================================================
// File Names
// ============================================================================

const HEADER_LEN: usize = 12;

/// `effects_{job}_{stem}.{ext}`
fn output_file_name(job_id: JobId, original_name: &str, format: OutputFormat) -> String {
    let sanitized = sanitize_filename(original_name);
    let stem = Path::new(&sanitized)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_STEM);
    format!("effects_{}_{}.{}", job_id, stem, format.extension())
}

/// Reduce a client file name to ASCII letters, digits, `.`, `-` and `_`
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(name);
    let replaced: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    replaced.trim_matches(|c| c == '.' || c == '_').to_string()
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c| c == '/' || c == '\\')
        && !name.contains('\0')
}

/// Container signatures of the accepted upload formats
fn looks_like_audio(header: &[u8]) -> bool {
    let starts = |magic: &[u8]| header.starts_with(magic);
    (starts(b"RIFF") && header.get(8..12) == Some(b"WAVE".as_slice()))
        || starts(b"ID3")
        || starts(b"fLaC")
        || starts(b"OggS")
        || header.get(4..8) == Some(b"ftyp".as_slice())
        || (header.len() >= 2 && header[0] == 0xFF && header[1] & 0xE0 == 0xE0)
}
