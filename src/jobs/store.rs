//! Shared job state store
//!
//! A cloneable handle over one map of job id to [`JobStateMachine`].
//! Workers write through a [`JobProgressSink`]; callers read snapshots.
//! Writes are last-write-wins per job and readers never see progress go
//! backwards.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::engine::processor::ProgressSink;
use crate::error::{MoodshiftError, Result};
use crate::jobs::state::{JobEvent, JobStateMachine, JobStatus};
use crate::jobs::JobId;

#[derive(Debug, Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<JobId, JobStateMachine>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, JobStateMachine>> {
        // Recover the map from a poisoned lock
        self.jobs.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, JobStateMachine>> {
        self.jobs.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new pending job
    pub fn create(&self) -> JobId {
        let job_id = JobId::new();
        self.write().insert(job_id, JobStateMachine::new(job_id));
        debug!(%job_id, "job registered");
        job_id
    }

    pub fn apply(&self, job_id: JobId, event: JobEvent) -> Result<()> {
        let mut jobs = self.write();
        let job = jobs.get_mut(&job_id).ok_or_else(|| MoodshiftError::JobNotFound {
            job_id: job_id.to_string(),
        })?;
        job.apply(event)
    }

    pub fn status(&self, job_id: JobId) -> Result<JobStatus> {
        self.read()
            .get(&job_id)
            .map(JobStateMachine::snapshot)
            .ok_or_else(|| MoodshiftError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }

    /// Drop a job record; returns whether it existed
    pub fn remove(&self, job_id: JobId) -> bool {
        self.write().remove(&job_id).is_some()
    }

    /// Drop every terminal job whose result is `result_ref`
    pub fn forget_result(&self, result_ref: &str) -> usize {
        let mut jobs = self.write();
        let before = jobs.len();
        jobs.retain(|_, job| job.snapshot().result_ref.as_deref() != Some(result_ref));
        before - jobs.len()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn sink(&self, job_id: JobId) -> JobProgressSink {
        JobProgressSink {
            store: self.clone(),
            job_id,
        }
    }
}

/// [`ProgressSink`] that writes one job's events into a [`JobStore`]
#[derive(Debug, Clone)]
pub struct JobProgressSink {
    store: JobStore,
    job_id: JobId,
}

impl JobProgressSink {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Terminal failure with an already rendered error
    pub fn fail_with(&self, error: String, status: String) {
        self.push(JobEvent::Failed { error, status });
    }

    fn push(&self, event: JobEvent) {
        if let Err(e) = self.store.apply(self.job_id, event) {
            warn!(job_id = %self.job_id, "dropping job event: {}", e);
        }
    }
}

impl ProgressSink for JobProgressSink {
    fn report(&self, progress: u8, status: &str) {
        debug!(job_id = %self.job_id, progress, status, "progress");
        self.push(JobEvent::progress(progress, status));
    }

    fn succeed(&self, result_ref: &str) {
        self.push(JobEvent::Succeeded {
            result_ref: result_ref.to_string(),
        });
    }

    fn fail(&self, error: &MoodshiftError, status: &str) {
        self.fail_with(error.to_string(), status.to_string());
    }
}
