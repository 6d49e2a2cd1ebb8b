//! Job lifecycle state machine
//!
//! `Pending -> Running -> Succeeded | Failed`. Running accepts progress
//! updates as a self-transition; the two terminal states accept nothing.
//! Progress is clamped to `0..=100` and never moves backwards.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::processor::STATUS_DONE;
use crate::error::{MoodshiftError, Result};
use crate::jobs::JobId;

/// Status text of a job nobody has picked up yet
pub const STATUS_PENDING: &str = "Task is pending or not yet started.";

/// Status text when a worker first picks up a job
pub const STATUS_STARTED: &str = "Initializing effects processing...";

const PROGRESS_STARTED: u8 = 1;

/// Current lifecycle state of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running { progress: u8, status: String },
    Succeeded { result_ref: String },
    Failed { error: String, status: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded { .. } | JobState::Failed { .. })
    }

    pub fn phase(&self) -> JobPhase {
        match self {
            JobState::Pending => JobPhase::Pending,
            JobState::Running { .. } => JobPhase::Running,
            JobState::Succeeded { .. } => JobPhase::Succeeded,
            JobState::Failed { .. } => JobPhase::Failed,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running { .. } => "running",
            JobState::Succeeded { .. } => "succeeded",
            JobState::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle phase without payload, as reported in [`JobStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Succeeded | JobPhase::Failed)
    }
}

/// Input to [`JobStateMachine::apply`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// A worker picked the job up
    Started,
    Progress { progress: u8, status: String },
    Succeeded { result_ref: String },
    Failed { error: String, status: String },
}

impl JobEvent {
    pub fn progress(progress: u8, status: impl Into<String>) -> Self {
        JobEvent::Progress {
            progress,
            status: status.into(),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            JobEvent::Started => "started",
            JobEvent::Progress { .. } => "progress",
            JobEvent::Succeeded { .. } => "succeeded",
            JobEvent::Failed { .. } => "failed",
        }
    }
}

/// Point-in-time view of a job, as returned by status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: JobId,
    pub state: JobPhase,
    pub progress: u8,
    pub status_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of one job
#[derive(Debug, Clone)]
pub struct JobStateMachine {
    job_id: JobId,
    state: JobState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobStateMachine {
    pub fn new(job_id: JobId) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            state: JobState::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply one event
    ///
    /// Terminal states reject every event. `Progress`, `Succeeded` and
    /// `Failed` on a pending job imply the job was started.
    pub fn apply(&mut self, event: JobEvent) -> Result<()> {
        if self.state.is_terminal() {
            return Err(self.reject(&event));
        }

        let next = match (&self.state, event) {
            (JobState::Pending, JobEvent::Started) => JobState::Running {
                progress: PROGRESS_STARTED,
                status: STATUS_STARTED.to_string(),
            },
            (JobState::Running { .. }, JobEvent::Started) => {
                return Err(self.reject(&JobEvent::Started));
            }
            (current, JobEvent::Progress { progress, status }) => {
                let previous = match current {
                    JobState::Running { progress, .. } => *progress,
                    _ => 0,
                };
                JobState::Running {
                    progress: progress.min(100).max(previous),
                    status,
                }
            }
            (_, JobEvent::Succeeded { result_ref }) => JobState::Succeeded { result_ref },
            (_, JobEvent::Failed { error, status }) => JobState::Failed { error, status },
            (_, event) => return Err(self.reject(&event)),
        };

        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn reject(&self, event: &JobEvent) -> MoodshiftError {
        MoodshiftError::InvalidTransition {
            from: self.state.to_string(),
            event: event.label().to_string(),
        }
    }

    pub fn snapshot(&self) -> JobStatus {
        let (progress, status_message, result_ref, error) = match &self.state {
            JobState::Pending => (0, STATUS_PENDING.to_string(), None, None),
            JobState::Running { progress, status } => (*progress, status.clone(), None, None),
            JobState::Succeeded { result_ref } => {
                (100, STATUS_DONE.to_string(), Some(result_ref.clone()), None)
            }
            JobState::Failed { error, status } => (0, status.clone(), None, Some(error.clone())),
        };

        JobStatus {
            job_id: self.job_id,
            state: self.state.phase(),
            progress,
            status_message,
            result_ref,
            error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn machine() -> JobStateMachine {
        JobStateMachine::new(JobId::new())
    }

    #[test]
    fn test_initial_state_is_pending() {
        let job = machine();
        let status = job.snapshot();
        assert_eq!(status.state, JobPhase::Pending);
        assert_eq!(status.progress, 0);
        assert_eq!(status.status_message, STATUS_PENDING);
    }

    #[test]
    fn test_happy_path() {
        let mut job = machine();
        job.apply(JobEvent::Started).unwrap();
        assert_eq!(job.snapshot().progress, 1);
        assert_eq!(job.snapshot().status_message, STATUS_STARTED);
        job.apply(JobEvent::progress(5, "Loading audio...")).unwrap();
        job.apply(JobEvent::progress(90, "Exporting file...")).unwrap();
        job.apply(JobEvent::Succeeded {
            result_ref: "effects_1_song.wav".to_string(),
        })
        .unwrap();

        let status = job.snapshot();
        assert_eq!(status.state, JobPhase::Succeeded);
        assert_eq!(status.progress, 100);
        assert_eq!(status.result_ref.as_deref(), Some("effects_1_song.wav"));
        assert_eq!(status.status_message, STATUS_DONE);
        assert!(job.is_terminal());
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut job = machine();
        job.apply(JobEvent::progress(45, "Applying: Echo")).unwrap();
        job.apply(JobEvent::progress(10, "Applying: Gain")).unwrap();

        assert_eq!(
            job.state(),
            &JobState::Running {
                progress: 45,
                status: "Applying: Gain".to_string()
            }
        );
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut job = machine();
        job.apply(JobEvent::progress(250, "overflow")).unwrap();
        assert_eq!(job.snapshot().progress, 100);
    }

    #[test]
    fn test_terminal_states_reject_events() {
        let mut job = machine();
        job.apply(JobEvent::Started).unwrap();
        job.apply(JobEvent::Failed {
            error: "bad header".to_string(),
            status: "Error applying effects: bad header".to_string(),
        })
        .unwrap();

        let err = job.apply(JobEvent::progress(50, "late")).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TRANSITION");
        assert!(job
            .apply(JobEvent::Succeeded {
                result_ref: "x.wav".to_string()
            })
            .is_err());

        let status = job.snapshot();
        assert_eq!(status.progress, 0);
        assert_eq!(status.error.as_deref(), Some("bad header"));
    }

    #[test]
    fn test_started_twice_is_rejected() {
        let mut job = machine();
        job.apply(JobEvent::Started).unwrap();
        assert!(job.apply(JobEvent::Started).is_err());
    }

    #[test]
    fn test_snapshot_serializes_with_state_tag() {
        let mut job = machine();
        job.apply(JobEvent::progress(33, "Applying: Reverb")).unwrap();
        let json = serde_json::to_value(job.snapshot()).unwrap();

        assert_eq!(json["state"], "running");
        assert_eq!(json["progress"], 33);
        assert_eq!(json["status_message"], "Applying: Reverb");
        assert!(json.get("result_ref").is_none());
    }
}
