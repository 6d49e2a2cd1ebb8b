//! Job Management Module
//!
//! Everything around a single engine run:
//! - Lifecycle state machine and snapshots
//! - Shared job store and progress sinks
//! - Worker pool dispatch
//! - Retention sweep of stored files

pub mod dispatcher;
pub mod retention;
pub mod state;
pub mod store;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MoodshiftError;

pub use dispatcher::{Dispatcher, Submission};
pub use retention::{sweep, sweep_config, RetentionSweeper, SweepReport};
pub use state::{JobEvent, JobPhase, JobState, JobStateMachine, JobStatus};
pub use store::{JobProgressSink, JobStore};

/// Unique job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for JobId {
    type Err = MoodshiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(JobId)
            .map_err(|_| MoodshiftError::JobNotFound {
                job_id: s.to_string(),
            })
    }
}
