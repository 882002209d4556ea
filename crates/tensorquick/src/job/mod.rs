//! Job lifecycle: state machine, single-flight registry and caller handles.

pub mod handle;
pub mod registry;
pub mod state;

use serde::{Deserialize, Serialize};

pub use handle::{JobControl, JobHandle, JobReporter};
pub use registry::{JobKey, JobRegistry, JobTicket};
pub use state::{JobPayload, JobState};

/// What a job does.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Deploy,
    Stop,
    Generate,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Deploy => write!(f, "deploy"),
            JobKind::Stop => write!(f, "stop"),
            JobKind::Generate => write!(f, "generate"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Idle => write!(f, "Idle"),
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Completed => write!(f, "Completed"),
            JobStatus::Error => write!(f, "Error"),
        }
    }
}
