//! Job events: progress updates followed by exactly one terminal outcome.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::JobError;
use crate::job::{JobKind, JobPayload, JobStatus};

/// Progress update for a running job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub job_id: String,
    pub target_id: String,
    pub kind: JobKind,
    /// Overall progress, 0-100. Never decreases within a job.
    pub percent: u8,
    /// Name of the milestone that produced this update, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl JobProgress {
    pub fn new(job_id: &str, target_id: &str, kind: JobKind, percent: u8) -> Self {
        Self {
            job_id: job_id.to_string(),
            target_id: target_id.to_string(),
            kind,
            percent,
            milestone: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_milestone(mut self, milestone: impl Into<String>) -> Self {
        self.milestone = Some(milestone.into());
        self
    }
}

/// Terminal outcome of a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub job_id: String,
    pub target_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub success: bool,
    pub payload: JobPayload,
    /// Empty on success.
    pub error: String,
    /// True if the job ended because it was cancelled.
    #[serde(default)]
    pub cancelled: bool,
    pub timestamp: DateTime<Utc>,
}

impl JobOutcome {
    /// Creates a success outcome.
    pub fn succeeded(job_id: &str, target_id: &str, kind: JobKind, payload: JobPayload) -> Self {
        Self {
            job_id: job_id.to_string(),
            target_id: target_id.to_string(),
            kind,
            status: JobStatus::Completed,
            success: true,
            payload,
            error: String::new(),
            cancelled: false,
            timestamp: Utc::now(),
        }
    }

    /// Creates a failure outcome.
    pub fn failed(job_id: &str, target_id: &str, kind: JobKind, err: &JobError) -> Self {
        Self {
            job_id: job_id.to_string(),
            target_id: target_id.to_string(),
            kind,
            status: JobStatus::Error,
            success: false,
            payload: JobPayload::None,
            error: err.to_string(),
            cancelled: err.is_cancellation(),
            timestamp: Utc::now(),
        }
    }

    pub fn from_result(
        job_id: &str,
        target_id: &str,
        kind: JobKind,
        result: &Result<JobPayload, JobError>,
    ) -> Self {
        match result {
            Ok(payload) => Self::succeeded(job_id, target_id, kind, payload.clone()),
            Err(err) => Self::failed(job_id, target_id, kind, err),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Progress(JobProgress),
    Finished(JobOutcome),
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Progress(p) => &p.job_id,
            JobEvent::Finished(o) => &o.job_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Finished(_))
    }
}

/// Fans job events out to any number of observers.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
}

impl JobEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: JobEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}
