use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobKind, JobStatus};
use crate::error::JobError;
use crate::store::ModelRecord;

/// What a successful job produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum JobPayload {
    #[default]
    None,
    /// Deploy: the record with its deployed URL. Stop: the removed record.
    Model(ModelRecord),
    /// Generate: where the image was written.
    Output(PathBuf),
}

impl JobPayload {
    pub fn model(&self) -> Option<&ModelRecord> {
        match self {
            JobPayload::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn output_path(&self) -> Option<&PathBuf> {
        match self {
            JobPayload::Output(path) => Some(path),
            _ => None,
        }
    }
}

/// Lifecycle of a single job.
///
/// `Idle -> Running -> {Completed, Error}`. Terminal states can be restarted
/// with [`JobState::begin`]. Progress never decreases while running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobState {
    pub target_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: u8,
    pub cancelling: bool,
    pub result: JobPayload,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobState {
    pub fn new(target_id: &str, kind: JobKind) -> Self {
        Self {
            target_id: target_id.to_string(),
            kind,
            status: JobStatus::Idle,
            progress: 0,
            cancelling: false,
            result: JobPayload::None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }

    /// Enters `Running`, clearing any previous outcome.
    pub fn begin(&mut self) -> Result<(), JobError> {
        if self.is_running() {
            return Err(JobError::AlreadyRunning {
                target_id: self.target_id.clone(),
                kind: self.kind,
            });
        }

        self.status = JobStatus::Running;
        self.progress = 0;
        self.cancelling = false;
        self.result = JobPayload::None;
        self.error = None;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
        Ok(())
    }

    /// Records progress, keeping the maximum seen so far. Returns the
    /// effective percentage, or `None` if the job is not running.
    pub fn advance(&mut self, percent: u8) -> Option<u8> {
        if !self.is_running() {
            return None;
        }
        self.progress = self.progress.max(percent.min(100));
        Some(self.progress)
    }

    pub fn mark_cancelling(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.cancelling = true;
        true
    }

    /// `Running -> Completed`. A deploy must carry a model with a deployed
    /// URL; without one the job ends in `Error` with [`JobError::NoResult`].
    pub fn complete(&mut self, payload: JobPayload) -> Result<(), JobError> {
        self.ensure_running("Completed")?;

        if self.kind == JobKind::Deploy {
            let has_url = payload.model().map(|m| m.is_deployed()).unwrap_or(false);
            if !has_url {
                let err = JobError::NoResult(self.target_id.clone());
                self.fail(&err)?;
                return Err(err);
            }
        }

        self.status = JobStatus::Completed;
        self.progress = 100;
        self.result = payload;
        self.error = None;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// `Running -> Error`.
    pub fn fail(&mut self, err: &JobError) -> Result<(), JobError> {
        self.ensure_running("Error")?;

        self.status = JobStatus::Error;
        self.result = JobPayload::None;
        self.error = Some(err.to_string());
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Applies a worker's result and returns the outcome that was recorded,
    /// which differs from the input when a completion is rejected.
    pub fn settle(
        &mut self,
        result: Result<JobPayload, JobError>,
    ) -> Result<JobPayload, JobError> {
        match result {
            Ok(payload) => {
                self.complete(payload)?;
                Ok(self.result.clone())
            }
            Err(err) => {
                self.fail(&err)?;
                Err(err)
            }
        }
    }

    fn ensure_running(&self, to: &str) -> Result<(), JobError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(JobError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            })
        }
    }
}

/// Locks shared job state, recovering from a poisoned lock.
pub(crate) fn lock_state(state: &Mutex<JobState>) -> MutexGuard<'_, JobState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Job state lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(kind: JobKind) -> JobState {
        let mut state = JobState::new("flux-1-dev", kind);
        state.begin().unwrap();
        state
    }

    #[test]
    fn test_begin_rejects_running() {
        let mut state = running(JobKind::Deploy);
        let err = state.begin().unwrap_err();
        assert!(matches!(err, JobError::AlreadyRunning { kind: JobKind::Deploy, .. }));
        assert!(state.is_running());
    }

    #[test]
    fn test_terminal_states_restart() {
        let mut state = running(JobKind::Stop);
        state.fail(&JobError::Cancelled).unwrap();
        assert_eq!(state.status, JobStatus::Error);

        state.begin().unwrap();
        assert_eq!(state.status, JobStatus::Running);
        assert!(state.error.is_none());
        assert_eq!(state.progress, 0);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut state = running(JobKind::Deploy);
        assert_eq!(state.advance(20), Some(20));
        assert_eq!(state.advance(60), Some(60));
        assert_eq!(state.advance(40), Some(60));
        assert_eq!(state.advance(250), Some(100));
    }

    #[test]
    fn test_advance_ignored_when_idle() {
        let mut state = JobState::new("x", JobKind::Deploy);
        assert_eq!(state.advance(20), None);
        assert_eq!(state.progress, 0);
    }

    #[test]
    fn test_deploy_requires_url() {
        let mut state = running(JobKind::Deploy);
        let err = state
            .complete(JobPayload::Model(ModelRecord::new("flux-1-dev", "Flux")))
            .unwrap_err();

        assert_eq!(err, JobError::NoResult("flux-1-dev".to_string()));
        assert_eq!(state.status, JobStatus::Error);
        assert!(state.error.as_deref().unwrap().contains("flux-1-dev"));
    }

    #[test]
    fn test_deploy_completes_with_url() {
        let mut state = running(JobKind::Deploy);
        let model = ModelRecord::new("flux-1-dev", "Flux").with_deployed_url("https://x.modal.run");
        state.complete(JobPayload::Model(model.clone())).unwrap();

        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.progress, 100);
        assert_eq!(state.result.model(), Some(&model));
        assert!(state.finished_at.is_some());
    }

    #[test]
    fn test_generate_completes_with_path() {
        let mut state = running(JobKind::Generate);
        state
            .complete(JobPayload::Output(PathBuf::from("/tmp/a.jpg")))
            .unwrap();
        assert_eq!(state.status, JobStatus::Completed);
    }

    #[test]
    fn test_settle_reports_rejected_completion() {
        let mut state = running(JobKind::Deploy);
        let outcome = state.settle(Ok(JobPayload::None));
        assert!(matches!(outcome, Err(JobError::NoResult(_))));
    }

    #[test]
    fn test_invalid_transition() {
        let mut state = JobState::new("x", JobKind::Generate);
        let err = state.complete(JobPayload::None).unwrap_err();
        assert!(matches!(err, JobError::InvalidTransition { .. }));
        assert!(!state.mark_cancelling());
    }
}
