//! Single-flight bookkeeping: at most one running job per (target, kind).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use super::handle::{request_cancel, JobControl};
use super::state::{lock_state, JobState};
use super::{JobKind, JobStatus};
use crate::error::JobError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub target_id: String,
    pub kind: JobKind,
}

impl JobKey {
    pub fn new(target_id: &str, kind: JobKind) -> Self {
        Self {
            target_id: target_id.to_string(),
            kind,
        }
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.target_id)
    }
}

struct JobSlot {
    job_id: String,
    state: Arc<Mutex<JobState>>,
    control: Arc<JobControl>,
}

/// A freshly admitted job, already in `Running`.
pub struct JobTicket {
    pub job_id: String,
    pub key: JobKey,
    pub state: Arc<Mutex<JobState>>,
    pub control: Arc<JobControl>,
}

#[derive(Default)]
pub struct JobRegistry {
    slots: Mutex<HashMap<JobKey, JobSlot>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a job for `key`, or rejects it with [`JobError::AlreadyRunning`]
    /// if one is running. The check and the transition happen under one lock.
    pub fn begin(&self, key: JobKey) -> Result<JobTicket, JobError> {
        let mut slots = self.slots();

        if let Some(slot) = slots.get(&key) {
            if lock_state(&slot.state).is_running() {
                log::debug!("Rejecting {} job {}: already running", key, slot.job_id);
                return Err(JobError::AlreadyRunning {
                    target_id: key.target_id.clone(),
                    kind: key.kind,
                });
            }
        }

        let mut state = JobState::new(&key.target_id, key.kind);
        state.begin()?;

        let job_id = Uuid::new_v4().to_string();
        let state = Arc::new(Mutex::new(state));
        let control = Arc::new(JobControl::new());

        slots.insert(
            key.clone(),
            JobSlot {
                job_id: job_id.clone(),
                state: Arc::clone(&state),
                control: Arc::clone(&control),
            },
        );

        Ok(JobTicket {
            job_id,
            key,
            state,
            control,
        })
    }

    /// Requests cancellation of the running job for `key`. Returns false if
    /// nothing is running.
    pub fn cancel(&self, key: &JobKey) -> bool {
        let slots = self.slots();
        match slots.get(key) {
            Some(slot) => {
                let cancelled = request_cancel(&slot.state, &slot.control);
                if cancelled {
                    log::info!("Cancellation requested for {} job {}", key, slot.job_id);
                }
                cancelled
            }
            None => false,
        }
    }

    /// Status of the latest job for `key`, `Idle` if there never was one.
    pub fn status(&self, key: &JobKey) -> JobStatus {
        self.slots()
            .get(key)
            .map(|slot| lock_state(&slot.state).status)
            .unwrap_or_default()
    }

    /// Copy of the latest job state for `key`.
    pub fn state(&self, key: &JobKey) -> Option<JobState> {
        self.slots()
            .get(key)
            .map(|slot| lock_state(&slot.state).clone())
    }

    pub fn is_running(&self, key: &JobKey) -> bool {
        self.status(key) == JobStatus::Running
    }

    /// Keys of all running jobs.
    pub fn running(&self) -> Vec<JobKey> {
        self.slots()
            .iter()
            .filter(|(_, slot)| lock_state(&slot.state).is_running())
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<JobKey, JobSlot>> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
