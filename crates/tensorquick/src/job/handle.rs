use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Notify};

use super::registry::JobTicket;
use super::state::{lock_state, JobState};
use super::{JobKind, JobPayload, JobStatus};
use crate::broadcast::{JobEvent, JobEventBroadcaster, JobOutcome, JobProgress};
use crate::error::JobError;

/// Cancellation signal shared between a job's worker and its callers.
#[derive(Debug, Default)]
pub struct JobControl {
    cancelled: AtomicBool,
    notify: Notify,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        // Stores a permit for a waiter that has not polled yet
        self.notify.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            self.notify.notified().await;
        }
    }
}

/// Sets the cancelling flag and signals the worker. No-op for finished jobs.
pub(crate) fn request_cancel(state: &Mutex<JobState>, control: &JobControl) -> bool {
    let marked = lock_state(state).mark_cancelling();
    if marked {
        control.cancel();
    }
    marked
}

/// Worker side of a job: emits progress and, exactly once, the outcome.
///
/// Dropping a reporter without calling [`JobReporter::finish`] reports the
/// job as aborted.
pub struct JobReporter {
    job_id: String,
    target_id: String,
    kind: JobKind,
    state: Arc<Mutex<JobState>>,
    control: Arc<JobControl>,
    events: mpsc::UnboundedSender<JobEvent>,
    broadcaster: Option<JobEventBroadcaster>,
    finished: bool,
}

impl JobReporter {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn control(&self) -> &Arc<JobControl> {
        &self.control
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    /// Records and emits progress. The emitted percentage is clamped so it
    /// never falls below what was already reported.
    pub fn progress(&self, percent: u8, milestone: Option<&str>) {
        let effective = match lock_state(&self.state).advance(percent) {
            Some(p) => p,
            None => return,
        };

        let mut event = JobProgress::new(&self.job_id, &self.target_id, self.kind, effective);
        if let Some(milestone) = milestone {
            event = event.with_milestone(milestone);
        }
        self.emit(JobEvent::Progress(event));
    }

    /// Records the terminal state, then emits the terminal event.
    pub fn finish(mut self, result: Result<JobPayload, JobError>) -> JobOutcome {
        self.settle(result)
    }

    fn settle(&mut self, result: Result<JobPayload, JobError>) -> JobOutcome {
        self.finished = true;

        let recorded = lock_state(&self.state).settle(result);
        let outcome = JobOutcome::from_result(&self.job_id, &self.target_id, self.kind, &recorded);

        match &recorded {
            Ok(_) => log::info!("{} job {} for '{}' completed", self.kind, self.job_id, self.target_id),
            Err(err) if err.is_cancellation() => {
                log::info!("{} job {} for '{}' cancelled", self.kind, self.job_id, self.target_id)
            }
            Err(err) => log::warn!(
                "{} job {} for '{}' failed: {}",
                self.kind,
                self.job_id,
                self.target_id,
                err
            ),
        }

        self.emit(JobEvent::Finished(outcome.clone()));
        outcome
    }

    fn emit(&self, event: JobEvent) {
        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.send(event.clone());
        }
        // The handle may have been dropped
        let _ = self.events.send(event);
    }
}

impl Drop for JobReporter {
    fn drop(&mut self) {
        if !self.finished {
            self.settle(Err(JobError::Aborted));
        }
    }
}

/// Caller side of a job.
pub struct JobHandle {
    job_id: String,
    target_id: String,
    kind: JobKind,
    events: mpsc::UnboundedReceiver<JobEvent>,
    state: Arc<Mutex<JobState>>,
    control: Arc<JobControl>,
}

impl JobHandle {
    /// Splits an admitted job into the caller's handle and the worker's reporter.
    pub fn new(ticket: JobTicket, broadcaster: Option<JobEventBroadcaster>) -> (JobHandle, JobReporter) {
        let (tx, rx) = mpsc::unbounded_channel();

        let reporter = JobReporter {
            job_id: ticket.job_id.clone(),
            target_id: ticket.key.target_id.clone(),
            kind: ticket.key.kind,
            state: Arc::clone(&ticket.state),
            control: Arc::clone(&ticket.control),
            events: tx,
            broadcaster,
            finished: false,
        };

        let handle = JobHandle {
            job_id: ticket.job_id,
            target_id: ticket.key.target_id,
            kind: ticket.key.kind,
            events: rx,
            state: ticket.state,
            control: ticket.control,
        };

        (handle, reporter)
    }

    pub fn id(&self) -> &str {
        &self.job_id
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn status(&self) -> JobStatus {
        lock_state(&self.state).status
    }

    pub fn progress(&self) -> u8 {
        lock_state(&self.state).progress
    }

    pub fn state(&self) -> JobState {
        lock_state(&self.state).clone()
    }

    /// Requests cancellation. Returns false if the job already finished.
    pub fn cancel(&self) -> bool {
        request_cancel(&self.state, &self.control)
    }

    /// Next event for this job, `None` after the terminal event.
    pub async fn next_event(&mut self) -> Option<JobEvent> {
        self.events.recv().await
    }

    /// Waits for the terminal outcome, discarding progress events.
    pub async fn wait(mut self) -> JobOutcome {
        while let Some(event) = self.events.recv().await {
            if let JobEvent::Finished(outcome) = event {
                return outcome;
            }
        }
        JobOutcome::failed(&self.job_id, &self.target_id, self.kind, &JobError::Aborted)
    }
}
