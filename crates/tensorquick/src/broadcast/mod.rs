//! Event streaming for job observers.

pub mod job_events;

pub use job_events::{JobEvent, JobEventBroadcaster, JobOutcome, JobProgress};
