pub mod broadcast;
pub mod config;
pub mod deploy;
pub mod error;
pub mod inference;
pub mod job;
pub mod process;
pub mod sanitize;
pub mod storage;
pub mod store;

pub use broadcast::{JobEvent, JobEventBroadcaster, JobOutcome, JobProgress};
pub use config::{load_settings, save_settings, Settings};
pub use deploy::{DeployConfig, DeployOrchestrator, Milestone};
pub use error::{ConfigError, JobError, Result, StorageError, TensorQuickError};
pub use inference::{HttpInferenceBackend, InferenceBackend, InferenceConfig, InferenceOrchestrator};
pub use job::{JobHandle, JobKind, JobPayload, JobStatus};
pub use store::{ModelRecord, ModelStore};
