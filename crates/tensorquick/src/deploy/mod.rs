//! Deployment of model scripts through the external deploy tool.

pub mod orchestrator;
pub mod progress;
pub mod script;

pub use orchestrator::{DeployConfig, DeployOrchestrator};
pub use progress::{classify, extract_result_url, result_marker, Milestone, MilestoneTracker};
pub use script::{apply_overrides, apply_overrides_to_file, GPU_TYPE_KEY, OVERRIDE_KEY_PREFIX};
