//! Image generation against deployed endpoints.

pub mod client;
pub mod orchestrator;

pub use client::{extension_from_content_type, GeneratedImage, HttpInferenceBackend, InferenceBackend};
pub use orchestrator::{InferenceConfig, InferenceOrchestrator};
