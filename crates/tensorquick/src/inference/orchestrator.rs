//! Generate jobs against deployed endpoints.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use log::info;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::client::{GeneratedImage, HttpInferenceBackend, InferenceBackend};
use crate::broadcast::JobEventBroadcaster;
use crate::config::Settings;
use crate::error::{JobError, StorageError};
use crate::job::{JobControl, JobHandle, JobKey, JobKind, JobPayload, JobRegistry, JobStatus};
use crate::sanitize::{redact_url, slugify};
use crate::storage::{export_file, ImageStorage};
use crate::store::ModelRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceConfig {
    /// Used in generated file names.
    pub app: String,
    /// Where generated images are written.
    pub output_dir: PathBuf,
    /// Where saved images are copied to.
    pub save_dir: PathBuf,
}

impl InferenceConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            app: settings.app.clone(),
            output_dir: settings.output_dir(),
            save_dir: settings.save_dir(),
        }
    }
}

/// Runs generate jobs, one at a time per orchestrator.
#[derive(Clone)]
pub struct InferenceOrchestrator {
    context_id: String,
    config: Arc<InferenceConfig>,
    backend: Arc<dyn InferenceBackend>,
    registry: Arc<JobRegistry>,
    broadcaster: Option<JobEventBroadcaster>,
}

impl InferenceOrchestrator {
    pub fn new(config: InferenceConfig, backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            context_id: Uuid::new_v4().to_string(),
            config: Arc::new(config),
            backend,
            registry: Arc::new(JobRegistry::new()),
            broadcaster: None,
        }
    }

    /// Builds an orchestrator with the HTTP backend configured from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, JobError> {
        let backend = HttpInferenceBackend::new(settings.request_timeout())?;
        Ok(Self::new(
            InferenceConfig::from_settings(settings),
            Arc::new(backend),
        ))
    }

    pub fn with_broadcaster(mut self, broadcaster: JobEventBroadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    /// Identifies this orchestrator as the target of its jobs.
    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Starts generating an image for `prompt` at `endpoint`.
    ///
    /// Returns [`JobError::AlreadyRunning`] if this orchestrator is busy.
    /// An empty endpoint still creates a job, which fails immediately.
    pub fn generate(&self, endpoint: &str, prompt: &str) -> Result<JobHandle, JobError> {
        let ticket = self.registry.begin(self.key())?;
        let job_id = ticket.job_id.clone();
        let (handle, reporter) = JobHandle::new(ticket, self.broadcaster.clone());

        let endpoint = endpoint.trim().to_string();
        if endpoint.is_empty() {
            reporter.finish(Err(JobError::NoEndpoint));
            return Ok(handle);
        }

        info!("Generating image via {} (job {})", redact_url(&endpoint), job_id);

        let prompt = prompt.to_string();
        let config = Arc::clone(&self.config);
        let backend = Arc::clone(&self.backend);
        let span = info_span!("inference.generate", job_id = %job_id);

        tokio::spawn(
            async move {
                let result =
                    run_generate(backend.as_ref(), &config, &endpoint, &prompt, reporter.control()).await;
                reporter.finish(result.map(JobPayload::Output));
            }
            .instrument(span),
        );

        Ok(handle)
    }

    /// Generates with the endpoint of a deployed model.
    pub fn generate_for(&self, model: &ModelRecord, prompt: &str) -> Result<JobHandle, JobError> {
        self.generate(&model.deployed_url, prompt)
    }

    /// Copies a generated image into the save directory.
    pub fn save_output(&self, path: &Path) -> Result<PathBuf, StorageError> {
        let saved = export_file(path, &self.config.save_dir)?;
        info!("Saved image to {}", saved.display());
        Ok(saved)
    }

    pub fn cancel(&self) -> bool {
        self.registry.cancel(&self.key())
    }

    pub fn status(&self) -> JobStatus {
        self.registry.status(&self.key())
    }

    fn key(&self) -> JobKey {
        JobKey::new(&self.context_id, JobKind::Generate)
    }
}

async fn run_generate(
    backend: &dyn InferenceBackend,
    config: &InferenceConfig,
    endpoint: &str,
    prompt: &str,
    control: &JobControl,
) -> Result<PathBuf, JobError> {
    let image = tokio::select! {
        image = backend.generate(endpoint, prompt) => image?,
        _ = control.cancelled() => return Err(JobError::Cancelled),
    };

    let path = store_image(config, prompt, &image)?;
    info!("Image written to {}", path.display());
    Ok(path)
}

/// Writes the image as `{prompt}-{app}-{unix_ts}.{ext}`.
fn store_image(config: &InferenceConfig, prompt: &str, image: &GeneratedImage) -> Result<PathBuf, JobError> {
    let stem = format!(
        "{}-{}-{}",
        slugify(prompt),
        slugify(&config.app),
        Utc::now().timestamp()
    );
    let storage = ImageStorage::new(&config.output_dir);
    Ok(storage.store(&image.bytes, &stem, image.extension())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Unreachable;

    #[async_trait::async_trait]
    impl InferenceBackend for Unreachable {
        async fn generate(&self, _endpoint: &str, _prompt: &str) -> Result<GeneratedImage, JobError> {
            Err(JobError::Request("should not be called".to_string()))
        }
    }

    fn config(dir: &TempDir) -> InferenceConfig {
        InferenceConfig {
            app: "tensorquick".to_string(),
            output_dir: dir.path().join("out"),
            save_dir: dir.path().join("saved"),
        }
    }

    #[tokio::test]
    async fn test_empty_endpoint_fails_fast() {
        let dir = TempDir::new().unwrap();
        let orchestrator = InferenceOrchestrator::new(config(&dir), Arc::new(Unreachable));

        let outcome = orchestrator.generate("  ", "a cat").unwrap().wait().await;

        assert!(!outcome.success);
        assert_eq!(outcome.error, JobError::NoEndpoint.to_string());
        assert_eq!(orchestrator.status(), JobStatus::Error);
    }

    #[test]
    fn test_store_image_name() {
        let dir = TempDir::new().unwrap();
        let image = GeneratedImage {
            bytes: b"gif".to_vec(),
            content_type: Some("image/gif".to_string()),
        };

        let path = store_image(&config(&dir), "A cat, on Mars!", &image).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();

        assert!(name.starts_with("a-cat-on-mars-tensorquick-"));
        assert!(name.ends_with(".gif"));
        assert_eq!(path.parent().unwrap(), dir.path().join("out"));
    }

    #[test]
    fn test_save_output() {
        let dir = TempDir::new().unwrap();
        let orchestrator = InferenceOrchestrator::new(config(&dir), Arc::new(Unreachable));
        let image = dir.path().join("cat.png");
        std::fs::write(&image, b"png").unwrap();

        let saved = orchestrator.save_output(&image).unwrap();
        assert_eq!(saved, dir.path().join("saved/cat.png"));

        assert!(matches!(
            orchestrator.save_output(&dir.path().join("missing.png")),
            Err(StorageError::MissingFile(_))
        ));
    }
}
