//! Deploy and stop jobs.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tracing::{info_span, Instrument};

use super::progress::{extract_result_url, MilestoneTracker};
use super::script::{apply_overrides_to_file, GPU_TYPE_KEY};
use crate::broadcast::JobEventBroadcaster;
use crate::config::Settings;
use crate::error::JobError;
use crate::job::{JobControl, JobHandle, JobKey, JobKind, JobPayload, JobRegistry, JobReporter, JobStatus};
use crate::process::{self, CommandSpec, OutputLine, RunningProcess};
use crate::sanitize::redact_url;
use crate::store::{ModelRecord, ModelStore};

/// What the deployment jobs need from the settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    pub scripts_dir: PathBuf,
    pub program: String,
    pub args: Vec<String>,
    pub default_gpu_type: String,
    pub terminate_grace: Duration,
    pub stop_delay: Duration,
}

impl DeployConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            scripts_dir: settings.scripts_dir(),
            program: settings.deploy_tool.program.clone(),
            args: settings.deploy_tool.args.clone(),
            default_gpu_type: settings.default_gpu_type.clone(),
            terminate_grace: settings.terminate_grace(),
            stop_delay: settings.stop_delay(),
        }
    }

    /// Deploy script for a model: `{scripts_dir}/{code_name}.py`.
    pub fn script_path(&self, code_name: &str) -> PathBuf {
        self.scripts_dir.join(format!("{}.py", code_name))
    }

    /// Overrides injected into the script and the child environment.
    pub fn overrides_for(&self, model: &ModelRecord) -> BTreeMap<String, String> {
        BTreeMap::from([(GPU_TYPE_KEY.to_string(), self.gpu_type_for(model))])
    }

    fn gpu_type_for(&self, model: &ModelRecord) -> String {
        model
            .gpu_type
            .as_deref()
            .filter(|g| !g.trim().is_empty())
            .unwrap_or(&self.default_gpu_type)
            .to_string()
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Runs deploy and stop jobs, at most one of each kind per model.
#[derive(Clone)]
pub struct DeployOrchestrator {
    config: Arc<DeployConfig>,
    store: Arc<ModelStore>,
    registry: Arc<JobRegistry>,
    broadcaster: Option<JobEventBroadcaster>,
}

impl DeployOrchestrator {
    pub fn new(config: DeployConfig, store: Arc<ModelStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            registry: Arc::new(JobRegistry::new()),
            broadcaster: None,
        }
    }

    /// Also publishes every job event on `broadcaster`.
    pub fn with_broadcaster(mut self, broadcaster: JobEventBroadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    /// Starts deploying `model`.
    ///
    /// Only [`JobError::AlreadyRunning`] is returned here; every other
    /// failure arrives as the job's terminal event.
    pub fn deploy(&self, model: ModelRecord) -> Result<JobHandle, JobError> {
        let key = JobKey::new(&model.code_name, JobKind::Deploy);
        let ticket = self.registry.begin(key)?;
        let job_id = ticket.job_id.clone();
        let (handle, reporter) = JobHandle::new(ticket, self.broadcaster.clone());

        info!("Deploying '{}' (job {})", model.code_name, job_id);

        let config = Arc::clone(&self.config);
        let store = Arc::clone(&self.store);
        let span = info_span!("deploy.run", model = %model.code_name, job_id = %job_id);

        tokio::spawn(
            async move {
                let result = run_deploy(&config, &model, &reporter).await.map(|deployed| {
                    store.upsert(deployed.clone());
                    JobPayload::Model(deployed)
                });
                reporter.finish(result);
            }
            .instrument(span),
        );

        Ok(handle)
    }

    /// Starts stopping `model`.
    ///
    /// Placeholder until the deploy tool grows a stop command: waits
    /// `stop_delay` (cancellable), then drops the model from the deployed set.
    pub fn stop(&self, model: &ModelRecord) -> Result<JobHandle, JobError> {
        let key = JobKey::new(&model.code_name, JobKind::Stop);
        let ticket = self.registry.begin(key)?;
        let job_id = ticket.job_id.clone();
        let (handle, reporter) = JobHandle::new(ticket, self.broadcaster.clone());

        info!("Stopping '{}' (job {})", model.code_name, job_id);

        let delay = self.config.stop_delay;
        let store = Arc::clone(&self.store);
        let model = model.clone();
        let span = info_span!("deploy.stop", model = %model.code_name, job_id = %job_id);

        tokio::spawn(
            async move {
                let waited = run_stop(delay, &model, reporter.control()).await;
                let result = match waited {
                    Ok(()) => {
                        let removed = store.remove(&model.code_name).unwrap_or(model);
                        Ok(JobPayload::Model(removed))
                    }
                    Err(err) => Err(err),
                };
                reporter.finish(result);
            }
            .instrument(span),
        );

        Ok(handle)
    }

    /// Cancels the running deployment of `code_name`. Returns false if none
    /// is running.
    pub fn cancel(&self, code_name: &str) -> bool {
        self.registry.cancel(&JobKey::new(code_name, JobKind::Deploy))
    }

    /// Cancels the running stop job of `code_name`.
    pub fn cancel_stop(&self, code_name: &str) -> bool {
        self.registry.cancel(&JobKey::new(code_name, JobKind::Stop))
    }

    pub fn status(&self, code_name: &str, kind: JobKind) -> JobStatus {
        self.registry.status(&JobKey::new(code_name, kind))
    }

    pub fn is_deploying(&self, code_name: &str) -> bool {
        self.status(code_name, JobKind::Deploy) == JobStatus::Running
    }
}

enum Step {
    Line(Option<OutputLine>),
    Exited(i32),
    Cancelled,
}

async fn run_deploy(
    config: &DeployConfig,
    model: &ModelRecord,
    reporter: &JobReporter,
) -> Result<ModelRecord, JobError> {
    let code_name = model.code_name.as_str();
    let control = reporter.control();

    let script = config.script_path(code_name);
    if !script.is_file() {
        return Err(JobError::ScriptNotFound(script));
    }

    let gpu_type = config.gpu_type_for(model);
    let overrides = config.overrides_for(model);
    apply_overrides_to_file(&script, &overrides)?;

    if control.is_cancelled() {
        return Err(JobError::Cancelled);
    }

    let spec = CommandSpec::new(&config.program)
        .args(config.args.iter().cloned())
        .arg(script.to_string_lossy())
        .envs(&overrides);

    let mut child = process::start(&spec)?;
    info!("Running '{}' on {}", spec, gpu_type);

    let mut tracker = MilestoneTracker::new();
    let mut deployed_url: Option<String> = None;

    loop {
        let step = tokio::select! {
            line = child.next_line() => Step::Line(line),
            _ = control.cancelled() => Step::Cancelled,
        };

        match step {
            Step::Line(Some(line)) => {
                let text = line.text();
                debug!("{}", text);

                if let Some(percent) = tracker.observe(text) {
                    let milestone = tracker.reached().map(|m| m.to_string());
                    reporter.progress(percent, milestone.as_deref());
                }
                if deployed_url.is_none() {
                    deployed_url = extract_result_url(text, code_name);
                }
            }
            Step::Line(None) => break,
            _ => return cancel(&mut child, config.terminate_grace).await,
        }
    }

    let step = tokio::select! {
        code = child.wait() => Step::Exited(code),
        _ = control.cancelled() => Step::Cancelled,
    };
    let code = match step {
        Step::Exited(code) => code,
        _ => return cancel(&mut child, config.terminate_grace).await,
    };

    if code != 0 {
        return Err(JobError::ProcessExit {
            code,
            stderr: child.stderr_tail(),
        });
    }

    let url = deployed_url.ok_or_else(|| JobError::NoResult(code_name.to_string()))?;
    info!("'{}' deployed at {}", code_name, redact_url(&url));

    let mut deployed = model.clone();
    deployed.deployed_url = url;
    deployed.gpu_type = Some(gpu_type);
    Ok(deployed)
}

async fn cancel(child: &mut RunningProcess, grace: Duration) -> Result<ModelRecord, JobError> {
    let termination = child.terminate(grace).await;
    warn!("Deployment cancelled, process {:?}", termination);
    Err(JobError::Cancelled)
}

async fn run_stop(delay: Duration, model: &ModelRecord, control: &JobControl) -> Result<(), JobError> {
    debug!("Placeholder stop for '{}', waiting {:?}", model.code_name, delay);
    tokio::select! {
        _ = tokio::time::sleep(delay) => Ok(()),
        _ = control.cancelled() => Err(JobError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_path() {
        let config = DeployConfig {
            scripts_dir: PathBuf::from("/opt/scripts"),
            ..DeployConfig::default()
        };
        assert_eq!(
            config.script_path("flux-1-dev"),
            PathBuf::from("/opt/scripts/flux-1-dev.py")
        );
    }

    #[test]
    fn test_gpu_type_defaults() {
        let config = DeployConfig::default();
        let model = ModelRecord::new("flux", "Flux");
        assert_eq!(config.overrides_for(&model)[GPU_TYPE_KEY], "A100-40GB");

        let model = model.with_gpu_type("H100");
        assert_eq!(config.overrides_for(&model)[GPU_TYPE_KEY], "H100");

        let mut blank = ModelRecord::new("flux", "Flux");
        blank.gpu_type = Some("  ".to_string());
        assert_eq!(config.overrides_for(&blank)[GPU_TYPE_KEY], "A100-40GB");
    }

    #[tokio::test]
    async fn test_missing_script_is_terminal_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = DeployConfig {
            scripts_dir: dir.path().to_path_buf(),
            ..DeployConfig::default()
        };
        let orchestrator = DeployOrchestrator::new(config, Arc::new(ModelStore::default()));

        let handle = orchestrator.deploy(ModelRecord::new("ghost", "Ghost")).unwrap();
        let outcome = handle.wait().await;

        assert!(!outcome.success);
        assert!(outcome.error.contains("ghost.py"));
        assert_eq!(orchestrator.status("ghost", JobKind::Deploy), JobStatus::Error);
    }

    #[tokio::test]
    async fn test_stop_is_cancellable() {
        let config = DeployConfig {
            stop_delay: Duration::from_secs(30),
            ..DeployConfig::default()
        };
        let model = ModelRecord::new("flux", "Flux").with_deployed_url("https://x.modal.run");
        let store = Arc::new(ModelStore::new(vec![model.clone()]));
        let orchestrator = DeployOrchestrator::new(config, Arc::clone(&store));

        let handle = orchestrator.stop(&model).unwrap();
        assert!(orchestrator.cancel_stop("flux"));

        let outcome = tokio::time::timeout(Duration::from_secs(2), handle.wait())
            .await
            .unwrap();
        assert!(outcome.cancelled);
        assert!(store.contains("flux"));
    }
}
