//! Application state shared by the CLI commands.

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info};
use tensorquick::broadcast::JobEventBroadcaster;
use tensorquick::config::{default_settings_path, load_settings, save_settings, Settings};
use tensorquick::deploy::{DeployConfig, DeployOrchestrator};
use tensorquick::inference::InferenceOrchestrator;
use tensorquick::store::{ModelRecord, ModelStore};
use tensorquick::TensorQuickError;

pub struct AppState {
    /// Where settings are read from and written back to.
    pub settings_path: PathBuf,

    pub settings: Settings,

    /// Deployed models, seeded from the settings file.
    pub store: Arc<ModelStore>,

    /// Every job event from both orchestrators.
    pub job_broadcaster: JobEventBroadcaster,

    pub deploy: DeployOrchestrator,

    pub inference: InferenceOrchestrator,
}

impl AppState {
    pub fn load(settings_path: Option<PathBuf>) -> Result<Self, TensorQuickError> {
        let settings_path = settings_path.unwrap_or_else(default_settings_path);
        let settings = load_settings(&settings_path)?;
        info!("Using settings from {}", settings_path.display());

        let store = Arc::new(ModelStore::new(settings.deployed_models.clone()));
        let job_broadcaster = JobEventBroadcaster::default();

        let deploy = DeployOrchestrator::new(DeployConfig::from_settings(&settings), Arc::clone(&store))
            .with_broadcaster(job_broadcaster.clone());
        let inference =
            InferenceOrchestrator::from_settings(&settings)?.with_broadcaster(job_broadcaster.clone());

        Ok(Self {
            settings_path,
            settings,
            store,
            job_broadcaster,
            deploy,
            inference,
        })
    }

    /// Resolves a model by code name: deployed first, then the catalog.
    /// Unknown code names still deploy if a script exists for them.
    pub fn resolve_model(&self, code_name: &str) -> ModelRecord {
        self.store
            .get(code_name)
            .or_else(|| self.settings.find_model(code_name).cloned())
            .unwrap_or_else(|| ModelRecord::new(code_name, code_name))
    }

    /// The model generate uses when none is named.
    pub fn current_model(&self) -> Option<ModelRecord> {
        self.store.select_current(self.settings.current_model)
    }

    pub fn select_model(&mut self, code_name: &str) -> Option<usize> {
        let index = self.store.index_of(code_name)?;
        self.settings.current_model = Some(index);
        Some(index)
    }

    /// Writes the deployed set and the current selection back to disk.
    pub fn persist(&mut self) -> Result<(), TensorQuickError> {
        self.settings.deployed_models = self.store.snapshot();
        if let Some(index) = self.settings.current_model {
            if index >= self.settings.deployed_models.len() {
                self.settings.current_model = None;
            }
        }

        save_settings(&self.settings_path, &self.settings)?;
        debug!("Saved settings to {}", self.settings_path.display());
        Ok(())
    }
}
