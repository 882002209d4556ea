//! Deployed-model collection with a single mutation gate.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// A deployable model and, once deployed, its endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelRecord {
    /// Unique key; also names the deploy script (`{code_name}.py`).
    pub code_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Empty until a deployment succeeds.
    #[serde(default)]
    pub deployed_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_type: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub preview: String,
    #[serde(default)]
    pub active: bool,
}

impl ModelRecord {
    pub fn new(code_name: &str, name: &str) -> Self {
        Self {
            code_name: code_name.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_gpu_type(mut self, gpu_type: &str) -> Self {
        self.gpu_type = Some(gpu_type.to_string());
        self
    }

    pub fn with_deployed_url(mut self, url: &str) -> Self {
        self.deployed_url = url.to_string();
        self
    }

    pub fn is_deployed(&self) -> bool {
        !self.deployed_url.is_empty()
    }
}

/// Owns the deployed models. Only terminating deploy/stop jobs mutate it;
/// everyone else reads cloned snapshots.
pub struct ModelStore {
    models: RwLock<Vec<ModelRecord>>,
    snapshots: watch::Sender<Vec<ModelRecord>>,
}

impl ModelStore {
    pub fn new(initial: Vec<ModelRecord>) -> Self {
        let (snapshots, _) = watch::channel(initial.clone());
        Self {
            models: RwLock::new(initial),
            snapshots,
        }
    }

    /// Inserts the record, or replaces the one with the same code name in place.
    /// Returns true if an existing record was replaced.
    pub fn upsert(&self, record: ModelRecord) -> bool {
        let mut models = self.write();
        let replaced = match models.iter_mut().find(|m| m.code_name == record.code_name) {
            Some(existing) => {
                *existing = record;
                true
            }
            None => {
                models.push(record);
                false
            }
        };
        self.publish(&models);
        replaced
    }

    /// Removes the record with this code name. Returns the removed record.
    pub fn remove(&self, code_name: &str) -> Option<ModelRecord> {
        let mut models = self.write();
        let index = models.iter().position(|m| m.code_name == code_name)?;
        let removed = models.remove(index);
        self.publish(&models);
        Some(removed)
    }

    pub fn get(&self, code_name: &str) -> Option<ModelRecord> {
        self.read().iter().find(|m| m.code_name == code_name).cloned()
    }

    pub fn contains(&self, code_name: &str) -> bool {
        self.read().iter().any(|m| m.code_name == code_name)
    }

    /// Returns a copy of the current collection.
    pub fn snapshot(&self) -> Vec<ModelRecord> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Subscribes to snapshots published after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<Vec<ModelRecord>> {
        self.snapshots.subscribe()
    }

    /// Picks the model the front end should show: the remembered index if
    /// valid, otherwise the first `active` record, otherwise the first record.
    pub fn select_current(&self, remembered: Option<usize>) -> Option<ModelRecord> {
        let models = self.read();
        if let Some(index) = remembered {
            if let Some(model) = models.get(index) {
                return Some(model.clone());
            }
        }
        models
            .iter()
            .find(|m| m.active)
            .or_else(|| models.first())
            .cloned()
    }

    /// Index of a code name in the collection, for remembering the selection.
    pub fn index_of(&self, code_name: &str) -> Option<usize> {
        self.read().iter().position(|m| m.code_name == code_name)
    }

    fn publish(&self, models: &[ModelRecord]) {
        self.snapshots.send_replace(models.to_vec());
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<ModelRecord>> {
        match self.models.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Model store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<ModelRecord>> {
        match self.models.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Model store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for ModelStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
