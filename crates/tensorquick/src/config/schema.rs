use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::ModelRecord;

/// Application settings shared by the orchestrators and the front end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Application name, used in generated file names.
    #[serde(default = "default_app")]
    pub app: String,

    /// Where "save image" copies generated images to. Supports `~`.
    #[serde(default = "default_save_dir")]
    pub save_dir: String,

    /// Where freshly generated images are written. Defaults to a
    /// `tensorquick` folder in the system temp directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,

    /// Directory holding one deploy script per model (`{code_name}.py`).
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: String,

    #[serde(default)]
    pub deploy_tool: DeployToolConfig,

    /// GPU type used when a model does not specify one.
    #[serde(default = "default_gpu_type")]
    pub default_gpu_type: String,

    /// Grace period between SIGTERM and SIGKILL when cancelling a job.
    #[serde(default = "default_terminate_grace_secs")]
    pub terminate_grace_secs: u64,

    /// Delay of the placeholder stop operation.
    #[serde(default = "default_stop_delay_secs")]
    pub stop_delay_secs: u64,

    /// Timeout for a single inference request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_theme")]
    pub theme: String,

    /// Models that can be deployed.
    #[serde(default)]
    pub models: Vec<ModelRecord>,

    /// Models with a live endpoint, as of the last save.
    #[serde(default)]
    pub deployed_models: Vec<ModelRecord>,

    /// Index into `deployed_models` of the model the user last picked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_model: Option<usize>,
}

/// The external command used to deploy a script.
///
/// The script path is appended after `args`, so the default invocation is
/// `modal deploy <script>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployToolConfig {
    #[serde(default = "default_deploy_program")]
    pub program: String,
    #[serde(default = "default_deploy_args")]
    pub args: Vec<String>,
}

impl Default for DeployToolConfig {
    fn default() -> Self {
        Self {
            program: default_deploy_program(),
            args: default_deploy_args(),
        }
    }
}

fn default_app() -> String {
    "tensorquick".to_string()
}

fn default_save_dir() -> String {
    "~/Pictures/tensorquick".to_string()
}

fn default_scripts_dir() -> String {
    "scripts/deploy".to_string()
}

fn default_deploy_program() -> String {
    "modal".to_string()
}

fn default_deploy_args() -> Vec<String> {
    vec!["deploy".to_string()]
}

fn default_gpu_type() -> String {
    "A100-40GB".to_string()
}

fn default_terminate_grace_secs() -> u64 {
    5
}

fn default_stop_delay_secs() -> u64 {
    2
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_theme() -> String {
    "dark".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app: default_app(),
            save_dir: default_save_dir(),
            output_dir: None,
            scripts_dir: default_scripts_dir(),
            deploy_tool: DeployToolConfig::default(),
            default_gpu_type: default_gpu_type(),
            terminate_grace_secs: default_terminate_grace_secs(),
            stop_delay_secs: default_stop_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            theme: default_theme(),
            models: Vec::new(),
            deployed_models: Vec::new(),
            current_model: None,
        }
    }
}

impl Settings {
    pub fn save_dir(&self) -> PathBuf {
        expand_tilde(&self.save_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        match &self.output_dir {
            Some(dir) => expand_tilde(dir),
            None => std::env::temp_dir().join(&self.app),
        }
    }

    pub fn scripts_dir(&self) -> PathBuf {
        expand_tilde(&self.scripts_dir)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_secs(self.terminate_grace_secs)
    }

    pub fn stop_delay(&self) -> Duration {
        Duration::from_secs(self.stop_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Looks up a deployable model by code name.
    pub fn find_model(&self, code_name: &str) -> Option<&ModelRecord> {
        self.models.iter().find(|m| m.code_name == code_name)
    }
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    Path::new(path).to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.deploy_tool.program, "modal");
        assert_eq!(settings.deploy_tool.args, vec!["deploy".to_string()]);
        assert_eq!(settings.terminate_grace(), Duration::from_secs(5));
        assert_eq!(settings.default_gpu_type, "A100-40GB");
    }

    #[test]
    fn test_output_dir_defaults_to_temp() {
        let settings = Settings::default();
        assert_eq!(
            settings.output_dir(),
            std::env::temp_dir().join("tensorquick")
        );
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_tilde("relative"), PathBuf::from("relative"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/Pictures"), home.join("Pictures"));
        }
    }
}
