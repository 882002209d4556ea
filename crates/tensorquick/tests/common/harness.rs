//! Isolated environment for orchestrator tests.
//!
//! The deploy tool is replaced by a `sh` script, invoked as
//! `sh <tool> deploy <script>`, so `$2` is the deploy script path.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use tensorquick::deploy::{DeployConfig, DeployOrchestrator};
use tensorquick::inference::InferenceConfig;
use tensorquick::store::ModelStore;

pub const DEFAULT_SCRIPT: &str = r#"import modal

TENSOR_QUICK_GPU_TYPE = "A100-40GB"
TENSOR_QUICK_TIMEOUT = "600"

app = modal.App("model")
"#;

pub struct TestHarness {
    temp_dir: TempDir,
    pub scripts_dir: PathBuf,
    pub output_dir: PathBuf,
    pub save_dir: PathBuf,
    tool_path: PathBuf,
    grace: Duration,
    stop_delay: Duration,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();

        let scripts_dir = base.join("scripts");
        let output_dir = base.join("output");
        let save_dir = base.join("saved");
        std::fs::create_dir_all(&scripts_dir).expect("Failed to create scripts dir");

        let tool_path = base.join("fake_deploy.sh");

        let harness = Self {
            temp_dir,
            scripts_dir,
            output_dir,
            save_dir,
            tool_path,
            grace: Duration::from_millis(500),
            stop_delay: Duration::from_millis(50),
        };
        harness.set_tool("exit 0");
        harness
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = delay;
        self
    }

    pub fn base(&self) -> &std::path::Path {
        self.temp_dir.path()
    }

    /// Writes `scripts/{code_name}.py` with the default script body.
    pub fn add_script(&self, code_name: &str) -> PathBuf {
        self.add_script_with(code_name, DEFAULT_SCRIPT)
    }

    pub fn add_script_with(&self, code_name: &str, content: &str) -> PathBuf {
        let path = self.scripts_dir.join(format!("{}.py", code_name));
        std::fs::write(&path, content).expect("Failed to write script");
        path
    }

    pub fn read_script(&self, code_name: &str) -> String {
        std::fs::read_to_string(self.scripts_dir.join(format!("{}.py", code_name)))
            .expect("Failed to read script")
    }

    /// Replaces the fake deploy tool's body.
    pub fn set_tool(&self, body: &str) {
        std::fs::write(&self.tool_path, format!("#!/bin/sh\n{}\n", body))
            .expect("Failed to write fake deploy tool");
    }

    /// A tool printing every milestone, then the result marker for `code_name`.
    pub fn set_succeeding_tool(&self, code_name: &str) {
        self.set_tool(&format!(
            r#"echo "Starting deployment"
echo "Uploading code"
echo "Building container" >&2
echo "Deploying model"
echo "{}"
echo "Deployment complete""#,
            super::result_line(code_name)
        ));
    }

    pub fn deploy_config(&self) -> DeployConfig {
        DeployConfig {
            scripts_dir: self.scripts_dir.clone(),
            program: "sh".to_string(),
            args: vec![
                self.tool_path.to_string_lossy().to_string(),
                "deploy".to_string(),
            ],
            default_gpu_type: "A100-40GB".to_string(),
            terminate_grace: self.grace,
            stop_delay: self.stop_delay,
        }
    }

    pub fn deploy_orchestrator(&self, store: Arc<ModelStore>) -> DeployOrchestrator {
        DeployOrchestrator::new(self.deploy_config(), store)
    }

    pub fn inference_config(&self) -> InferenceConfig {
        InferenceConfig {
            app: "tensorquick".to_string(),
            output_dir: self.output_dir.clone(),
            save_dir: self.save_dir.clone(),
        }
    }
}
