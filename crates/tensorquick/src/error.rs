use std::path::PathBuf;
use thiserror::Error;

use crate::job::JobKind;

#[derive(Error, Debug)]
pub enum TensorQuickError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write settings file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Settings validation failed: {message}")]
    Validation { message: String },

    #[error("Duplicate model code name '{0}'")]
    DuplicateModel(String),
}

/// Failures a job can end with.
///
/// Everything except [`JobError::AlreadyRunning`] is reported through the
/// job's terminal event rather than returned to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("Failed to start '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("Deployment script not found: {0}")]
    ScriptNotFound(PathBuf),

    #[error("No deployed endpoint configured")]
    NoEndpoint,

    #[error("A {kind} job is already running for '{target_id}'")]
    AlreadyRunning { target_id: String, kind: JobKind },

    #[error("Process exited with code {code}: {stderr}")]
    ProcessExit { code: i32, stderr: String },

    #[error("Process finished without reporting a deployed URL for '{0}'")]
    NoResult(String),

    #[error("Job cancelled by user")]
    Cancelled,

    #[error("Failed to apply script overrides to '{path}': {reason}")]
    Script { path: PathBuf, reason: String },

    #[error("Inference request failed: {0}")]
    Request(String),

    #[error("Failed to store output: {0}")]
    Storage(String),

    #[error("Job worker stopped before reporting a result")]
    Aborted,

    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl JobError {
    /// Returns true if the job ended because the user asked it to.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, JobError::Cancelled)
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy file from '{from}' to '{to}': {source}")]
    CopyFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Image file does not exist: {0}")]
    MissingFile(PathBuf),

    #[error("No image path provided")]
    EmptyPath,

    #[error("File already exists: {0}")]
    FileExists(PathBuf),
}

impl From<StorageError> for JobError {
    fn from(err: StorageError) -> Self {
        JobError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TensorQuickError>;
