//! Command handlers.

use std::future::Future;
use std::path::Path;

use clap::Subcommand;
use log::{info, warn};
use tensorquick::broadcast::JobOutcome;
use tensorquick::job::JobHandle;
use tensorquick::TensorQuickError;

use crate::state::AppState;

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// List deployable and deployed models
    Models,

    /// Deploy a model to the GPU cloud
    Deploy {
        /// Model code name; also names the deploy script
        code_name: String,

        /// GPU type to deploy on, overriding the model's and the default
        #[arg(long)]
        gpu_type: Option<String>,
    },

    /// Stop a deployed model
    Stop {
        code_name: String,
    },

    /// Generate an image from a prompt
    Generate {
        prompt: String,

        /// Deployed model to use instead of the current one
        #[arg(long, conflicts_with = "endpoint")]
        model: Option<String>,

        /// Endpoint URL to call directly
        #[arg(long)]
        endpoint: Option<String>,

        /// Also copy the image into the save directory
        #[arg(long)]
        save: bool,
    },

    /// Copy a generated image into the save directory
    Save {
        path: std::path::PathBuf,
    },

    /// Remember a deployed model as the current one
    Select {
        code_name: String,
    },
}

/// Runs a command. Returns whether it succeeded.
pub async fn run(state: &mut AppState, command: Command) -> Result<bool, TensorQuickError> {
    match command {
        Command::Models => {
            list_models(state);
            Ok(true)
        }
        Command::Deploy { code_name, gpu_type } => deploy(state, &code_name, gpu_type).await,
        Command::Stop { code_name } => stop(state, &code_name).await,
        Command::Generate {
            prompt,
            model,
            endpoint,
            save,
        } => generate(state, &prompt, model.as_deref(), endpoint.as_deref(), save).await,
        Command::Save { path } => {
            let saved = state.inference.save_output(&path)?;
            println!("{}", saved.display());
            Ok(true)
        }
        Command::Select { code_name } => match state.select_model(&code_name) {
            Some(_) => {
                state.persist()?;
                println!("Current model: {}", code_name);
                Ok(true)
            }
            None => {
                warn!("'{}' is not deployed", code_name);
                Ok(false)
            }
        },
    }
}

fn list_models(state: &AppState) {
    let current = state.current_model().map(|m| m.code_name);

    println!("Deployed:");
    for model in state.store.snapshot() {
        let marker = if current.as_deref() == Some(model.code_name.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            " {} {:<24} {:<10} {}",
            marker,
            model.code_name,
            model.gpu_type.as_deref().unwrap_or("-"),
            model.deployed_url
        );
    }

    println!("Available:");
    for model in &state.settings.models {
        println!("   {:<24} {}", model.code_name, model.name);
    }
}

async fn deploy(
    state: &mut AppState,
    code_name: &str,
    gpu_type: Option<String>,
) -> Result<bool, TensorQuickError> {
    let mut model = state.resolve_model(code_name);
    if gpu_type.is_some() {
        model.gpu_type = gpu_type;
    }

    let handle = state.deploy.deploy(model)?;
    let deploy = state.deploy.clone();
    let code = code_name.to_string();
    let outcome = wait_interruptible(handle, move || deploy.cancel(&code)).await;

    if outcome.success {
        if let Some(model) = outcome.payload.model() {
            println!("Deployed {} at {}", model.code_name, model.deployed_url);
        }
        state.persist()?;
    } else {
        eprintln!("Deployment failed: {}", outcome.error);
    }
    Ok(outcome.success)
}

async fn stop(state: &mut AppState, code_name: &str) -> Result<bool, TensorQuickError> {
    let Some(model) = state.store.get(code_name) else {
        warn!("'{}' is not deployed", code_name);
        return Ok(false);
    };

    let handle = state.deploy.stop(&model)?;
    let deploy = state.deploy.clone();
    let code = code_name.to_string();
    let outcome = wait_interruptible(handle, move || deploy.cancel_stop(&code)).await;

    if outcome.success {
        println!("Stopped {}", code_name);
        state.persist()?;
    } else {
        eprintln!("Stop failed: {}", outcome.error);
    }
    Ok(outcome.success)
}

async fn generate(
    state: &AppState,
    prompt: &str,
    model: Option<&str>,
    endpoint: Option<&str>,
    save: bool,
) -> Result<bool, TensorQuickError> {
    let endpoint = match (endpoint, model) {
        (Some(endpoint), _) => endpoint.to_string(),
        (None, Some(code_name)) => state
            .store
            .get(code_name)
            .map(|m| m.deployed_url)
            .unwrap_or_default(),
        (None, None) => state
            .current_model()
            .map(|m| m.deployed_url)
            .unwrap_or_default(),
    };

    let handle = state.inference.generate(&endpoint, prompt)?;
    let inference = state.inference.clone();
    let outcome = wait_interruptible(handle, move || inference.cancel()).await;

    let Some(path) = outcome.payload.output_path().filter(|_| outcome.success) else {
        eprintln!("Generation failed: {}", outcome.error);
        return Ok(false);
    };

    println!("{}", path.display());
    if save {
        save_copy(state, path)?;
    }
    Ok(true)
}

fn save_copy(state: &AppState, path: &Path) -> Result<(), TensorQuickError> {
    let saved = state.inference.save_output(path)?;
    println!("Saved to {}", saved.display());
    Ok(())
}

/// Waits for the job, cancelling it on Ctrl-C and then waiting for the
/// cancellation to land.
async fn wait_interruptible<F>(handle: JobHandle, cancel: F) -> JobOutcome
where
    F: FnOnce() -> bool,
{
    let wait = handle.wait();
    tokio::pin!(wait);

    tokio::select! {
        outcome = &mut wait => outcome,
        _ = ctrl_c() => {
            info!("Interrupted, cancelling");
            if !cancel() {
                warn!("Job already finished");
            }
            wait.await
        }
    }
}

fn ctrl_c() -> impl Future<Output = ()> {
    async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
