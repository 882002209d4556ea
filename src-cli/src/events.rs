//! Prints job events as they arrive.

use log::{debug, info, warn};
use tensorquick::broadcast::{JobEvent, JobEventBroadcaster};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Spawns a task printing every job event, as text or one JSON object per line.
///
/// The task ends once every sender is dropped and yields the number of
/// events printed.
pub fn start_event_printer(broadcaster: &JobEventBroadcaster, json: bool) -> JoinHandle<usize> {
    let mut rx = broadcaster.subscribe();

    tokio::spawn(async move {
        let mut printed = 0;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    print_event(&event, json);
                    printed += 1;
                }
                Err(RecvError::Lagged(n)) => {
                    warn!("Event printer lagged, missed {} events", n);
                }
                Err(RecvError::Closed) => {
                    debug!("Job broadcaster closed, stopping event printer");
                    break;
                }
            }
        }
        printed
    })
}

fn print_event(event: &JobEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to serialize event: {}", e),
        }
        return;
    }

    match event {
        JobEvent::Progress(progress) => {
            let milestone = progress.milestone.as_deref().unwrap_or("");
            println!(
                "[{}] {:>3}% {}",
                progress.target_id, progress.percent, milestone
            );
        }
        JobEvent::Finished(outcome) if outcome.success => {
            info!("{} job {} finished", outcome.kind, outcome.job_id);
        }
        JobEvent::Finished(outcome) => {
            info!(
                "{} job {} failed: {}",
                outcome.kind, outcome.job_id, outcome.error
            );
        }
    }
}
