//! Sync command implementation.

use crate::client::ReqwestClient;
use crate::error::CliError;
use formsync_engine::{
    HttpTransport, PushOutcome, RunStatus, StaticIdentity, SyncConfig, SyncEngine, SyncEvent,
};
use formsync_store::LocalStore;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

/// Runs the sync command.
///
/// Without `watch` a single cycle runs. With `watch` cycles repeat on the
/// configured interval until interrupted.
pub async fn run(
    store: LocalStore,
    config: SyncConfig,
    user: String,
    watch: bool,
) -> Result<(), CliError> {
    if config.server_url.is_empty() {
        return Err(CliError::Usage("server URL required for sync".into()));
    }

    let client = ReqwestClient::new(config.request_timeout)?;
    let transport = HttpTransport::new(config.server_url.clone(), client);
    let interval = config.sync_interval;
    let engine = SyncEngine::new(
        config,
        Arc::new(store),
        transport,
        StaticIdentity::signed_in(user),
    );
    let events = tokio::spawn(print_events(engine.subscribe()));

    if watch {
        // Saves come from other processes; the channel only keeps the loop alive.
        let (_saves, rx) = mpsc::channel::<()>(1);
        tokio::select! {
            result = engine.drive(interval, rx) => result?,
            _ = tokio::signal::ctrl_c() => info!("interrupted, stopping sync"),
        }
    } else {
        match engine.run().await? {
            RunStatus::Completed(report) => {
                if let Some(push) = &report.push {
                    print_push(push);
                }
                if !report.swept.is_empty() {
                    println!("Swept {} response(s)", report.swept.len());
                }
                if let Some(reconcile) = &report.reconcile {
                    println!(
                        "Reference data: {} updated, {} unchanged, {} failed",
                        reconcile.updated.len(),
                        reconcile.unchanged.len(),
                        reconcile.failed.len()
                    );
                }
            }
            RunStatus::Coalesced | RunStatus::Debounced => {}
        }
    }

    let stats = engine.stats();
    drop(engine);
    let _ = events.await;
    info!(
        cycles = stats.cycles_completed,
        pushed = stats.responses_pushed,
        failed = stats.responses_failed,
        "sync finished"
    );
    Ok(())
}

fn print_push(outcome: &PushOutcome) {
    let report = outcome.report();
    println!("Pushed {} response(s)", report.success.len());
    for failure in &report.fail {
        let kind = if failure.rejected { "rejected" } else { "failed" };
        println!("  {} {}", failure.fs_resp_id, kind);
    }
}

async fn print_events(mut rx: broadcast::Receiver<SyncEvent>) {
    loop {
        match rx.recv().await {
            Ok(SyncEvent::NoNetwork) => warn!("server unreachable"),
            Ok(SyncEvent::NoUser) => warn!("no user signed in"),
            Ok(SyncEvent::AppReconciled(app)) => info!(app = %app.slug, "app reconciled"),
            Ok(event) => tracing::debug!(?event, "sync event"),
            Err(broadcast::error::RecvError::Lagged(n)) => warn!(skipped = n, "events dropped"),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_server_is_a_usage_error() {
        let result = run(
            LocalStore::in_memory(),
            SyncConfig::default(),
            "alice".into(),
            false,
        )
        .await;
        assert!(matches!(result, Err(CliError::Usage(_))));
    }
}
