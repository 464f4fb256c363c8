//! Pending command implementation.

use crate::error::CliError;
use formsync_engine::{ChangeDetector, StatusLedger};
use formsync_protocol::collections;
use formsync_store::LocalStore;
use serde::Serialize;
use std::sync::Arc;

/// A response waiting to be pushed.
#[derive(Debug, Serialize)]
pub struct PendingInfo {
    /// Response id.
    pub id: String,
    /// Form slug.
    pub fs_slug: String,
    /// Response status.
    pub status: String,
    /// Push attempts so far.
    pub attempts: u32,
}

/// Runs the pending command.
///
/// Lists what the next cycle would push: responses with unacknowledged
/// changes saved in the snapshot, and responses whose last push never
/// resolved.
pub fn run(store: LocalStore, format: &str) -> Result<(), CliError> {
    let pending = collect(Arc::new(store));

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&pending)?);
        }
        _ => print_text_output(&pending),
    }
    Ok(())
}

fn collect(store: Arc<LocalStore>) -> Vec<PendingInfo> {
    let ledger = StatusLedger::new(Arc::clone(&store));
    let detector = ChangeDetector::new(store, ledger.clone());

    detector
        .pending_push_set()
        .into_records()
        .into_iter()
        .map(|record| PendingInfo {
            attempts: ledger
                .entry(collections::RESPONSES, &record.id)
                .map_or(0, |e| e.attempts),
            status: record.status.to_string(),
            fs_slug: record.fs_slug,
            id: record.id,
        })
        .collect()
}

fn print_text_output(pending: &[PendingInfo]) {
    if pending.is_empty() {
        println!("No pending responses.");
        return;
    }
    println!("{:<38} {:<20} {:<16} ATTEMPTS", "ID", "FORM", "STATUS");
    for info in pending {
        println!(
            "{:<38} {:<20} {:<16} {}",
            info.id, info.fs_slug, info.status, info.attempts
        );
    }
    println!();
    println!("{} pending response(s)", pending.len());
}
