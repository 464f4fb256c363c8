//! Ledger command implementation.

use crate::error::CliError;
use formsync_protocol::LedgerEntry;
use formsync_store::LocalStore;

/// Runs the ledger command.
pub fn run(store: &LocalStore, collection: Option<&str>, format: &str) -> Result<(), CliError> {
    let entries = select(store, collection);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => print_text_output(&entries),
    }
    Ok(())
}

fn select(store: &LocalStore, collection: Option<&str>) -> Vec<LedgerEntry> {
    let mut entries =
        store.find(|e: &LedgerEntry| collection.map_or(true, |c| e.collection == c));
    entries.sort_by(|a, b| {
        (&a.collection, &a.resource_id).cmp(&(&b.collection, &b.resource_id))
    });
    entries
}

fn print_text_output(entries: &[LedgerEntry]) {
    if entries.is_empty() {
        println!("Ledger is empty.");
        return;
    }
    for entry in entries {
        let last_success = entry
            .last_success
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:<12} {:<38} {:<8} {:?} attempts={} last_attempt={} last_success={}",
            entry.collection,
            entry.resource_id,
            format!("{:?}", entry.status).to_lowercase(),
            entry.method,
            entry.attempts,
            entry.last_attempt.to_rfc3339(),
            last_success,
        );
        println!("             {}", entry.resource_uri);
    }
    println!();
    println!("{} entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
}

#[cfg(test)]
mod tests {
    use super::*;
    use formsync_engine::StatusLedger;
    use formsync_protocol::{collections, HttpMethod};
    use std::sync::Arc;

    #[test]
    fn filters_and_sorts() {
        let store = Arc::new(LocalStore::in_memory());
        let ledger = StatusLedger::new(Arc::clone(&store));
        ledger
            .record_attempt(collections::RESPONSES, "r2", HttpMethod::Post, "u")
            .unwrap();
        ledger
            .record_attempt(collections::APPS, "a1", HttpMethod::Get, "u")
            .unwrap();
        ledger
            .record_attempt(collections::RESPONSES, "r1", HttpMethod::Post, "u")
            .unwrap();

        let all: Vec<String> = select(&store, None)
            .into_iter()
            .map(|e| e.resource_id)
            .collect();
        assert_eq!(all, vec!["a1", "r1", "r2"]);
        assert_eq!(select(&store, Some(collections::RESPONSES)).len(), 2);
    }
}
