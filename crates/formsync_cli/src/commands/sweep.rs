//! Sweep command implementation.

use crate::error::CliError;
use chrono::Utc;
use formsync_engine::{RetentionSweeper, StatusLedger};
use formsync_protocol::FormResponse;
use formsync_store::LocalStore;
use std::sync::Arc;
use std::time::Duration;

/// Runs the sweep command.
pub fn run(store: LocalStore, retention: Duration, dry_run: bool) -> Result<(), CliError> {
    let store = Arc::new(store);

    if dry_run {
        let expired = expired(&store, retention);
        println!("Would remove {} response(s):", expired.len());
        for response in &expired {
            let synced_at = response
                .synced_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            println!("  {} ({}) synced {}", response.id, response.fs_slug, synced_at);
        }
        return Ok(());
    }

    let ledger = StatusLedger::new(Arc::clone(&store));
    let removed = RetentionSweeper::new(store, ledger).sweep(retention)?;
    println!("Removed {} response(s)", removed.len());
    for id in &removed {
        println!("  {id}");
    }
    Ok(())
}

fn expired(store: &LocalStore, retention: Duration) -> Vec<FormResponse> {
    let now = Utc::now();
    let mut expired = store.find(|r: &FormResponse| r.is_expired(now, retention));
    expired.sort_by(|a, b| a.synced_at.cmp(&b.synced_at));
    expired
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use formsync_protocol::ResponseStatus;

    fn synced(id: &str, age_hours: i64) -> FormResponse {
        FormResponse {
            synced_at: Some(Utc::now() - ChronoDuration::hours(age_hours)),
            ..FormResponse::new(id, "f1", "intake").with_status(ResponseStatus::Synced)
        }
    }

    #[test]
    fn dry_run_selects_only_expired() {
        let store = LocalStore::in_memory();
        store.insert(synced("old", 30));
        store.insert(synced("older", 48));
        store.insert(synced("fresh", 1));
        store.insert(FormResponse::new("draft", "f1", "intake"));

        let ids: Vec<String> = expired(&store, Duration::from_secs(24 * 60 * 60))
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["older", "old"]);
    }

    #[test]
    fn dry_run_leaves_store_untouched() {
        let store = LocalStore::in_memory();
        store.insert(synced("old", 30));

        run(store, Duration::from_secs(60), true).unwrap();
    }

    #[test]
    fn sweep_removes_expired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = LocalStore::open(Box::new(
            formsync_store::FileBackend::open(&path).unwrap(),
        ))
        .unwrap();
        store.insert(synced("old", 30));
        store.insert(synced("fresh", 1));
        store.save().unwrap();

        run(store, Duration::from_secs(24 * 60 * 60), false).unwrap();

        let reopened = LocalStore::open(Box::new(
            formsync_store::FileBackend::open(&path).unwrap(),
        ))
        .unwrap();
        let left: Vec<String> = reopened
            .all::<FormResponse>()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(left, vec!["fresh"]);
    }
}
