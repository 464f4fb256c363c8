//! Reference reconciler: pulls app and form definitions from the server.

use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use crate::ledger::StatusLedger;
use crate::transport::Transport;
use formsync_protocol::endpoints::{app_uri, form_uri};
use formsync_protocol::{collections, App, Form, HttpMethod, LedgerOutcome, Timestamp};
use formsync_store::LocalStore;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What happened to each form during a reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Forms the server sent new data for.
    pub updated: Vec<String>,
    /// Forms the server reported unchanged.
    pub unchanged: Vec<String>,
    /// Forms whose fetch failed; their ledger entry stays pending.
    pub failed: Vec<String>,
    /// Slugs no form id could be found for.
    pub skipped: Vec<String>,
}

/// Returns the slugs of every form to refresh.
///
/// Starts from the local slugs and appends, in server order, the slugs the
/// app lists that are not local yet. The server's list is only trusted when
/// it is non-empty and its first element is a nested form carrying a slug;
/// otherwise the app's `localFormstacks` stand in for it.
pub fn target_form_slugs(app: &App, local: &[String]) -> Vec<String> {
    let remote = app
        .remote_form_slugs()
        .unwrap_or_else(|| app.local_formstacks.clone());

    let mut slugs: Vec<String> = Vec::with_capacity(local.len() + remote.len());
    for slug in local.iter().chain(remote.iter()) {
        if !slugs.contains(slug) {
            slugs.push(slug.clone());
        }
    }
    slugs
}

enum FormResult {
    Updated(String),
    Unchanged(String),
    Failed(String),
    Skipped(String),
}

/// Refreshes the cached app and its forms incrementally.
///
/// Every fetch asks only for changes since the resource's watermark, the
/// start of its latest successful fetch.
pub struct ReferenceReconciler<T: Transport> {
    transport: Arc<T>,
    store: Arc<LocalStore>,
    ledger: StatusLedger,
    events: EventBus,
    app_slug: String,
    timeout: Duration,
}

impl<T: Transport> ReferenceReconciler<T> {
    /// Creates a reconciler for the app with the given slug.
    pub fn new(
        transport: Arc<T>,
        store: Arc<LocalStore>,
        ledger: StatusLedger,
        events: EventBus,
        app_slug: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            ledger,
            events,
            app_slug: app_slug.into(),
            timeout,
        }
    }

    /// Refreshes the app, then every form it needs.
    ///
    /// # Errors
    ///
    /// Returns an error if the app itself could not be refreshed. Form
    /// failures are reported per slug instead.
    pub async fn reconcile(&self) -> SyncResult<ReconcileReport> {
        let app = self.reconcile_app().await?;
        let local = self.local_form_slugs();
        let slugs = target_form_slugs(&app, &local);
        Ok(self.reconcile_forms(&app, &slugs).await)
    }

    /// Refreshes the cached app and emits [`SyncEvent::AppReconciled`].
    ///
    /// Returns the app as cached after the refresh.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MissingResource`] if the app is not cached, or
    /// the fetch error. A failed fetch leaves the ledger entry pending.
    pub async fn reconcile_app(&self) -> SyncResult<App> {
        let app = self
            .store
            .find(|a: &App| a.slug == self.app_slug)
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::MissingResource {
                collection: collections::APPS,
                id: self.app_slug.clone(),
            })?;

        let uri = app_uri(&app.id);
        let since = self.ledger.watermark(collections::APPS, &app.id);
        self.ledger
            .record_attempt(collections::APPS, &app.id, HttpMethod::Get, &uri)?;
        self.persist();

        let data = match self.fetch(&uri, since).await {
            Ok(data) => data,
            Err(e) => {
                warn!(slug = %app.slug, error = %e, "app update failed");
                return Err(e);
            }
        };
        let app = match data {
            Some(data) => {
                let fresh: App = decode(data)?;
                self.store.upsert(fresh.clone());
                info!(slug = %fresh.slug, "app updated");
                fresh
            }
            None => {
                debug!(slug = %app.slug, "app unchanged");
                app
            }
        };

        self.ledger
            .mark_outcome(collections::APPS, &app.id, LedgerOutcome::Success)?;
        self.persist();
        self.events.emit(SyncEvent::AppReconciled(app.clone()));
        Ok(app)
    }

    /// Refreshes the given forms concurrently.
    ///
    /// A form's id comes from the cached form, or else from the app's
    /// server listing. Slugs with neither are skipped with a warning.
    pub async fn reconcile_forms(&self, app: &App, slugs: &[String]) -> ReconcileReport {
        let results = join_all(slugs.iter().map(|slug| self.reconcile_form(app, slug))).await;

        let mut report = ReconcileReport::default();
        for result in results {
            match result {
                FormResult::Updated(slug) => report.updated.push(slug),
                FormResult::Unchanged(slug) => report.unchanged.push(slug),
                FormResult::Failed(slug) => report.failed.push(slug),
                FormResult::Skipped(slug) => report.skipped.push(slug),
            }
        }
        debug!(?report, "forms reconciled");
        report
    }

    async fn reconcile_form(&self, app: &App, slug: &str) -> FormResult {
        let local = self
            .store
            .find(|f: &Form| f.slug == slug)
            .into_iter()
            .next();
        let id = match (&local, app.remote_form_id(slug)) {
            (Some(form), _) => form.id.clone(),
            (None, Some(id)) => id.to_string(),
            (None, None) => {
                warn!(slug, "no form id known, skipping");
                return FormResult::Skipped(slug.to_string());
            }
        };

        match self.refresh_form(&id, slug).await {
            Ok(true) => FormResult::Updated(slug.to_string()),
            Ok(false) => FormResult::Unchanged(slug.to_string()),
            Err(e) => {
                warn!(slug, error = %e, "form update failed");
                FormResult::Failed(slug.to_string())
            }
        }
    }

    async fn refresh_form(&self, id: &str, slug: &str) -> SyncResult<bool> {
        let uri = form_uri(id);
        let since = self.ledger.watermark(collections::FORMS, id);
        self.ledger
            .record_attempt(collections::FORMS, id, HttpMethod::Get, &uri)?;
        self.persist();

        let updated = match self.fetch(&uri, since).await? {
            Some(data) => {
                let form: Form = decode(data)?;
                self.store.upsert(form);
                true
            }
            None => {
                debug!(slug, "no updates for form");
                false
            }
        };

        self.ledger
            .mark_outcome(collections::FORMS, id, LedgerOutcome::Success)?;
        self.persist();
        Ok(updated)
    }

    async fn fetch(&self, uri: &str, since: Timestamp) -> SyncResult<Option<Value>> {
        match tokio::time::timeout(self.timeout, self.transport.fetch(uri, since)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout),
        }
    }

    fn local_form_slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = Vec::new();
        for form in self.store.all::<Form>() {
            if !slugs.contains(&form.slug) {
                slugs.push(form.slug);
            }
        }
        slugs
    }

    fn persist(&self) {
        if let Err(e) = self.store.save() {
            warn!(error = %e, "could not persist reconciliation state");
        }
    }
}

fn decode<D: DeserializeOwned>(data: Value) -> SyncResult<D> {
    Ok(serde_json::from_value(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockFetch, MockTransport};
    use formsync_protocol::endpoints::watermark_epoch;
    use formsync_protocol::{FormstackRef, LedgerStatus};
    use serde_json::json;

    fn listed(slug: &str, id: &str) -> FormstackRef {
        FormstackRef::Listed {
            slug: slug.into(),
            id: Some(id.into()),
        }
    }

    fn slugs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    struct Fixture {
        store: Arc<LocalStore>,
        ledger: StatusLedger,
        transport: Arc<MockTransport>,
        events: EventBus,
        reconciler: ReferenceReconciler<MockTransport>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(LocalStore::in_memory());
        let ledger = StatusLedger::new(Arc::clone(&store));
        let transport = Arc::new(MockTransport::new());
        let events = EventBus::default();
        let reconciler = ReferenceReconciler::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            ledger.clone(),
            events.clone(),
            "field-app",
            Duration::from_secs(5),
        );
        Fixture {
            store,
            ledger,
            transport,
            events,
            reconciler,
        }
    }

    #[test]
    fn remote_slugs_follow_local_ones() {
        let mut app = App::new("a1", "field-app");
        app.formstacks = vec![listed("intake", "f1"), listed("catch", "f2"), listed("site", "f3")];

        let targets = target_form_slugs(&app, &slugs(&["site", "legacy"]));
        assert_eq!(targets, slugs(&["site", "legacy", "intake", "catch"]));
    }

    #[test]
    fn malformed_remote_list_falls_back_to_local_formstacks() {
        let mut app = App::new("a1", "field-app");
        app.formstacks = vec![FormstackRef::Other(json!("f1"))];
        app.local_formstacks = slugs(&["intake", "site"]);

        let targets = target_form_slugs(&app, &slugs(&["site"]));
        assert_eq!(targets, slugs(&["site", "intake"]));

        app.formstacks.clear();
        assert_eq!(target_form_slugs(&app, &[]), slugs(&["intake", "site"]));
    }

    #[tokio::test]
    async fn app_is_fetched_from_epoch_then_watermark() {
        let fx = fixture();
        fx.store.insert(App::new("a1", "field-app"));
        let mut rx = fx.events.subscribe();
        fx.transport.script_fetch(
            "/api/v2/pforms/app/a1",
            MockFetch::Data(json!({"id": "a1", "slug": "field-app", "name": "Field"})),
        );

        let app = fx.reconciler.reconcile_app().await.unwrap();
        assert_eq!(app.fields["name"], "Field");
        assert!(matches!(rx.try_recv().unwrap(), SyncEvent::AppReconciled(a) if a.id == "a1"));

        let entry = fx.ledger.entry(collections::APPS, "a1").unwrap();
        assert_eq!(entry.status, LedgerStatus::Success);
        assert_eq!(entry.method, HttpMethod::Get);
        assert_eq!(
            fx.transport.fetched()[0],
            "/api/v2/pforms/app/a1?modified_gte=2015-02-01T00:00:00.000Z"
        );

        fx.reconciler.reconcile_app().await.unwrap();
        let watermark = fx.ledger.watermark(collections::APPS, "a1");
        assert_ne!(watermark, watermark_epoch());
        assert_ne!(fx.transport.fetched()[1], fx.transport.fetched()[0]);
        assert_eq!(fx.store.count::<App>(), 1);
    }

    #[tokio::test]
    async fn failed_app_fetch_stays_pending() {
        let fx = fixture();
        fx.store.insert(App::new("a1", "field-app"));
        fx.transport
            .script_fetch("/api/v2/pforms/app/a1", MockFetch::Fail("offline".into()));

        assert!(fx.reconciler.reconcile_app().await.is_err());
        let entry = fx.ledger.entry(collections::APPS, "a1").unwrap();
        assert_eq!(entry.status, LedgerStatus::Pending);
        assert_eq!(fx.ledger.watermark(collections::APPS, "a1"), watermark_epoch());
    }

    #[tokio::test]
    async fn unknown_app_is_missing() {
        let fx = fixture();
        let err = fx.reconciler.reconcile_app().await.unwrap_err();
        assert!(matches!(err, SyncError::MissingResource { .. }));
    }

    #[tokio::test]
    async fn forms_are_reconciled_per_slug() {
        let fx = fixture();
        let mut app = App::new("a1", "field-app");
        app.formstacks = vec![listed("intake", "f1"), listed("catch", "f2")];
        fx.store.insert(app.clone());
        fx.store.insert(Form::new("f3", "site"));

        fx.transport.script_fetch(
            "/api/v2/pforms/formstack/f1",
            MockFetch::Data(json!({"id": "f1", "slug": "intake", "title": "Intake"})),
        );
        fx.transport
            .script_fetch("/api/v2/pforms/formstack/f2", MockFetch::Fail("boom".into()));

        let slugs = slugs(&["site", "intake", "catch", "mystery"]);
        let report = fx.reconciler.reconcile_forms(&app, &slugs).await;
        assert_eq!(report.updated, vec!["intake".to_string()]);
        assert_eq!(report.unchanged, vec!["site".to_string()]);
        assert_eq!(report.failed, vec!["catch".to_string()]);
        assert_eq!(report.skipped, vec!["mystery".to_string()]);

        assert_eq!(fx.store.get::<Form>("f1").unwrap().fields["title"], "Intake");
        assert_eq!(
            fx.ledger.entry(collections::FORMS, "f3").unwrap().status,
            LedgerStatus::Success
        );
        assert_eq!(
            fx.ledger.entry(collections::FORMS, "f2").unwrap().status,
            LedgerStatus::Pending
        );
    }

    #[tokio::test]
    async fn reconcile_walks_app_then_forms() {
        let fx = fixture();
        fx.store.insert(Form::new("f3", "site"));
        fx.store.insert(App::new("a1", "field-app"));
        fx.transport.script_fetch(
            "/api/v2/pforms/app/a1",
            MockFetch::Data(json!({
                "id": "a1",
                "slug": "field-app",
                "formstacks": [{"slug": "intake", "id": "f1"}]
            })),
        );

        let report = fx.reconciler.reconcile().await.unwrap();
        assert_eq!(report.unchanged, slugs(&["site", "intake"]));
        assert_eq!(fx.transport.fetched().len(), 3);
    }

    #[tokio::test]
    async fn numeric_server_ids_keep_the_remote_list() {
        let fx = fixture();
        fx.store.insert(App::new("7", "field-app"));
        fx.transport.script_fetch(
            "/api/v2/pforms/app/7",
            MockFetch::Data(json!({
                "id": 7,
                "slug": "field-app",
                "formstacks": [{"slug": "intake", "id": 5}],
                "localFormstacks": ["legacy"]
            })),
        );
        fx.transport.script_fetch(
            "/api/v2/pforms/formstack/5",
            MockFetch::Data(json!({"id": 5, "slug": "intake"})),
        );

        let report = fx.reconciler.reconcile().await.unwrap();
        assert_eq!(report.updated, slugs(&["intake"]));
        assert!(report.skipped.is_empty());
        assert_eq!(fx.store.get::<Form>("5").unwrap().slug, "intake");
        assert_eq!(
            fx.ledger.entry(collections::FORMS, "5").unwrap().status,
            LedgerStatus::Success
        );
    }
}
