//! Push pipeline: submits pending responses and settles each outcome.

use crate::error::{SyncError, SyncResult};
use crate::ledger::StatusLedger;
use crate::resolver::ResponseResolver;
use crate::transport::Transport;
use chrono::Utc;
use formsync_protocol::endpoints::submit_uri;
use formsync_protocol::{
    collections, FormResponse, HttpMethod, LedgerOutcome, ResponseStatus, SubmitReceipt,
};
use formsync_store::LocalStore;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A response that did not sync cleanly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushFailure {
    /// Id of the response.
    pub fs_resp_id: String,
    /// Server errors for a rejection, otherwise a description of the failure.
    pub errors: Vec<Value>,
    /// True if the server saved and rejected the response. Rejections are
    /// final; other failures are retried on the next cycle.
    pub rejected: bool,
}

/// Per-batch results of a push.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PushReport {
    /// One message per accepted response.
    pub success: Vec<String>,
    /// One entry per rejected or failed response.
    pub fail: Vec<PushFailure>,
    #[serde(skip)]
    settled: Vec<String>,
    #[serde(skip)]
    own_changes: Vec<u64>,
}

impl PushReport {
    /// Returns the ids of responses the server accepted or rejected.
    pub fn settled(&self) -> &[String] {
        &self.settled
    }

    /// Returns the change sequences produced by the pipeline's own writes.
    pub fn own_changes(&self) -> &[u64] {
        &self.own_changes
    }

    /// Returns the number of responses processed.
    pub fn processed(&self) -> usize {
        self.success.len() + self.fail.len()
    }
}

/// Completion of a batch, delivered once every response has resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// Every response was accepted.
    AllSucceeded(PushReport),
    /// At least one response was rejected or failed.
    AnyFailed(PushReport),
}

impl PushOutcome {
    /// Returns the report.
    pub fn report(&self) -> &PushReport {
        match self {
            PushOutcome::AllSucceeded(report) | PushOutcome::AnyFailed(report) => report,
        }
    }

    /// Consumes the outcome, returning the report.
    pub fn into_report(self) -> PushReport {
        match self {
            PushOutcome::AllSucceeded(report) | PushOutcome::AnyFailed(report) => report,
        }
    }

    /// Returns true if every response was accepted.
    pub fn is_success(&self) -> bool {
        matches!(self, PushOutcome::AllSucceeded(_))
    }
}

enum Settled {
    Accepted {
        id: String,
        message: String,
        own_change: Option<u64>,
    },
    Rejected {
        failure: PushFailure,
        own_change: Option<u64>,
    },
    Failed(PushFailure),
}

/// Submits responses one request per response and reconciles every
/// outcome against the store and the ledger.
///
/// Submissions of a batch run concurrently and complete in any order. Each
/// is bounded by the request timeout, so every response resolves exactly
/// once. Failures stay with their response; siblings are unaffected and
/// earlier successes are never rolled back.
pub struct PushPipeline<T: Transport> {
    transport: Arc<T>,
    store: Arc<LocalStore>,
    ledger: StatusLedger,
    resolver: Arc<dyn ResponseResolver>,
    timeout: Duration,
}

impl<T: Transport> PushPipeline<T> {
    /// Creates a pipeline.
    pub fn new(
        transport: Arc<T>,
        store: Arc<LocalStore>,
        ledger: StatusLedger,
        resolver: Arc<dyn ResponseResolver>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            ledger,
            resolver,
            timeout,
        }
    }

    /// Pushes the responses and returns the batch outcome.
    pub async fn push(&self, records: &[FormResponse]) -> PushOutcome {
        debug!(count = records.len(), "pushing responses");
        let settled = join_all(records.iter().map(|record| self.push_one(record))).await;

        let mut report = PushReport::default();
        for outcome in settled {
            match outcome {
                Settled::Accepted {
                    id,
                    message,
                    own_change,
                } => {
                    report.success.push(message);
                    report.settled.push(id);
                    report.own_changes.extend(own_change);
                }
                Settled::Rejected {
                    failure,
                    own_change,
                } => {
                    report.settled.push(failure.fs_resp_id.clone());
                    report.fail.push(failure);
                    report.own_changes.extend(own_change);
                }
                Settled::Failed(failure) => report.fail.push(failure),
            }
        }

        info!(
            succeeded = report.success.len(),
            failed = report.fail.len(),
            "push finished"
        );
        if report.fail.is_empty() {
            PushOutcome::AllSucceeded(report)
        } else {
            PushOutcome::AnyFailed(report)
        }
    }

    async fn push_one(&self, record: &FormResponse) -> Settled {
        let id = record.id.as_str();
        let resolved = self.resolver.resolve(id);
        let uri = match &resolved {
            Ok(full) => submit_uri(&full.form_id),
            Err(_) => submit_uri(&record.fs_id),
        };

        let result = match self
            .ledger
            .record_attempt(collections::RESPONSES, id, HttpMethod::Post, &uri)
        {
            Ok(_) => match resolved {
                Ok(full) => self.submit(&uri, &full.body).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        let settled = match result {
            Ok(receipt) if receipt.is_rejected() => self.reject(id, receipt.errors),
            Ok(receipt) => self.accept(record, receipt),
            Err(SyncError::Rejected { errors, .. }) => self.reject(id, errors),
            Err(e) => self.fail(id, e),
        };
        self.persist(id);
        settled
    }

    async fn submit(&self, uri: &str, body: &Value) -> SyncResult<SubmitReceipt> {
        match tokio::time::timeout(self.timeout, self.transport.submit(uri, body)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout),
        }
    }

    fn accept(&self, record: &FormResponse, receipt: SubmitReceipt) -> Settled {
        let id = record.id.clone();
        self.mark(&id, LedgerOutcome::Success);

        let own_change = self.update_record(&id, |r| {
            r.status = receipt.status;
            r.synced_at = Some(Utc::now());
        });

        let fs_slug = if receipt.fs_slug.is_empty() {
            record.fs_slug.as_str()
        } else {
            receipt.fs_slug.as_str()
        };
        let message = format!("{id} - {fs_slug} Formstack response successfully synced.");
        debug!(%message);
        Settled::Accepted {
            id,
            message,
            own_change,
        }
    }

    fn reject(&self, id: &str, errors: Vec<Value>) -> Settled {
        warn!(id, errors = errors.len(), "response rejected by the server");
        // The server kept the response, so the attempt itself succeeded.
        self.mark(id, LedgerOutcome::Success);

        let own_change = self.update_record(id, |r| {
            r.status = ResponseStatus::Rejected;
            r.errors = errors.clone();
        });
        Settled::Rejected {
            failure: PushFailure {
                fs_resp_id: id.to_string(),
                errors,
                rejected: true,
            },
            own_change,
        }
    }

    fn fail(&self, id: &str, error: SyncError) -> Settled {
        warn!(id, %error, retryable = error.is_retryable(), "response push failed");
        self.mark(id, LedgerOutcome::Fail);
        Settled::Failed(PushFailure {
            fs_resp_id: id.to_string(),
            errors: vec![Value::String(error.to_string())],
            rejected: false,
        })
    }

    fn mark(&self, id: &str, outcome: LedgerOutcome) {
        if let Err(e) = self
            .ledger
            .mark_outcome(collections::RESPONSES, id, outcome)
        {
            warn!(id, error = %e, "could not update ledger");
        }
    }

    fn update_record(&self, id: &str, change: impl FnOnce(&mut FormResponse)) -> Option<u64> {
        let Some(mut record) = self.store.get::<FormResponse>(id) else {
            warn!(id, "response vanished before its outcome was recorded");
            return None;
        };
        change(&mut record);
        match self.store.update(record) {
            Ok(sequence) => sequence,
            Err(e) => {
                warn!(id, error = %e, "could not update response");
                None
            }
        }
    }

    fn persist(&self, id: &str) {
        if let Err(e) = self.store.save() {
            warn!(id, error = %e, "could not persist push outcome");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::StoreResolver;
    use crate::transport::{MockSubmit, MockTransport};
    use formsync_protocol::LedgerStatus;
    use serde_json::json;

    struct Fixture {
        store: Arc<LocalStore>,
        ledger: StatusLedger,
        transport: Arc<MockTransport>,
        pipeline: PushPipeline<MockTransport>,
    }

    fn fixture(timeout: Duration) -> Fixture {
        let store = Arc::new(LocalStore::in_memory());
        store.track_changes(collections::RESPONSES);
        let ledger = StatusLedger::new(Arc::clone(&store));
        let transport = Arc::new(MockTransport::new());
        let pipeline = PushPipeline::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            ledger.clone(),
            Arc::new(StoreResolver::new(Arc::clone(&store))),
            timeout,
        );
        Fixture {
            store,
            ledger,
            transport,
            pipeline,
        }
    }

    fn pending(store: &LocalStore, id: &str) -> FormResponse {
        let record =
            FormResponse::new(id, "f1", "intake").with_status(ResponseStatus::PendingSubmit);
        store.insert(record.clone());
        record
    }

    #[tokio::test]
    async fn accepted_response_is_synced() {
        let fx = fixture(Duration::from_secs(5));
        let record = pending(&fx.store, "r1");

        let outcome = fx.pipeline.push(&[record]).await;
        assert!(outcome.is_success());
        let report = outcome.report();
        assert_eq!(
            report.success,
            vec!["r1 - intake Formstack response successfully synced.".to_string()]
        );
        assert_eq!(report.settled(), &["r1".to_string()]);
        assert_eq!(report.own_changes().len(), 1);

        let stored: FormResponse = fx.store.get("r1").unwrap();
        assert_eq!(stored.status, ResponseStatus::Synced);
        assert!(stored.synced_at.is_some());

        let entry = fx.ledger.entry(collections::RESPONSES, "r1").unwrap();
        assert_eq!(entry.status, LedgerStatus::Success);
        assert_eq!(entry.resource_uri, "pforms/formstack/f1/submit");

        let (uri, body) = &fx.transport.submitted()[0];
        assert_eq!(uri, "pforms/formstack/f1/submit");
        assert_eq!(body["id"], "r1");
        assert!(body["formResps"].is_array());
    }

    #[tokio::test]
    async fn rejection_attaches_errors() {
        let fx = fixture(Duration::from_secs(5));
        let record = pending(&fx.store, "r1");
        fx.transport
            .script_submit("r1", MockSubmit::Reject(vec![json!("q3 is required")]));

        let outcome = fx.pipeline.push(&[record]).await;
        let PushOutcome::AnyFailed(report) = outcome else {
            panic!("rejection must fail the batch");
        };
        assert_eq!(report.fail[0].fs_resp_id, "r1");
        assert!(report.fail[0].rejected);
        assert_eq!(report.settled(), &["r1".to_string()]);

        let stored: FormResponse = fx.store.get("r1").unwrap();
        assert_eq!(stored.status, ResponseStatus::Rejected);
        assert_eq!(stored.errors, vec![json!("q3 is required")]);
        assert_eq!(
            fx.ledger.entry(collections::RESPONSES, "r1").unwrap().status,
            LedgerStatus::Success
        );
    }

    #[tokio::test]
    async fn rejected_receipt_counts_as_rejection() {
        let fx = fixture(Duration::from_secs(5));
        let record = pending(&fx.store, "r1");
        fx.transport
            .script_submit("r1", MockSubmit::Accept(ResponseStatus::Rejected));

        let outcome = fx.pipeline.push(&[record]).await;
        assert!(!outcome.is_success());
        assert!(outcome.report().fail[0].rejected);
        assert_eq!(
            fx.store.get::<FormResponse>("r1").unwrap().status,
            ResponseStatus::Rejected
        );
    }

    #[tokio::test]
    async fn transport_failure_leaves_record_untouched() {
        let fx = fixture(Duration::from_secs(5));
        let record = pending(&fx.store, "r1");
        fx.ledger
            .record_attempt(collections::RESPONSES, "r1", HttpMethod::Post, "u")
            .unwrap();
        fx.transport
            .script_submit("r1", MockSubmit::Fail("connection reset".into()));

        let outcome = fx.pipeline.push(&[record]).await;
        let report = outcome.into_report();
        assert!(!report.fail[0].rejected);
        assert!(report.settled().is_empty());
        assert!(report.own_changes().is_empty());

        let stored: FormResponse = fx.store.get("r1").unwrap();
        assert_eq!(stored.status, ResponseStatus::PendingSubmit);
        let entry = fx.ledger.entry(collections::RESPONSES, "r1").unwrap();
        assert_eq!(entry.status, LedgerStatus::Fail);
        assert_eq!(entry.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_submission_times_out() {
        let fx = fixture(Duration::from_secs(30));
        let hung = pending(&fx.store, "r1");
        let fine = pending(&fx.store, "r2");
        fx.transport.script_submit("r1", MockSubmit::Hang);

        let outcome = fx.pipeline.push(&[hung, fine]).await;
        let report = outcome.report();
        assert_eq!(report.success.len(), 1);
        assert_eq!(report.fail.len(), 1);
        assert_eq!(report.fail[0].fs_resp_id, "r1");
        assert_eq!(report.fail[0].errors, vec![json!("operation timed out")]);
    }

    #[tokio::test]
    async fn unresolvable_record_fails_alone() {
        let fx = fixture(Duration::from_secs(5));
        let ghost = FormResponse::new("ghost", "f9", "intake");
        let record = pending(&fx.store, "r1");

        let outcome = fx.pipeline.push(&[ghost, record]).await;
        let report = outcome.report();
        assert_eq!(report.success.len(), 1);
        assert_eq!(report.fail[0].fs_resp_id, "ghost");

        let entry = fx.ledger.entry(collections::RESPONSES, "ghost").unwrap();
        assert_eq!(entry.status, LedgerStatus::Fail);
        assert_eq!(entry.resource_uri, "pforms/formstack/f9/submit");
        assert_eq!(fx.transport.submitted().len(), 1);
    }

    #[test]
    fn failure_serializes_camel_case() {
        let failure = PushFailure {
            fs_resp_id: "r1".into(),
            errors: vec![json!("bad")],
            rejected: true,
        };
        let value = serde_json::to_value(&failure).unwrap();
        assert_eq!(value["fsRespId"], "r1");
    }
}
