//! The sync engine: run cycles, single-flight guard, and trigger loop.

use crate::config::SyncConfig;
use crate::context::SyncContext;
use crate::detector::{ChangeDetector, PendingSet};
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use crate::identity::IdentityProvider;
use crate::ledger::StatusLedger;
use crate::push::{PushOutcome, PushPipeline};
use crate::reconciler::{ReconcileReport, ReferenceReconciler};
use crate::resolver::{ResponseResolver, StoreResolver};
use crate::sweeper::RetentionSweeper;
use crate::transport::Transport;
use chrono::Utc;
use formsync_protocol::{collections, Timestamp};
use formsync_store::LocalStore;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// The current phase of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle is running.
    Idle,
    /// Checking connectivity and the signed-in user.
    Checking,
    /// Pushing pending responses.
    Pushing,
    /// Sweeping expired responses.
    Sweeping,
    /// Refreshing app and form definitions.
    Reconciling,
}

impl SyncState {
    /// Returns true if a cycle is in progress.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncState::Idle)
    }
}

/// Statistics about sync cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles that ran to the end.
    pub cycles_completed: u64,
    /// Cycles cancelled for lack of network or user.
    pub cycles_aborted: u64,
    /// Triggers folded into a cycle already in flight.
    pub triggers_coalesced: u64,
    /// Responses the server accepted.
    pub responses_pushed: u64,
    /// Responses rejected or failed.
    pub responses_failed: u64,
    /// Responses removed by the sweeper.
    pub responses_swept: u64,
    /// When the last cycle completed.
    pub last_cycle_at: Option<Timestamp>,
    /// Error that cancelled the last aborted cycle.
    pub last_error: Option<String>,
}

/// Results of one completed cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Push outcome, if anything was pending.
    pub push: Option<PushOutcome>,
    /// Ids of swept responses.
    pub swept: Vec<String>,
    /// Reference reconciliation, if the app could be refreshed.
    pub reconcile: Option<ReconcileReport>,
    /// Wall time of the cycle.
    pub duration: Duration,
}

/// What a trigger led to.
#[derive(Debug, Clone)]
pub enum RunStatus {
    /// A cycle ran; this is the report of the last one.
    Completed(CycleReport),
    /// A cycle was in flight; it will run once more before finishing.
    Coalesced,
    /// A save signal arrived within the cooldown and was dropped.
    Debounced,
}

/// Drops save signals that follow a fired one within a cooldown window.
#[derive(Debug)]
pub struct SaveDebouncer {
    cooldown: Duration,
    last_fired: Mutex<Option<Instant>>,
}

impl SaveDebouncer {
    /// Creates a debouncer with the given cooldown.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_fired: Mutex::new(None),
        }
    }

    /// Returns true, and starts a new cooldown, if the signal may fire.
    pub fn try_fire(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last_fired.lock();
        match *last {
            Some(fired) if now.duration_since(fired) < self.cooldown => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// Holds the single-flight flag for one `run` call.
///
/// Dropping it before [`InFlight::finish`] means the `run` future was
/// cancelled mid-cycle: the flags and the state are reset so the next
/// trigger starts a fresh cycle.
struct InFlight<'a> {
    running: &'a AtomicBool,
    rerun: &'a AtomicBool,
    state: &'a RwLock<SyncState>,
    finished: bool,
}

impl<'a> InFlight<'a> {
    fn new(running: &'a AtomicBool, rerun: &'a AtomicBool, state: &'a RwLock<SyncState>) -> Self {
        Self {
            running,
            rerun,
            state,
            finished: false,
        }
    }

    /// Marks the flag as released by `run` itself.
    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!("sync cycle cancelled mid-flight");
        *self.state.write() = SyncState::Idle;
        self.rerun.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }
}

/// The sync engine drives pushes, sweeps, and reference refreshes.
///
/// A cycle checks connectivity, waits the settle delay so records saved
/// just before the trigger have their change notifications, checks for a
/// signed-in user, then pushes, sweeps, and reconciles. Each step is
/// best-effort; a failing step is logged and the next one still runs.
///
/// # Example
///
/// ```rust,no_run
/// use formsync_engine::{MockTransport, StaticIdentity, SyncConfig, SyncEngine};
/// use formsync_store::LocalStore;
/// use std::sync::Arc;
///
/// # async fn demo() -> formsync_engine::SyncResult<()> {
/// let engine = SyncEngine::new(
///     SyncConfig::new("https://forms.example.com", "field-app"),
///     Arc::new(LocalStore::in_memory()),
///     MockTransport::new(),
///     StaticIdentity::signed_in("surveyor"),
/// );
/// let mut events = engine.subscribe();
/// engine.run().await?;
/// # drop(events.try_recv());
/// # Ok(())
/// # }
/// ```
pub struct SyncEngine<T: Transport> {
    context: SyncContext,
    store: Arc<LocalStore>,
    transport: Arc<T>,
    identity: Arc<dyn IdentityProvider>,
    ledger: StatusLedger,
    detector: ChangeDetector,
    pipeline: PushPipeline<T>,
    sweeper: RetentionSweeper,
    reconciler: ReferenceReconciler<T>,
    events: EventBus,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    running: AtomicBool,
    rerun: AtomicBool,
    debouncer: SaveDebouncer,
}

impl<T: Transport> SyncEngine<T> {
    /// Creates an engine over the store. Starts tracking response changes.
    pub fn new(
        config: SyncConfig,
        store: Arc<LocalStore>,
        transport: T,
        identity: impl IdentityProvider + 'static,
    ) -> Self {
        store.track_changes(collections::RESPONSES);
        let transport = Arc::new(transport);
        let ledger = StatusLedger::new(Arc::clone(&store));
        let events = EventBus::default();

        Self {
            detector: ChangeDetector::new(Arc::clone(&store), ledger.clone()),
            pipeline: PushPipeline::new(
                Arc::clone(&transport),
                Arc::clone(&store),
                ledger.clone(),
                Arc::new(StoreResolver::new(Arc::clone(&store))),
                config.request_timeout,
            ),
            sweeper: RetentionSweeper::new(Arc::clone(&store), ledger.clone()),
            reconciler: ReferenceReconciler::new(
                Arc::clone(&transport),
                Arc::clone(&store),
                ledger.clone(),
                events.clone(),
                config.app_slug.clone(),
                config.request_timeout,
            ),
            debouncer: SaveDebouncer::new(config.save_cooldown),
            context: SyncContext::new(config),
            identity: Arc::new(identity),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            running: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
            store,
            transport,
            ledger,
            events,
        }
    }

    /// Replaces the resolver that expands responses for submission.
    pub fn with_resolver(mut self, resolver: impl ResponseResolver + 'static) -> Self {
        self.pipeline = PushPipeline::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.store),
            self.ledger.clone(),
            Arc::new(resolver),
            self.context.config().request_timeout,
        );
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        self.context.config()
    }

    /// Returns the result of the latest connectivity check.
    pub fn is_online(&self) -> bool {
        self.context.is_online()
    }

    /// Returns the current phase.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Returns the statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the status ledger.
    pub fn ledger(&self) -> &StatusLedger {
        &self.ledger
    }

    /// Subscribes to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Returns the responses the next cycle would push.
    pub fn pending_push_set(&self) -> PendingSet {
        self.detector.pending_push_set()
    }

    /// Returns true if a cycle is in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Runs a cycle unless one is already in flight.
    ///
    /// A trigger arriving mid-cycle returns [`RunStatus::Coalesced`] at once
    /// and makes the in-flight call run one more cycle before it returns.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoNetwork`] or [`SyncError::NoUser`] if the last
    /// cycle was cancelled.
    pub async fn run(&self) -> SyncResult<RunStatus> {
        if self.running.swap(true, Ordering::SeqCst) {
            self.rerun.store(true, Ordering::SeqCst);
            self.stats.write().triggers_coalesced += 1;
            debug!("cycle in flight, trigger coalesced");
            return Ok(RunStatus::Coalesced);
        }
        let mut guard = InFlight::new(&self.running, &self.rerun, &self.state);

        let mut result = self.run_cycle().await;
        loop {
            if self.rerun.swap(false, Ordering::SeqCst) {
                debug!("running coalesced cycle");
                result = self.run_cycle().await;
                continue;
            }
            self.running.store(false, Ordering::SeqCst);
            // A trigger may land between the check and the release.
            if self.rerun.load(Ordering::SeqCst) && !self.running.swap(true, Ordering::SeqCst) {
                continue;
            }
            break;
        }
        guard.finish();
        result.map(RunStatus::Completed)
    }

    /// Handles a local-save signal: runs a cycle unless another save fired
    /// within the cooldown.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::run`].
    pub async fn on_local_save(&self) -> SyncResult<RunStatus> {
        if !self.debouncer.try_fire() {
            debug!("save signal within cooldown, ignored");
            return Ok(RunStatus::Debounced);
        }
        self.run().await
    }

    /// Runs cycles every `interval` and on every save signal until the save
    /// channel closes.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the interval is zero.
    pub async fn drive(&self, interval: Duration, mut saves: mpsc::Receiver<()>) -> SyncResult<()> {
        if interval.is_zero() {
            return Err(SyncError::Config("sync interval must be positive".into()));
        }
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(?interval, "sync loop started");
        loop {
            let status = tokio::select! {
                _ = ticker.tick() => self.run().await,
                save = saves.recv() => match save {
                    Some(()) => self.on_local_save().await,
                    None => break,
                },
            };
            match status {
                Ok(RunStatus::Completed(report)) => debug!(
                    swept = report.swept.len(),
                    duration = ?report.duration,
                    "cycle completed"
                ),
                Ok(RunStatus::Coalesced | RunStatus::Debounced) => {}
                Err(e) => debug!(error = %e, "cycle cancelled"),
            }
        }
        info!("save channel closed, sync loop stopped");
        Ok(())
    }

    async fn run_cycle(&self) -> SyncResult<CycleReport> {
        let started = Instant::now();
        let config = self.context.config();

        self.set_state(SyncState::Checking);
        let online = self.check_connection().await;
        tokio::time::sleep(config.settle_delay).await;
        self.events.emit(SyncEvent::Start);

        if !online {
            warn!("no network found, sync cancelled");
            self.events.emit(SyncEvent::NoNetwork);
            return self.abort(SyncError::NoNetwork);
        }
        if self.identity.current_user().is_none() {
            warn!("no user found, sync cancelled");
            self.events.emit(SyncEvent::NoUser);
            return self.abort(SyncError::NoUser);
        }

        let pending = self.detector.pending_push_set();
        let push = if pending.is_empty() {
            self.store.discard_changes(pending.stale_sequences());
            None
        } else {
            self.set_state(SyncState::Pushing);
            let outcome = self.pipeline.push(pending.records()).await;
            self.settle_changes(&pending, &outcome);
            self.events.emit(match &outcome {
                PushOutcome::AllSucceeded(report) => SyncEvent::Success(report.clone()),
                PushOutcome::AnyFailed(report) => SyncEvent::Fail(report.clone()),
            });
            Some(outcome)
        };

        self.set_state(SyncState::Sweeping);
        let swept = self.sweeper.sweep(config.retention).unwrap_or_else(|e| {
            warn!(error = %e, "sweep failed");
            Vec::new()
        });

        self.set_state(SyncState::Reconciling);
        let reconcile = match self.reconciler.reconcile().await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "reference data not reconciled");
                None
            }
        };

        self.set_state(SyncState::Idle);
        self.events.emit(SyncEvent::Complete);

        let report = CycleReport {
            push,
            swept,
            reconcile,
            duration: started.elapsed(),
        };
        self.record_cycle(&report);
        Ok(report)
    }

    async fn check_connection(&self) -> bool {
        let timeout = self.context.config().request_timeout;
        let online = tokio::time::timeout(timeout, self.transport.ping())
            .await
            .unwrap_or(false);
        self.context.set_online(online);
        online
    }

    /// Drops the change notifications the batch dealt with. Notifications
    /// of failed responses stay so the next cycle retries them.
    fn settle_changes(&self, pending: &PendingSet, outcome: &PushOutcome) {
        let report = outcome.report();
        if let (PushOutcome::AllSucceeded(_), Some(high_water)) = (outcome, pending.high_water()) {
            self.store.acknowledge_changes(high_water);
        }
        let mut done = pending.sequences_for(report.settled().iter().map(String::as_str));
        done.extend_from_slice(pending.stale_sequences());
        done.extend_from_slice(report.own_changes());
        self.store.discard_changes(&done);
        // The change log is part of the snapshot; settled notifications must
        // not come back after a restart.
        if let Err(e) = self.store.save() {
            warn!(error = %e, "settled changes not persisted");
        }
    }

    fn abort(&self, error: SyncError) -> SyncResult<CycleReport> {
        self.set_state(SyncState::Idle);
        {
            let mut stats = self.stats.write();
            stats.cycles_aborted += 1;
            stats.last_error = Some(error.to_string());
        }
        Err(error)
    }

    fn record_cycle(&self, report: &CycleReport) {
        let mut stats = self.stats.write();
        stats.cycles_completed += 1;
        if let Some(push) = &report.push {
            stats.responses_pushed += push.report().success.len() as u64;
            stats.responses_failed += push.report().fail.len() as u64;
        }
        stats.responses_swept += report.swept.len() as u64;
        stats.last_cycle_at = Some(Utc::now());
        stats.last_error = None;
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }
}
