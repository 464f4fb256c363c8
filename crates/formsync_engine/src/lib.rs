//! # FormSync Engine
//!
//! Offline-first sync engine for form responses.
//!
//! This crate provides:
//! - Status ledger tracking every sync attempt per resource
//! - Change detection over the store's change log and the ledger
//! - A push pipeline with per-response outcomes
//! - Retention sweeping of synced responses
//! - Incremental refresh of app and form definitions
//! - HTTP transport abstraction
//!
//! ## Architecture
//!
//! A **run cycle** checks connectivity and the signed-in user, then:
//! 1. Pushes every pending response, one request per response
//! 2. Sweeps synced responses past the retention window
//! 3. Refreshes the app and its forms, fetching only what changed since
//!    each resource's last successful fetch
//!
//! Cycles are triggered by a timer or by local saves. Overlapping
//! triggers are coalesced into the cycle already in flight.
//!
//! ## Key Invariants
//!
//! - Every pushed response resolves exactly once per batch
//! - A failure stays with its response and never aborts siblings
//! - Rejected responses are never pushed again, nor swept
//! - Watermarks only move on successful fetches

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod detector;
mod engine;
mod error;
mod events;
mod http;
mod identity;
mod ledger;
mod push;
mod reconciler;
mod resolver;
mod sweeper;
mod transport;

pub use config::SyncConfig;
pub use context::SyncContext;
pub use detector::{ChangeDetector, PendingSet};
pub use engine::{CycleReport, RunStatus, SaveDebouncer, SyncEngine, SyncState, SyncStats};
pub use error::{SyncError, SyncResult};
pub use events::{EventBus, SyncEvent};
pub use http::{HttpClient, HttpReply, HttpTransport};
pub use identity::{IdentityProvider, StaticIdentity};
pub use ledger::StatusLedger;
pub use push::{PushFailure, PushOutcome, PushPipeline, PushReport};
pub use reconciler::{target_form_slugs, ReconcileReport, ReferenceReconciler};
pub use resolver::{FullResponse, ResponseResolver, StoreResolver};
pub use sweeper::RetentionSweeper;
pub use transport::{MockFetch, MockSubmit, MockTransport, Transport};
