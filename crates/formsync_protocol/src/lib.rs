//! # FormSync Protocol
//!
//! Record, ledger and wire types shared by the FormSync store and engine.
//!
//! This crate provides:
//! - `FormResponse` and `Answer`, the locally captured survey data
//! - `LedgerEntry`, the canonical sync-attempt record
//! - `App` and `Form`, read-only reference entities
//! - `ChangeNotification`, emitted by the local store on every mutation
//! - `SubmitReceipt` and endpoint builders for the forms server
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
pub mod collections;
pub mod endpoints;
mod ledger;
mod reference;
mod response;

pub use change::{ChangeNotification, ChangeOp};
pub use ledger::{HttpMethod, LedgerEntry, LedgerOutcome, LedgerStatus};
pub use reference::{App, Form, FormstackRef};
pub use response::{Answer, FormResponse, ResponseStatus, SubmitReceipt};

/// Timestamp type used across records and the ledger.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
