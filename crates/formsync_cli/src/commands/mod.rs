//! CLI command implementations.

pub mod ledger;
pub mod pending;
pub mod sweep;
pub mod sync;
