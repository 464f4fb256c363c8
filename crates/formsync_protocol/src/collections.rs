//! Names of the local store collections.

/// Captured form responses (the records pushed to the server).
pub const RESPONSES: &str = "fsResp";

/// Answers belonging to a form response.
pub const ANSWERS: &str = "answer";

/// Sync-attempt ledger.
pub const LEDGER: &str = "statusTable";

/// Cached app reference data.
pub const APPS: &str = "app";

/// Cached form (formstack) reference data.
pub const FORMS: &str = "formstack";
