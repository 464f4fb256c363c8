//! Endpoint paths of the forms server.

use crate::Timestamp;
use chrono::{SecondsFormat, TimeZone, Utc};

/// Watermark used for resources that were never fetched.
pub fn watermark_epoch() -> Timestamp {
    Utc.with_ymd_and_hms(2015, 2, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Submission endpoint for responses to the given form.
pub fn submit_uri(form_id: &str) -> String {
    format!("pforms/formstack/{form_id}/submit")
}

/// Un-nested app endpoint.
pub fn app_uri(app_id: &str) -> String {
    format!("/api/v2/pforms/app/{app_id}")
}

/// Form (formstack) endpoint.
pub fn form_uri(form_id: &str) -> String {
    format!("/api/v2/pforms/formstack/{form_id}")
}

/// Appends the `modified_gte` watermark filter to a resource URI.
pub fn modified_since(uri: &str, since: Timestamp) -> String {
    let separator = if uri.contains('?') { '&' } else { '?' };
    format!(
        "{uri}{separator}modified_gte={}",
        since.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}
