//! Builds the full nested representation of a response for submission.

use crate::error::{SyncError, SyncResult};
use formsync_protocol::{collections, Answer, FormResponse};
use formsync_store::LocalStore;
use serde_json::{json, Value};
use std::sync::Arc;

/// A response expanded into the body the submit endpoint expects.
#[derive(Debug, Clone, PartialEq)]
pub struct FullResponse {
    /// Response id.
    pub id: String,
    /// Id of the form the response answers; part of the submit URI.
    pub form_id: String,
    /// Submit body.
    pub body: Value,
}

/// Expands a response id into its full representation.
pub trait ResponseResolver: Send + Sync {
    /// Resolves the response.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MissingResource`] if the response no longer
    /// exists.
    fn resolve(&self, response_id: &str) -> SyncResult<FullResponse>;
}

/// Resolves responses from the local store.
///
/// The body is the response's own fields plus a `formResps` list, one entry
/// per form in the stack, each holding `blockResps` with the answers of
/// that block. Forms appear in the order their first answer sorts; blocks
/// ascend, and answers within a block are ordered by question slug.
#[derive(Clone)]
pub struct StoreResolver {
    store: Arc<LocalStore>,
}

impl StoreResolver {
    /// Creates a resolver over the store.
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }
}

impl ResponseResolver for StoreResolver {
    fn resolve(&self, response_id: &str) -> SyncResult<FullResponse> {
        let response: FormResponse =
            self.store
                .get(response_id)
                .ok_or_else(|| SyncError::MissingResource {
                    collection: collections::RESPONSES,
                    id: response_id.to_string(),
                })?;

        let mut answers = self
            .store
            .find(|a: &Answer| a.fs_resp_id == response_id);
        answers.sort_by(|a, b| {
            (a.block, &a.question_slug).cmp(&(b.block, &b.question_slug))
        });

        let mut body = serde_json::to_value(&response)?;
        body["formResps"] = Value::Array(nest(&answers)?);

        Ok(FullResponse {
            id: response.id,
            form_id: response.fs_id,
            body,
        })
    }
}

fn nest(answers: &[Answer]) -> SyncResult<Vec<Value>> {
    let mut forms: Vec<(&str, Vec<(u32, Vec<Value>)>)> = Vec::new();
    for answer in answers {
        let index = match forms.iter().position(|(slug, _)| *slug == answer.form_slug) {
            Some(index) => index,
            None => {
                forms.push((answer.form_slug.as_str(), Vec::new()));
                forms.len() - 1
            }
        };
        let blocks = &mut forms[index].1;
        let value = serde_json::to_value(answer)?;
        match blocks.last_mut() {
            Some((block, values)) if *block == answer.block => values.push(value),
            _ => blocks.push((answer.block, vec![value])),
        }
    }

    Ok(forms
        .into_iter()
        .map(|(slug, blocks)| {
            let block_resps: Vec<Value> = blocks
                .into_iter()
                .map(|(block, answers)| json!({ "block": block, "answers": answers }))
                .collect();
            json!({ "formSlug": slug, "blockResps": block_resps })
        })
        .collect())
}
