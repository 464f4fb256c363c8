//! Typed collections held by the store.

use formsync_protocol::{collections, Answer, App, Form, FormResponse, LedgerEntry};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Every collection of the store; this is also the snapshot format.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Tables {
    #[serde(default, rename = "fsResp")]
    responses: Vec<FormResponse>,
    #[serde(default, rename = "answer")]
    answers: Vec<Answer>,
    #[serde(default, rename = "statusTable")]
    ledger: Vec<LedgerEntry>,
    #[serde(default, rename = "app")]
    apps: Vec<App>,
    #[serde(default, rename = "formstack")]
    forms: Vec<Form>,
}

/// A record type stored in one collection of [`Tables`].
pub trait Document: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name of the collection holding this type.
    const COLLECTION: &'static str;

    /// Returns the document id.
    fn id(&self) -> &str;

    /// Returns this type's collection.
    fn table(tables: &Tables) -> &Vec<Self>;

    /// Returns this type's collection, mutably.
    fn table_mut(tables: &mut Tables) -> &mut Vec<Self>;
}

macro_rules! document {
    ($ty:ty, $field:ident, $name:expr) => {
        impl Document for $ty {
            const COLLECTION: &'static str = $name;

            fn id(&self) -> &str {
                &self.id
            }

            fn table(tables: &Tables) -> &Vec<Self> {
                &tables.$field
            }

            fn table_mut(tables: &mut Tables) -> &mut Vec<Self> {
                &mut tables.$field
            }
        }
    };
}

document!(FormResponse, responses, collections::RESPONSES);
document!(Answer, answers, collections::ANSWERS);
document!(LedgerEntry, ledger, collections::LEDGER);
document!(App, apps, collections::APPS);
document!(Form, forms, collections::FORMS);
