//! Read-only reference entities served by the forms server.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Reads an id the server may send as a string or a number.
fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "invalid id {other}, expected a string or a number"
        ))),
    }
}

/// Like [`id_string`], but anything other than a string or a number reads as absent.
fn optional_id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Reference to a form inside an app's `formstacks` list.
///
/// The server sends either nested objects carrying a slug or bare ids;
/// only the former counts as an authoritative slug list. A nested object
/// is recognized by its slug alone; its id may be a string, a number, or
/// missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormstackRef {
    /// Nested form object.
    Listed {
        /// Form slug.
        slug: String,
        /// Form id, when the server includes it.
        #[serde(
            default,
            deserialize_with = "optional_id_string",
            skip_serializing_if = "Option::is_none"
        )]
        id: Option<String>,
    },
    /// Anything else (bare id, unexpanded reference).
    Other(Value),
}

/// The app the device is enrolled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    /// App id.
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// App slug.
    pub slug: String,
    /// Forms the server lists for this app.
    #[serde(default)]
    pub formstacks: Vec<FormstackRef>,
    /// Forms the app declares for local use.
    #[serde(default)]
    pub local_formstacks: Vec<String>,
    /// Remaining server fields, kept verbatim.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl App {
    /// Creates an app with no form lists.
    pub fn new(id: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            slug: slug.into(),
            formstacks: Vec::new(),
            local_formstacks: Vec::new(),
            fields: Map::new(),
        }
    }

    /// Returns the server's slug list, or `None` when the list is empty or
    /// its first element is not a nested form.
    pub fn remote_form_slugs(&self) -> Option<Vec<String>> {
        match self.formstacks.first() {
            Some(FormstackRef::Listed { .. }) => Some(
                self.formstacks
                    .iter()
                    .filter_map(|fs| match fs {
                        FormstackRef::Listed { slug, .. } => Some(slug.clone()),
                        FormstackRef::Other(_) => None,
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Looks up the id the server lists for a form slug.
    pub fn remote_form_id(&self, slug: &str) -> Option<&str> {
        self.formstacks.iter().find_map(|fs| match fs {
            FormstackRef::Listed { slug: s, id: Some(id) } if s == slug => Some(id.as_str()),
            _ => None,
        })
    }
}

/// A form (formstack) definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    /// Form id.
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// Form slug.
    pub slug: String,
    /// Remaining server fields, kept verbatim.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Form {
    /// Creates a form with no extra fields.
    pub fn new(id: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            slug: slug.into(),
            fields: Map::new(),
        }
    }
}
