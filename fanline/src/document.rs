//! Documents, filters and projections.
//!
//! Message bodies are JSON objects; on the wire a body is the serialized
//! bytes, opaque to every layer below this one. `Matcher` and `Projection`
//! are the per-subscription delivery adapters: the filter runs first and
//! drops non-matching bodies, the projection then reshapes what is
//! delivered. Both are pure with respect to the body they receive.

use bytes::Bytes;
use serde::de::Error as _;
use serde_json::Value;

/// A message body: a JSON object.
pub type Document = serde_json::Map<String, Value>;

/// Serialize a document to its wire bytes.
///
/// # Errors
///
/// Returns the underlying serialization error.
pub fn encode(doc: &Document) -> serde_json::Result<Bytes> {
    serde_json::to_vec(doc).map(Bytes::from)
}

/// Deserialize wire bytes back into a document.
///
/// # Errors
///
/// Returns an error for invalid JSON or a body that is not an object.
pub fn decode(bytes: &[u8]) -> serde_json::Result<Document> {
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(map) => Ok(map),
        _ => Err(serde_json::Error::custom("message body must be an object")),
    }
}

/// Equality filter over top-level fields.
///
/// Every `(field, value)` pair in the filter must be present and equal in a
/// document for it to match; a missing field never matches. An empty filter
/// matches everything.
#[derive(Debug, Clone)]
pub struct Matcher {
    conditions: Document,
}

impl Matcher {
    #[must_use]
    pub fn new(filter: Document) -> Self {
        Self { conditions: filter }
    }

    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|(k, v)| doc.get(k) == Some(v))
    }
}

/// Field selector in the document-database style.
///
/// Spec values `1`/`true` include a field, `0`/`false` exclude it. A spec
/// with any non-`_id` inclusion selects exactly the included fields (plus
/// `_id` unless explicitly excluded); otherwise the named fields are removed
/// and everything else kept.
#[derive(Debug, Clone)]
pub struct Projection {
    fields: Vec<(String, bool)>,
    include_mode: bool,
}

impl Projection {
    #[must_use]
    pub fn new(spec: Document) -> Self {
        let fields: Vec<(String, bool)> =
            spec.iter().map(|(k, v)| (k.clone(), truthy(v))).collect();
        let include_mode = fields.iter().any(|(k, included)| *included && k != "_id");
        Self {
            fields,
            include_mode,
        }
    }

    /// Apply the projection to a document, producing the delivered body.
    #[must_use]
    pub fn transform(&self, doc: &Document) -> Document {
        if self.include_mode {
            let mut out = Document::new();
            if let Some(v) = doc.get("_id") {
                let id_excluded = self
                    .fields
                    .iter()
                    .any(|(k, included)| k == "_id" && !included);
                if !id_excluded {
                    out.insert("_id".to_string(), v.clone());
                }
            }
            for (k, included) in &self.fields {
                if *included && k != "_id" {
                    if let Some(v) = doc.get(k) {
                        out.insert(k.clone(), v.clone());
                    }
                }
            }
            out
        } else {
            let mut out = doc.clone();
            for (k, included) in &self.fields {
                if !included {
                    out.remove(k);
                }
            }
            out
        }
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        _ => true,
    }
}
