/*!
Opaque documents and the collection-to-documents mapping carried by every snapshot.

Documents are passed through untouched: the engine never looks inside them beyond
checking that each one is a JSON object.
*/

use crate::{Result, SnapvaultError};
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// One opaque key-value record of a collection, identity field included
pub type Document = Map<String, Value>;

/// Check that a collection name can be stored by every data store adapter
///
/// Names must be non-empty, must not start with `.` and must not contain path
/// separators or NUL.
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains(|c| matches!(c, '/' | '\\' | '\0'))
    {
        return Err(SnapvaultError::validation(format!(
            "invalid collection name '{name}'"
        )));
    }
    Ok(())
}

/// Ordered mapping from collection name to that collection's documents
///
/// This is both the body of a snapshot artifact and the payload accepted by a
/// restore. Entry order is preserved: exports keep the data store's
/// enumeration order and restores process collections in the order given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotBody {
    collections: Vec<(String, Vec<Document>)>,
}

impl SnapshotBody {
    /// Create an empty body
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collection, replacing the documents of an existing entry with the same name
    pub fn insert<S: Into<String>>(&mut self, name: S, documents: Vec<Document>) {
        let name = name.into();
        match self.collections.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = documents,
            None => self.collections.push((name, documents)),
        }
    }

    /// Documents recorded for a collection
    pub fn get(&self, name: &str) -> Option<&[Document]> {
        self.collections
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, documents)| documents.as_slice())
    }

    /// Collection names in body order
    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.iter().map(|(name, _)| name.as_str())
    }

    /// Iterate over `(collection, documents)` pairs in body order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Document])> {
        self.collections
            .iter()
            .map(|(name, documents)| (name.as_str(), documents.as_slice()))
    }

    /// Number of collections
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Total number of documents across all collections
    pub fn document_count(&self) -> usize {
        self.collections.iter().map(|(_, documents)| documents.len()).sum()
    }

    /// Consume the body, yielding owned `(collection, documents)` pairs in order
    pub fn into_collections(self) -> Vec<(String, Vec<Document>)> {
        self.collections
    }

    /// Build a body from an already parsed JSON value
    ///
    /// # Errors
    /// * `SnapvaultError::Validation` - If the value is not an object, a collection
    ///   name is not acceptable to [`validate_collection_name`], a collection value
    ///   is not an array, or an element of an array is not an object
    pub fn from_value(value: Value) -> Result<Self> {
        let map = match value {
            Value::Object(map) => map,
            other => {
                return Err(SnapvaultError::validation(format!(
                    "snapshot payload must be an object of collection names, got {}",
                    json_kind(&other)
                )))
            }
        };

        let mut collections = Vec::with_capacity(map.len());
        for (name, documents) in map {
            validate_collection_name(&name)?;

            let documents = match documents {
                Value::Array(items) => items,
                other => {
                    return Err(SnapvaultError::validation(format!(
                        "collection '{name}' must map to an array of documents, got {}",
                        json_kind(&other)
                    )))
                }
            };

            let mut parsed = Vec::with_capacity(documents.len());
            for (index, document) in documents.into_iter().enumerate() {
                match document {
                    Value::Object(fields) => parsed.push(fields),
                    other => {
                        return Err(SnapvaultError::validation(format!(
                            "document {index} of collection '{name}' must be an object, got {}",
                            json_kind(&other)
                        )))
                    }
                }
            }

            collections.push((name, parsed));
        }

        Ok(Self { collections })
    }

    /// Parse a body from raw artifact or request bytes
    ///
    /// Bytes that are not JSON at all are reported as a validation failure, the
    /// same as a well-formed payload of the wrong shape.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| SnapvaultError::validation(format!("snapshot payload is not valid JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Serialize to the artifact file format
    pub fn to_vec_pretty(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

impl FromIterator<(String, Vec<Document>)> for SnapshotBody {
    fn from_iter<I: IntoIterator<Item = (String, Vec<Document>)>>(iter: I) -> Self {
        let mut body = Self::new();
        for (name, documents) in iter {
            body.insert(name, documents);
        }
        body
    }
}

impl Serialize for SnapshotBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.collections.len()))?;
        for (name, documents) in &self.collections {
            map.serialize_entry(name, documents)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SnapshotBody {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(D::Error::custom)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("test document must be an object"),
        }
    }

    #[test]
    fn test_from_value_preserves_collection_order() {
        let body = SnapshotBody::from_value(json!({
            "zeta": [],
            "alpha": [{"_id": "a1"}],
            "mid": [{"_id": "m1"}, {"_id": "m2"}]
        }))
        .unwrap();

        let names: Vec<&str> = body.collection_names().collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(body.document_count(), 3);
        assert_eq!(body.get("mid").unwrap().len(), 2);
    }

    #[test]
    fn test_rejects_non_object_payload() {
        for payload in [json!([]), json!("users"), json!(42), json!(null)] {
            let err = SnapshotBody::from_value(payload).unwrap_err();
            assert!(err.is_validation(), "unexpected error: {err}");
        }
    }

    #[test]
    fn test_rejects_non_array_collection() {
        let err = SnapshotBody::from_value(json!({"users": {"_id": "u1"}})).unwrap_err();
        assert!(err.to_string().contains("users"));
        assert!(err.is_validation());
    }

    #[test]
    fn test_rejects_non_object_document() {
        let err = SnapshotBody::from_value(json!({"users": [{"_id": "u1"}, 7]})).unwrap_err();
        assert!(err.to_string().contains("document 1"));
    }

    #[test]
    fn test_rejects_unstorable_collection_names() {
        for name in ["", ".hidden", "../users", "a/b", "a\\b", "nul\0"] {
            let mut payload = Map::new();
            payload.insert(name.to_string(), json!([]));
            let err = SnapshotBody::from_value(Value::Object(payload)).unwrap_err();
            assert!(err.is_validation(), "accepted {name:?}");
        }
        assert!(validate_collection_name("users.archive").is_ok());
    }

    #[test]
    fn test_rejects_invalid_json_bytes() {
        let err = SnapshotBody::from_slice(b"{ not json").unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_documents_pass_through_verbatim() {
        let original = json!({
            "orders": [{"_id": "o1", "items": [{"sku": "A", "qty": 2}], "paid": true, "note": null}]
        });
        let body = SnapshotBody::from_value(original.clone()).unwrap();
        let bytes = body.to_vec_pretty().unwrap();
        let written: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(written, original);
    }

    #[test]
    fn test_insert_replaces_existing_collection() {
        let mut body = SnapshotBody::new();
        body.insert("users", vec![doc(json!({"_id": "old"}))]);
        body.insert("users", vec![doc(json!({"_id": "new"}))]);

        assert_eq!(body.len(), 1);
        assert_eq!(body.get("users").unwrap()[0]["_id"], json!("new"));
    }
}
