//! Document type: the engine's unit of stored data.
//!
//! Simplified relative to the teacher's `DocumentId` (no `ObjectId`/string
//! variants) because this engine's ids are always monotone positive
//! integers assigned by the `create` operation.

use serde_json::{Map, Value};

/// A stored document: a positive integer id plus arbitrary user fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: u64,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: u64, mut fields: Map<String, Value>) -> Self {
        fields.remove("_id");
        Document { id, fields }
    }

    /// Build a document from a user-supplied JSON object, assigning `id`
    /// and overwriting any `_id` the caller may have supplied.
    pub fn from_value(id: u64, value: Value) -> crate::error::Result<Self> {
        match value {
            Value::Object(map) => Ok(Document::new(id, map)),
            _ => Err(crate::error::Error::validation(
                "document data must be an object",
            )),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Render the document as a single JSON object with `_id` present.
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("_id".to_string(), Value::from(self.id));
        Value::Object(map)
    }

    pub fn into_value(self) -> Value {
        let mut map = self.fields;
        map.insert("_id".to_string(), Value::from(self.id));
        Value::Object(map)
    }
}

/// Render a partition's documents as the on-disk JSON array form.
pub fn document_vec_to_value(docs: &[Document]) -> Value {
    Value::Array(docs.iter().map(Document::to_value).collect())
}

impl serde::Serialize for Document {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Document {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let mut map = Map::deserialize(deserializer)?;
        let id = map
            .remove("_id")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| serde::de::Error::missing_field("_id"))?;
        Ok(Document { id, fields: map })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_value_rejects_non_object() {
        let err = Document::from_value(1, json!("not an object")).unwrap_err();
        assert!(matches!(err, crate::error::Error::Validation(_)));
    }

    #[test]
    fn to_value_includes_id() {
        let doc = Document::from_value(3, json!({"name": "Alice"})).unwrap();
        let v = doc.to_value();
        assert_eq!(v["_id"], json!(3));
        assert_eq!(v["name"], json!("Alice"));
    }

    #[test]
    fn round_trip_serde() {
        let doc = Document::from_value(7, json!({"x": 1})).unwrap();
        let s = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&s).unwrap();
        assert_eq!(doc, back);
    }
}
