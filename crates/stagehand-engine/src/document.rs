//! Untyped key/value documents exchanged with engines.
//!
//! Engine payloads have no schema known to the orchestrator, so every
//! accessor fails closed: a missing key and a value of the wrong type both
//! read as `None`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON object with typed, non-panicking accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a value if it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    pub fn get_doc(&self, key: &str) -> Option<Document> {
        match self.0.get(key) {
            Some(Value::Object(map)) => Some(Document(map.clone())),
            _ => None,
        }
    }

    /// String-valued entries of a nested object; non-string values are skipped.
    pub fn get_string_map(&self, key: &str) -> Option<BTreeMap<String, String>> {
        match self.0.get(key) {
            Some(Value::Object(map)) => Some(
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// String items of a nested array; non-string items are skipped.
    pub fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        match self.0.get(key) {
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Copy every entry of `other` into `self`; `other` wins on conflicts.
    pub fn merge(&mut self, other: &Document) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}

impl From<&BTreeMap<String, String>> for Document {
    fn from(map: &BTreeMap<String, String>) -> Self {
        Self(
            map.iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Document {
        Document::from_value(json!({
            "name": "kind",
            "ready": true,
            "port": 6443,
            "files": {"kubeconfig": "/tmp/k", "bad": 3},
            "managedResources": ["/tmp/a", 7, "cluster-x"],
            "nested": {"a": 1}
        }))
        .unwrap()
    }

    #[test]
    fn typed_getters_return_present_values() {
        let d = sample();
        assert_eq!(d.get_str("name"), Some("kind"));
        assert_eq!(d.get_bool("ready"), Some(true));
        assert_eq!(d.get_u64("port"), Some(6443));
        assert!(d.get_doc("nested").is_some());
    }

    #[test]
    fn wrong_type_reads_as_absent() {
        let d = sample();
        assert_eq!(d.get_str("port"), None);
        assert_eq!(d.get_bool("name"), None);
        assert!(d.get_doc("name").is_none());
        assert!(d.get_string_map("managedResources").is_none());
        assert!(d.get_string_list("files").is_none());
        assert_eq!(d.get_str("missing"), None);
    }

    #[test]
    fn collection_getters_skip_non_strings() {
        let d = sample();
        let files = d.get_string_map("files").unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files["kubeconfig"], "/tmp/k");
        assert_eq!(
            d.get_string_list("managedResources").unwrap(),
            vec!["/tmp/a", "cluster-x"]
        );
    }

    #[test]
    fn from_value_rejects_non_objects() {
        assert!(Document::from_value(json!([1, 2])).is_none());
        assert!(Document::from_value(json!("x")).is_none());
        assert!(Document::from_value(Value::Null).is_none());
    }

    #[test]
    fn merge_overwrites_conflicts() {
        let mut base = Document::new().with("a", 1).with("b", "keep");
        base.merge(&Document::new().with("a", 2).with("c", true));
        assert_eq!(base.get_u64("a"), Some(2));
        assert_eq!(base.get_str("b"), Some("keep"));
        assert_eq!(base.get_bool("c"), Some(true));
    }
}
