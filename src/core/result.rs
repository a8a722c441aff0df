/// Client result shapes and their conversion to plain JSON
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A result as returned by the cluster client
#[derive(Debug, Clone, PartialEq)]
pub enum CouchResult {
    /// Plain data with no client wrapper
    Scalar(Value),
    /// A document fetch result carrying the stored value and its CAS
    Wrapped { value: Value, cas: Option<u64> },
    /// Keyed results, e.g. one entry per key of a multi-get
    Map(BTreeMap<String, CouchResult>),
    /// Ordered results, e.g. view rows
    Seq(Vec<CouchResult>),
}

impl CouchResult {
    pub fn wrapped(value: Value, cas: u64) -> Self {
        CouchResult::Wrapped {
            value,
            cas: Some(cas),
        }
    }

    /// CAS of a wrapped result
    pub fn cas(&self) -> Option<u64> {
        match self {
            CouchResult::Wrapped { cas, .. } => *cas,
            _ => None,
        }
    }
}

impl From<Value> for CouchResult {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(members) => CouchResult::Map(
                members
                    .into_iter()
                    .map(|(k, v)| (k, CouchResult::from(v)))
                    .collect(),
            ),
            Value::Array(items) => {
                CouchResult::Seq(items.into_iter().map(CouchResult::from).collect())
            }
            other => CouchResult::Scalar(other),
        }
    }
}

/// Strip client wrappers down to plain JSON.
///
/// A wrapped result yields its value untouched; maps and sequences are
/// rebuilt member by member with keys and order preserved.
pub fn normalize(result: &CouchResult) -> Value {
    match result {
        CouchResult::Wrapped { value, .. } => value.clone(),
        CouchResult::Map(members) => {
            let mut object = Map::with_capacity(members.len());
            for (key, member) in members {
                object.insert(key.clone(), normalize(member));
            }
            Value::Object(object)
        }
        CouchResult::Seq(items) => Value::Array(items.iter().map(normalize).collect()),
        CouchResult::Scalar(value) => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn multi_get_result() -> CouchResult {
        let mut members = BTreeMap::new();
        members.insert("doc1".to_string(), CouchResult::wrapped(json!({"id": 1}), 11));
        members.insert("doc2".to_string(), CouchResult::wrapped(json!([1, 2]), 12));
        members.insert("missing".to_string(), CouchResult::Scalar(Value::Null));
        CouchResult::Map(members)
    }

    #[test]
    fn test_wrapped_value_is_unwrapped() {
        let result = CouchResult::wrapped(json!({"id": 1}), 7);
        assert_eq!(normalize(&result), json!({"id": 1}));
        assert_eq!(result.cas(), Some(7));
    }

    #[test]
    fn test_map_members_are_normalized() {
        assert_eq!(
            normalize(&multi_get_result()),
            json!({"doc1": {"id": 1}, "doc2": [1, 2], "missing": null})
        );
    }

    #[test]
    fn test_sequence_order_preserved() {
        let rows = CouchResult::Seq(vec![
            CouchResult::wrapped(json!("b"), 2),
            CouchResult::Scalar(json!(3)),
            CouchResult::wrapped(json!("a"), 1),
        ]);
        assert_eq!(normalize(&rows), json!(["b", 3, "a"]));
    }

    #[test]
    fn test_wrapped_value_not_descended() {
        // A stored document that happens to contain a "value" member stays intact.
        let result = CouchResult::wrapped(json!({"value": {"nested": true}}), 1);
        assert_eq!(normalize(&result), json!({"value": {"nested": true}}));
    }

    #[test]
    fn test_normalize_idempotent() {
        let shapes = vec![
            multi_get_result(),
            CouchResult::wrapped(json!({"value": 5}), 3),
            CouchResult::Seq(vec![multi_get_result(), CouchResult::Scalar(json!("x"))]),
            CouchResult::Scalar(json!(42)),
        ];

        for shape in shapes {
            let once = normalize(&shape);
            let twice = normalize(&CouchResult::from(once.clone()));
            assert_eq!(once, twice);
        }
    }
}
