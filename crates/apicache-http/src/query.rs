//! Encoding of properties as URL query parameters.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Encode the scalar fields of a serializable struct as query parameters.
///
/// Strings are taken verbatim, numbers and booleans in their JSON spelling.
/// Nulls, arrays and nested objects are skipped, as is anything that does not
/// serialize to a JSON object.
pub fn encode_query<T: Serialize>(value: &T) -> BTreeMap<String, String> {
    let object = match serde_json::to_value(value) {
        Ok(Value::Object(object)) => object,
        Ok(_) => return BTreeMap::new(),
        Err(e) => {
            warn!(error = %e, "Failed to encode query parameters");
            return BTreeMap::new();
        }
    };

    object
        .into_iter()
        .filter_map(|(key, value)| scalar(value).map(|value| (key, value)))
        .collect()
}

fn scalar(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Props {
        title: String,
        pinned: bool,
        priority: i32,
        parent: Option<String>,
        tags: Vec<String>,
    }

    #[test]
    fn test_scalars_are_encoded() {
        let query = encode_query(&Props {
            title: "hello".into(),
            pinned: true,
            priority: -3,
            parent: None,
            tags: vec!["a".into()],
        });

        let expected: BTreeMap<String, String> = [
            ("pinned", "true"),
            ("priority", "-3"),
            ("title", "hello"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(query, expected);
    }

    #[test]
    fn test_non_objects_encode_nothing() {
        assert!(encode_query(&"plain").is_empty());
        assert!(encode_query(&vec![1, 2]).is_empty());
    }
}
