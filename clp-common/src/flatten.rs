//! Flattening of generated plan data into template replacements

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Flatten a JSON object into `key → text` replacements
///
/// Nested object keys are concatenated without a separator, arrays become
/// newline-joined text, `null` becomes an empty string.
pub fn flatten_json(data: &Map<String, Value>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (key, value) in data {
        flatten_into(value, key.clone(), &mut out);
    }
    out
}

fn flatten_into(value: &Value, name: String, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                flatten_into(inner, format!("{}{}", name, key), out);
            }
        }
        Value::Array(items) => {
            let joined = items.iter().map(scalar_text).collect::<Vec<_>>().join("\n");
            out.insert(name, joined);
        }
        other => {
            out.insert(name, scalar_text(other));
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Merge `overlay` into `base`, overlay keys winning
pub fn merge_into(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        base.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_flatten_nested_and_lists() {
        let data = object(json!({
            "W1_LO": "Explain",
            "units": 3,
            "meta": {"A": "x", "B": {"C": true}},
            "refs": ["Book", "Site"],
            "empty": null,
        }));

        let flat = flatten_json(&data);
        assert_eq!(flat["W1_LO"], "Explain");
        assert_eq!(flat["units"], "3");
        assert_eq!(flat["metaA"], "x");
        assert_eq!(flat["metaBC"], "true");
        assert_eq!(flat["refs"], "Book\nSite");
        assert_eq!(flat["empty"], "");
    }

    #[test]
    fn test_merge_overlay_wins() {
        let mut base = object(json!({"subject": "AI", "IT01_T": "✔"}));
        merge_into(&mut base, object(json!({"subject": "HCI"})));
        assert_eq!(base["subject"], "HCI");
        assert_eq!(base["IT01_T"], "✔");
    }
}
