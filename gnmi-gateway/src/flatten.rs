//! Expansion of structured JSON payloads into leaf value records.

use std::iter::FusedIterator;

use serde_json::Value;

use crate::value::ValueRecord;

/// Lazily flatten `tree` into one record per leaf, depth-first and in
/// document order, with paths rooted at `base`.
pub fn flatten<'a>(tree: &'a Value, base: &str) -> Flatten<'a> {
    Flatten {
        stack: vec![(base.to_string(), tree)],
    }
}

/// Iterator returned by [`flatten`].
///
/// Single pass: once exhausted it stays exhausted.
#[derive(Debug)]
pub struct Flatten<'a> {
    stack: Vec<(String, &'a Value)>,
}

impl Iterator for Flatten<'_> {
    type Item = ValueRecord;

    fn next(&mut self) -> Option<ValueRecord> {
        while let Some((path, node)) = self.stack.pop() {
            match node {
                Value::Object(children) => {
                    // Pushed in reverse so the first child is visited first.
                    for (name, child) in children.iter().rev() {
                        self.stack.push((format!("{}/{}", path, name), child));
                    }
                }
                Value::Array(items) => {
                    for (index, item) in items.iter().enumerate().rev() {
                        self.stack.push((array_element_path(&path, index), item));
                    }
                }
                leaf => return Some(leaf_record(path, leaf)),
            }
        }
        None
    }
}

impl FusedIterator for Flatten<'_> {}

/// Path of an array element.
///
/// Elements share their parent's path: the index is dropped, so every element
/// of a list collapses onto the same leaf path.
// TODO: switch to an indexed or keyed path once the datastore's list addressing is settled.
fn array_element_path(parent: &str, _index: usize) -> String {
    parent.to_string()
}

fn leaf_record(path: String, leaf: &Value) -> ValueRecord {
    match leaf {
        Value::Null => ValueRecord::new(path),
        Value::Bool(b) => ValueRecord::with_value(path, b.to_string()),
        Value::Number(n) => match n.as_i64() {
            Some(i) => ValueRecord::with_value(path, i),
            // Out-of-range unsigned values and floats keep their JSON text.
            None => ValueRecord::with_value(path, n.to_string()),
        },
        Value::String(s) => ValueRecord::with_value(path, s.as_str()),
        Value::Object(_) | Value::Array(_) => ValueRecord::new(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;
    use serde_json::json;

    fn pairs(tree: &Value, base: &str) -> Vec<(String, String)> {
        flatten(tree, base)
            .map(|r| (r.path().to_string(), r.get_str()))
            .collect()
    }

    #[test]
    fn test_flatten_basic() {
        let tree = json!({"a": {"b": 1, "c": "x"}});
        let records: Vec<ValueRecord> = flatten(&tree, "/r").collect();

        assert_eq!(
            records,
            vec![
                ValueRecord::with_value("/r/a/b", 1i64),
                ValueRecord::with_value("/r/a/c", "x"),
            ]
        );
        assert_eq!(records[0].data_type(), ValueKind::IntValue);
        assert_eq!(records[1].data_type(), ValueKind::StringValue);
    }

    #[test]
    fn test_flatten_array_collapse() {
        let tree = json!({"a": [1, 2, 3]});
        let records: Vec<ValueRecord> = flatten(&tree, "/r").collect();

        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.path() == "/r/a"));
        let values: Vec<i64> = records.iter().map(|r| r.get_int().unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_flatten_preserves_document_order() {
        let tree: Value =
            serde_json::from_str(r#"{"z": 1, "a": {"y": 2, "b": 3}, "m": 4}"#).unwrap();

        let paths: Vec<String> = pairs(&tree, "").into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["/z", "/a/y", "/a/b", "/m"]);
    }

    #[test]
    fn test_flatten_scalar_kinds() {
        let tree = json!({
            "enabled": true,
            "ratio": 0.5,
            "big": u64::MAX,
            "nothing": null,
        });
        let records: Vec<ValueRecord> = flatten(&tree, "/m").collect();

        assert_eq!(records[0], ValueRecord::with_value("/m/enabled", "true"));
        assert_eq!(records[1], ValueRecord::with_value("/m/ratio", "0.5"));
        assert_eq!(
            records[2],
            ValueRecord::with_value("/m/big", u64::MAX.to_string())
        );
        assert_eq!(records[3], ValueRecord::new("/m/nothing"));
        assert_eq!(records[3].data_type(), ValueKind::Unknown);
    }

    #[test]
    fn test_flatten_objects_inside_arrays() {
        let tree = json!({"list": [{"name": "a"}, {"name": "b"}]});
        assert_eq!(
            pairs(&tree, "/r"),
            vec![
                ("/r/list/name".to_string(), "a".to_string()),
                ("/r/list/name".to_string(), "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_flatten_scalar_root_and_empty_containers() {
        let scalar = json!(5);
        assert_eq!(pairs(&scalar, "/r/x"), vec![("/r/x".to_string(), "5".to_string())]);

        let empty = json!({"a": {}, "b": []});
        assert_eq!(flatten(&empty, "/r").count(), 0);
    }

    #[test]
    fn test_flatten_is_single_pass() {
        let tree = json!({"a": 1});
        let mut iter = flatten(&tree, "/r");

        assert!(iter.next().is_some());
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }
}
