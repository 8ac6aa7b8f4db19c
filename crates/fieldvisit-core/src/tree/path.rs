//! Path addressing into form trees.
//!
//! A path is a sequence of `.`-separated segments; each segment is a field
//! name optionally followed by `[n]` indices (`plots[2].crops[0]`). A path may
//! also start with an index to address into a root array (`[0].name`).
//!
//! Reads never fail: a malformed or missing path is simply "not found".
//! Writes create missing intermediate containers and extend arrays with
//! `Null` holes, and only fail on malformed syntax or when a segment would
//! have to descend into a scalar.

use std::fmt;

use fieldvisit_types::error::PathError;
use fieldvisit_types::form::FormValue;

/// Largest array index a path may address. Writes pad arrays with `Null` up
/// to the index, so the cap bounds the allocation a single path can cause.
pub const MAX_ARRAY_INDEX: usize = 10_000;

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathToken {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathToken::Key(key) => write!(f, "{key}"),
            PathToken::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// Tokenize a path string.
pub fn parse_path(path: &str) -> Result<Vec<PathToken>, PathError> {
    let malformed = |reason: String| PathError::Malformed {
        path: path.to_string(),
        reason,
    };

    if path.is_empty() {
        return Err(malformed("path is empty".to_string()));
    }

    let mut tokens = Vec::new();
    for (position, segment) in path.split('.').enumerate() {
        let (key, mut rest) = match segment.find('[') {
            Some(open) => segment.split_at(open),
            None => (segment, ""),
        };

        if key.contains(']') {
            return Err(malformed(format!("unexpected ']' in segment '{segment}'")));
        }
        // Only the first segment may be a bare index (root array).
        if key.is_empty() && (position > 0 || rest.is_empty()) {
            return Err(malformed("empty segment".to_string()));
        }
        if !key.is_empty() {
            tokens.push(PathToken::Key(key.to_string()));
        }

        while !rest.is_empty() {
            let Some(inner) = rest.strip_prefix('[') else {
                return Err(malformed(format!("unexpected text after index in '{segment}'")));
            };
            let Some(close) = inner.find(']') else {
                return Err(malformed(format!("unclosed '[' in segment '{segment}'")));
            };
            let (digits, tail) = inner.split_at(close);
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed(format!("invalid index '{digits}'")));
            }
            let index = digits
                .parse::<usize>()
                .map_err(|e| malformed(format!("invalid index '{digits}': {e}")))?;
            if index > MAX_ARRAY_INDEX {
                return Err(malformed(format!(
                    "index {index} exceeds the maximum of {MAX_ARRAY_INDEX}"
                )));
            }
            tokens.push(PathToken::Index(index));
            rest = &tail[1..];
        }
    }

    Ok(tokens)
}

/// Append a field name to a path prefix.
pub fn join_key(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

/// Append an array index to a path prefix.
pub fn join_index(parent: &str, index: usize) -> String {
    format!("{parent}[{index}]")
}

/// Resolve `path` inside `tree`.
///
/// Returns `None` for malformed paths, missing keys, out-of-range indices,
/// and paths that try to descend through a scalar.
pub fn get<'a>(tree: &'a FormValue, path: &str) -> Option<&'a FormValue> {
    let tokens = parse_path(path).ok()?;
    tokens.iter().try_fold(tree, |node, token| match (token, node) {
        (PathToken::Key(key), FormValue::Object(map)) => map.get(key),
        (PathToken::Index(index), FormValue::Array(items)) => items.get(*index),
        _ => None,
    })
}

/// Install `value` at `path`, creating intermediate containers as needed.
///
/// A missing (or `Null`) intermediate becomes an array when the next token is
/// an index and an object otherwise. Writing past the end of an array fills
/// the gap with `Null` holes.
pub fn set(tree: &mut FormValue, path: &str, value: FormValue) -> Result<(), PathError> {
    let tokens = parse_path(path)?;
    let Some((last, parents)) = tokens.split_last() else {
        return Err(PathError::Malformed {
            path: path.to_string(),
            reason: "path has no segments".to_string(),
        });
    };

    let mut node = tree;
    for token in parents {
        node = child_slot(node, token, path)?;
    }
    *child_slot(node, last, path)? = value;
    Ok(())
}

/// Borrow the child slot addressed by `token`, materializing it if missing.
fn child_slot<'a>(
    node: &'a mut FormValue,
    token: &PathToken,
    path: &str,
) -> Result<&'a mut FormValue, PathError> {
    if node.is_null() {
        *node = match token {
            PathToken::Key(_) => FormValue::object(),
            PathToken::Index(_) => FormValue::Array(Vec::new()),
        };
    }

    match (token, node) {
        (PathToken::Key(key), FormValue::Object(map)) => {
            Ok(map.entry(key.clone()).or_insert(FormValue::Null))
        }
        (PathToken::Index(index), FormValue::Array(items)) => {
            if items.len() <= *index {
                let len = index.checked_add(1).ok_or_else(|| PathError::Malformed {
                    path: path.to_string(),
                    reason: format!("index {index} is out of range"),
                })?;
                items.resize(len, FormValue::Null);
            }
            Ok(&mut items[*index])
        }
        (token, _) => Err(PathError::NotAContainer {
            path: path.to_string(),
            segment: token.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(value: serde_json::Value) -> FormValue {
        FormValue::from(value)
    }

    #[test]
    fn test_parse_dotted_and_indexed() {
        let tokens = parse_path("a.b[2].c").unwrap();
        assert_eq!(
            tokens,
            vec![
                PathToken::Key("a".to_string()),
                PathToken::Key("b".to_string()),
                PathToken::Index(2),
                PathToken::Key("c".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_nested_indices_and_root_index() {
        assert_eq!(
            parse_path("grid[1][0]").unwrap(),
            vec![
                PathToken::Key("grid".to_string()),
                PathToken::Index(1),
                PathToken::Index(0),
            ]
        );
        assert_eq!(
            parse_path("[3].name").unwrap(),
            vec![PathToken::Index(3), PathToken::Key("name".to_string())]
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "a..b", ".a", "a.", "a[", "a[x]", "a[]", "a[1]b", "a]", "a.[1]"] {
            assert!(
                matches!(parse_path(bad), Err(PathError::Malformed { .. })),
                "expected '{bad}' to be malformed"
            );
        }
    }

    #[test]
    fn test_parse_rejects_oversized_index() {
        assert_eq!(
            parse_path(&format!("a[{MAX_ARRAY_INDEX}]")).unwrap(),
            vec![PathToken::Key("a".to_string()), PathToken::Index(MAX_ARRAY_INDEX)]
        );
        for bad in [
            format!("a[{}]", MAX_ARRAY_INDEX + 1),
            "a[1000000000000]".to_string(),
            format!("a[{}]", usize::MAX),
            "a[99999999999999999999999]".to_string(),
        ] {
            assert!(
                matches!(parse_path(&bad), Err(PathError::Malformed { .. })),
                "expected '{bad}' to be malformed"
            );
        }
    }

    #[test]
    fn test_set_huge_index_is_error() {
        let mut t = FormValue::object();
        let result = set(&mut t, &format!("a[{}]", usize::MAX), FormValue::Null);
        assert!(matches!(result, Err(PathError::Malformed { .. })));
        assert!(get(&t, "a").is_none());
        assert!(get(&t, "a[1000000000000]").is_none());
    }

    #[test]
    fn test_get_nested_value() {
        let t = tree(json!({"a": {"b": [{"c": 1}, {"c": 2}, {"c": 3}]}}));
        assert_eq!(get(&t, "a.b[2].c"), Some(&FormValue::from(3i64)));
        assert!(get(&t, "a.b").unwrap().as_array().is_some());
    }

    #[test]
    fn test_get_missing_returns_none() {
        let t = tree(json!({"a": {"b": [1]}}));
        assert!(get(&t, "a.x").is_none());
        assert!(get(&t, "a.b[5]").is_none());
        assert!(get(&t, "a.b[0].deeper").is_none());
        assert!(get(&t, "a..b").is_none());
    }

    #[test]
    fn test_set_creates_intermediate_containers() {
        let mut t = FormValue::object();
        set(&mut t, "step2.plots[1].area", FormValue::from(10i64)).unwrap();
        assert_eq!(
            t.to_json(),
            json!({"step2": {"plots": [null, {"area": 10}]}})
        );
    }

    #[test]
    fn test_set_extends_array_with_holes() {
        let mut t = tree(json!({"list": [1]}));
        set(&mut t, "list[4]", FormValue::from("x")).unwrap();
        let items = get(&t, "list").unwrap().as_array().unwrap();
        assert_eq!(items.len(), 5);
        assert!(items[1].is_null() && items[2].is_null() && items[3].is_null());
        assert_eq!(items[4], FormValue::from("x"));
    }

    #[test]
    fn test_set_replaces_null_intermediate() {
        let mut t = tree(json!({"photo": null}));
        set(&mut t, "photo.caption", FormValue::from("north field")).unwrap();
        assert_eq!(t.to_json(), json!({"photo": {"caption": "north field"}}));
    }

    #[test]
    fn test_set_overwrites_existing_leaf() {
        let mut t = tree(json!({"a": {"b": 1, "c": 2}}));
        set(&mut t, "a.b", FormValue::from(5i64)).unwrap();
        assert_eq!(t.to_json(), json!({"a": {"b": 5, "c": 2}}));
    }

    #[test]
    fn test_set_into_scalar_is_error() {
        let mut t = tree(json!({"name": "Finca X", "list": [1]}));
        assert!(matches!(
            set(&mut t, "name.first", FormValue::Null),
            Err(PathError::NotAContainer { .. })
        ));
        assert!(matches!(
            set(&mut t, "name[0]", FormValue::Null),
            Err(PathError::NotAContainer { .. })
        ));
        assert!(matches!(
            set(&mut t, "list.key", FormValue::Null),
            Err(PathError::NotAContainer { .. })
        ));
    }

    #[test]
    fn test_set_malformed_path_is_error() {
        let mut t = FormValue::object();
        assert!(matches!(
            set(&mut t, "a[", FormValue::Null),
            Err(PathError::Malformed { .. })
        ));
    }

    #[test]
    fn test_join_helpers() {
        assert_eq!(join_key("", "a"), "a");
        assert_eq!(join_key("a", "b"), "a.b");
        assert_eq!(join_index("a.b", 2), "a.b[2]");
        assert_eq!(join_index("", 0), "[0]");
    }
}
