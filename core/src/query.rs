//! Query-string helpers.
//!
//! Data objects are flattened the way `qs` does it in the browser world:
//! nested objects become `key[sub]`, arrays become `key[0]`, `key[1]`, and
//! `null` becomes an empty value. Empty arrays and objects produce nothing.
//! Components are percent-encoded like `qs` does: a space becomes `%20`
//! and `~` stays literal.

use serde_json::{Map, Value};
use url::form_urlencoded;

/// Append `data` to the query string of `url`.
///
/// Existing parameters are kept in order. A parameter whose top-level key
/// also appears in `data` is replaced in place (all of its nested entries at
/// once); new keys are appended. The result always contains a `?`.
pub fn extend_url(url: &str, data: &Map<String, Value>) -> String {
    let (base, existing) = url.split_once('?').unwrap_or((url, ""));

    let mut groups: Vec<(String, Vec<(String, String)>)> = Vec::new();
    for (key, value) in form_urlencoded::parse(existing.as_bytes()) {
        let top = top_level_key(&key).to_string();
        let pair = (key.into_owned(), value.into_owned());
        match groups.iter_mut().find(|(name, _)| *name == top) {
            Some((_, pairs)) => pairs.push(pair),
            None => groups.push((top, vec![pair])),
        }
    }

    for (key, value) in data {
        let mut pairs = Vec::new();
        flatten_into(key.clone(), value, &mut pairs);
        match groups.iter_mut().find(|(name, _)| *name == *key) {
            Some((_, slot)) => *slot = pairs,
            None => groups.push((key.clone(), pairs)),
        }
    }

    let query = encode(groups.iter().flat_map(|(_, pairs)| pairs.iter()));
    format!("{base}?{query}")
}

/// Encode `data` as a query string without a leading `?`.
pub fn stringify(data: &Map<String, Value>) -> String {
    encode(flatten(data).iter())
}

/// Flatten `data` into ordered `(key, value)` pairs.
pub fn flatten(data: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in data {
        flatten_into(key.clone(), value, &mut pairs);
    }
    pairs
}

fn flatten_into(prefix: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Null => out.push((prefix, String::new())),
        Value::Bool(b) => out.push((prefix, b.to_string())),
        Value::Number(n) => out.push((prefix, n.to_string())),
        Value::String(s) => out.push((prefix, s.clone())),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten_into(format!("{prefix}[{i}]"), item, out);
            }
        }
        Value::Object(fields) => {
            for (key, item) in fields {
                flatten_into(format!("{prefix}[{key}]"), item, out);
            }
        }
    }
}

fn encode<'a>(pairs: impl Iterator<Item = &'a (String, String)>) -> String {
    pairs
        .map(|(key, value)| format!("{}={}", encode_component(key), encode_component(value)))
        .collect::<Vec<_>>()
        .join("&")
}

fn encode_component(input: &str) -> String {
    form_urlencoded::byte_serialize(input.as_bytes())
        .map(|chunk| match chunk {
            "+" => "%20",
            "%7E" => "~",
            other => other,
        })
        .collect()
}

/// `a[b][c]` → `a`.
fn top_level_key(key: &str) -> &str {
    match key.find('[') {
        Some(0) | None => key,
        Some(i) => &key[..i],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn extend_url_without_existing_query() {
        assert_eq!(extend_url("my/url", &object(json!({"foo": "bar"}))), "my/url?foo=bar");
    }

    #[test]
    fn extend_url_keeps_existing_and_replaces_duplicates() {
        let url = extend_url("my/url?a=1&foo=old&b=2", &object(json!({"foo": "new", "c": 3})));
        assert_eq!(url, "my/url?a=1&foo=new&b=2&c=3");
    }

    #[test]
    fn extend_url_replaces_whole_nested_group() {
        let url = extend_url("x?f%5Ba%5D=1&f%5Bb%5D=2", &object(json!({"f": {"c": true}})));
        assert_eq!(url, "x?f%5Bc%5D=true");
    }

    #[test]
    fn flatten_nests_like_qs() {
        let pairs = flatten(&object(json!({
            "list": [1, "two"],
            "empty": [],
            "nil": null,
            "obj": {"inner": {"deep": false}}
        })));
        assert_eq!(
            pairs,
            vec![
                ("list[0]".to_string(), "1".to_string()),
                ("list[1]".to_string(), "two".to_string()),
                ("nil".to_string(), String::new()),
                ("obj[inner][deep]".to_string(), "false".to_string()),
            ]
        );
    }

    #[test]
    fn stringify_percent_encodes() {
        assert_eq!(stringify(&object(json!({"q": "a&b c"}))), "q=a%26b%20c");
    }

    #[test]
    fn stringify_keeps_tilde_and_escapes_plus() {
        assert_eq!(stringify(&object(json!({"q": "a+b~c d"}))), "q=a%2Bb~c%20d");
    }

    #[test]
    fn top_level_key_handles_plain_and_nested() {
        assert_eq!(top_level_key("a"), "a");
        assert_eq!(top_level_key("a[b][c]"), "a");
        assert_eq!(top_level_key("[odd]"), "[odd]");
    }
}
